pub mod adapter;
pub mod args;
pub mod attributes;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod policy;
pub mod retry;
pub mod theme;

// Re-export the types most callers need at crate root for convenience
pub use adapter::{RawRecord, UiAdapter};
pub use attributes::RecordAttributes;
pub use config::Config;
pub use controller::{Controller, PairKey, ProcessedSet, RunSummary, StopReason};
pub use error::{PairError, RunError, UiError};
pub use policy::{DecisionRule, MergeDecision, MergePolicy, Side, Verdict};
