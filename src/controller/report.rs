use std::fmt;

use serde::Serialize;

use super::PairKey;
use crate::error::PairError;
use crate::policy::{MergeDecision, RejectReason};

/// Progress of a single pair through the merge flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    Idle,
    RowLocated,
    AlreadyProcessed,
    ModalOpened,
    AttributesExtracted,
    DecisionMade,
    SelectionReconciled,
    MergeConfirmed,
    Merged,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::RowLocated => "row_located",
            Self::AlreadyProcessed => "already_processed",
            Self::ModalOpened => "modal_opened",
            Self::AttributesExtracted => "attributes_extracted",
            Self::DecisionMade => "decision_made",
            Self::SelectionReconciled => "selection_reconciled",
            Self::MergeConfirmed => "merge_confirmed",
            Self::Merged => "merged",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectCause {
    /// The policy ruled the pair out.
    Policy(RejectReason),
    /// The pair came back after it was already merged or rejected.
    AlreadyProcessed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipCause {
    /// The pair failed and was rejected from the queue to move on.
    AutoSkip(PairError),
    /// Decided but not acted on.
    DryRun(MergeDecision),
    /// The pair already failed too often this run.
    RepeatedFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Merged(MergeDecision),
    Rejected(RejectCause),
    Skipped(SkipCause),
    Failed(PairError),
}

impl PairOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Merged(_) => "merged",
            Self::Rejected(_) => "rejected",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for PairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged(d) => write!(f, "merged, kept {} record ({})", d.primary, d.rule),
            Self::Rejected(RejectCause::Policy(reason)) => write!(f, "rejected: {reason}"),
            Self::Rejected(RejectCause::AlreadyProcessed) => {
                f.write_str("rejected: already processed this run")
            }
            Self::Skipped(SkipCause::AutoSkip(err)) => write!(f, "skipped after error: {err}"),
            Self::Skipped(SkipCause::DryRun(d)) => {
                write!(f, "dry run, would keep {} record ({})", d.primary, d.rule)
            }
            Self::Skipped(SkipCause::RepeatedFailure) => f.write_str("skipped: failed too often"),
            Self::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Result of handling one queue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairReport {
    /// 1-based position in the run.
    pub index: usize,
    pub key: PairKey,
    pub outcome: PairOutcome,
    /// Furthest state reached.
    pub state: PairState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    LimitReached,
    QueueEmpty,
}

/// Counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub merged: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stop: Option<StopReason>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &PairOutcome) {
        self.attempted += 1;
        match outcome {
            PairOutcome::Merged(_) => self.merged += 1,
            PairOutcome::Rejected(_) => self.rejected += 1,
            PairOutcome::Skipped(_) => self.skipped += 1,
            PairOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Pairs the run resolved one way or another.
    pub fn succeeded(&self) -> usize {
        self.merged + self.rejected
    }
}
