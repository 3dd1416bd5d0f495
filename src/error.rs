//! Error taxonomy for the merge loop.
//!
//! Three layers, each caught at a different boundary:
//!
//! - [`UiError`] comes out of a [`UiAdapter`](crate::adapter::UiAdapter) call.
//! - [`PairError`] ends processing of one pair; the batch carries on.
//! - [`RunError`] ends the whole run.

use std::time::Duration;

use thiserror::Error;

use crate::policy::Side;
use crate::retry::AttemptTimedOut;

/// Failure reported by a UI adapter operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UiError {
    /// Element not present or not stable yet; worth polling again.
    #[error("not ready: {0}")]
    NotReady(String),

    /// A bounded wait ran out.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// The UI rejected or failed to perform an action.
    #[error("action failed: {0}")]
    Action(String),

    /// The queue view itself is gone (logged out, page crashed, wrong URL).
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl UiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::Timeout { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::QueueUnavailable(_))
    }
}

/// Failure that abandons a single pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairError {
    /// Fields never became readable within the retry budget.
    #[error("attributes not available after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: UiError,
    },

    /// Fields were present but could not be parsed.
    #[error("{side} record has unparseable {field}: {value:?}")]
    ExtractionAmbiguous {
        side: Side,
        field: &'static str,
        value: String,
    },

    /// A selection or merge did not observably take effect.
    #[error("{action} did not take effect")]
    ActionVerificationFailed { action: String },

    /// A step exceeded its timeout.
    #[error("{step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    /// Any other adapter failure.
    #[error(transparent)]
    Ui(#[from] UiError),
}

impl From<AttemptTimedOut> for PairError {
    fn from(err: AttemptTimedOut) -> Self {
        Self::Timeout {
            step: "retry attempt",
            after: err.after,
        }
    }
}

/// Failure that aborts the whole run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("fatal environment error: {0}")]
    FatalEnvironment(String),
}

impl From<UiError> for RunError {
    fn from(err: UiError) -> Self {
        Self::FatalEnvironment(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(UiError::NotReady("count".into()).is_transient());
        assert!(
            UiError::Timeout {
                what: "modal".into(),
                after: Duration::from_millis(10),
            }
            .is_transient()
        );
        assert!(!UiError::Action("click".into()).is_transient());
        assert!(UiError::QueueUnavailable("gone".into()).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = PairError::ExtractionAmbiguous {
            side: Side::Right,
            field: "contact count",
            value: "abc".into(),
        };
        assert_eq!(
            err.to_string(),
            "right record has unparseable contact count: \"abc\""
        );

        let err = PairError::Timeout {
            step: "confirm merge",
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "confirm merge timed out after 1.5s");
    }
}
