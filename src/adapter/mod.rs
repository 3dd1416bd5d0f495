//! The UI seam.
//!
//! The controller drives the duplicates queue only through [`UiAdapter`].
//! Element location, page scripting and login handling are the adapter's
//! business; the controller sees rows, modals and the raw text of each
//! record.

#[cfg(feature = "browser")]
pub mod browser;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UiError;
use crate::policy::Side;

/// Text shown for one record in the comparison view.
///
/// `None` means the field is not on the page at all; a field rendered with a
/// placeholder such as `--` comes through as `Some("--")`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub name: Option<String>,
    pub contact_count: Option<String>,
    pub domain: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_type: Option<String>,
}

/// Operations the controller needs from the duplicates queue UI.
///
/// Methods take `&self`; the UI is a single shared surface, so implementations
/// keep their own interior state and are only ever driven by one controller.
#[async_trait]
pub trait UiAdapter: Send + Sync {
    /// Handle to a queue row.
    type Row: Send + Sync;
    /// Handle to an open comparison view.
    type Modal: Send + Sync;

    /// Adapter name for logs.
    fn name(&self) -> &str;

    /// Number of pairs currently waiting in the queue.
    async fn count_pending(&self) -> Result<usize, UiError>;

    /// The row at `offset` from the top of the queue, or `None` past the end.
    ///
    /// The controller scans downwards from offset 0, reading each row's
    /// identity, until it finds a pair it has not chosen to leave in place.
    async fn locate_next_row(&self, offset: usize) -> Result<Option<Self::Row>, UiError>;

    /// Identifiers of both records in a row, read before anything is clicked.
    async fn extract_pair_identity(&self, row: &Self::Row) -> Result<(String, String), UiError>;

    async fn open_comparison(&self, row: &Self::Row) -> Result<Self::Modal, UiError>;

    /// Read one record's fields. May fail with [`UiError::NotReady`] while the
    /// view is still filling in.
    async fn extract_attributes(&self, modal: &Self::Modal, side: Side) -> Result<RawRecord, UiError>;

    /// The record currently marked as primary, if any.
    async fn current_selection(&self, modal: &Self::Modal) -> Result<Option<Side>, UiError>;

    async fn set_selection(&self, modal: &Self::Modal, side: Side) -> Result<(), UiError>;

    /// Press merge and wait until the view reports completion.
    async fn confirm_merge(&self, modal: &Self::Modal) -> Result<(), UiError>;

    /// Reject the pair from the queue.
    async fn reject(&self, row: &Self::Row) -> Result<(), UiError>;

    /// Close the comparison view without acting.
    async fn cancel(&self, modal: &Self::Modal) -> Result<(), UiError>;

    /// Bring the queue back to a clean state between pairs.
    async fn refresh_queue(&self) -> Result<(), UiError> {
        Ok(())
    }
}
