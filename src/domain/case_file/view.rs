//! Read-side shapes returned by case file operations.
//!
//! Every mutation answers with the canonical fresh entity so an external
//! cache can reconcile without a second read.

use super::CaseFile;
use crate::domain::intents::NotificationIntent;
use crate::domain::types::CaseFileId;
use serde::{Deserialize, Serialize};

/// A case file as seen by callers, with the version needed for optimistic
/// concurrency on the next write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFileView {
    pub id: CaseFileId,
    /// Sequence number of the last committed event.
    pub version: u64,
    #[serde(flatten)]
    pub case_file: CaseFile,
}

/// Result of a successful lifecycle mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub case_file: CaseFileView,
    /// Notifications owed for the committed change.
    pub intents: Vec<NotificationIntent>,
}
