use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of an outbound work-order synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Create,
    Update,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Pending outbound synchronization, keyed by case id in the retry queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueEntry {
    pub org_id: String,
    pub case_id: String,
    pub kind: SyncKind,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub first_failed_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

impl SyncQueueEntry {
    pub fn first_failure(
        org_id: impl Into<String>,
        case_id: impl Into<String>,
        kind: SyncKind,
        error: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            org_id: org_id.into(),
            case_id: case_id.into(),
            kind,
            retry_count: 1,
            last_error: Some(error.into()),
            first_failed_at: now,
            last_attempt_at: now,
        }
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.last_attempt_at = Utc::now();
    }

    /// A create that never reached the remote side stays a create even if
    /// later transitions asked for updates.
    pub fn merge_kind(&mut self, kind: SyncKind) {
        if self.kind != SyncKind::Create {
            self.kind = kind;
        }
    }

    pub fn is_exhausted(&self, max_retry: u32) -> bool {
        self.retry_count >= max_retry
    }
}
