//! Case Status State Machine
//!
//! Semantic case statuses and their mapping to the internal status codes
//! configured per deployment.

use serde::{Deserialize, Serialize};

use tix_models::Milestone;
use tix_utils::{StatusCodes, TixError, TixResult};

/// Case statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseStatus {
    /// Opened, not yet dispatched
    New,
    /// Dispatched to a unit
    Assigned,
    /// Unit acknowledged the assignment
    Acknowledge,
    /// Unit is on site
    InProgress,
    OnHold,
    /// Work finished, awaiting close
    Done,
    Cancel,
    Closed,
}

pub const ALL_STATUSES: [CaseStatus; 8] = [
    CaseStatus::New,
    CaseStatus::Assigned,
    CaseStatus::Acknowledge,
    CaseStatus::InProgress,
    CaseStatus::OnHold,
    CaseStatus::Done,
    CaseStatus::Cancel,
    CaseStatus::Closed,
];

impl CaseStatus {
    /// Check if transition is valid. Only terminal states refuse; any other
    /// status, NEW included, may be entered again.
    pub fn can_transition_to(&self, _target: CaseStatus) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Cancel | CaseStatus::Closed)
    }

    /// Case column stamped the first time this status is reached.
    pub fn milestone(&self) -> Option<Milestone> {
        match self {
            Self::Assigned => Some(Milestone::Command),
            Self::Acknowledge => Some(Milestone::Receive),
            Self::InProgress => Some(Milestone::Arrive),
            Self::Done | Self::Closed => Some(Milestone::Closed),
            Self::New | Self::OnHold | Self::Cancel => None,
        }
    }

    /// Parse the external semantic name (`INPROGRESS`, `ONHOLD`, ...).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace(['_', ' '], "").as_str() {
            "NEW" => Some(Self::New),
            "ASSIGNED" => Some(Self::Assigned),
            "ACKNOWLEDGE" => Some(Self::Acknowledge),
            "INPROGRESS" => Some(Self::InProgress),
            "ONHOLD" => Some(Self::OnHold),
            "DONE" => Some(Self::Done),
            "CANCEL" | "CANCELLED" | "CANCELED" => Some(Self::Cancel),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Assigned => write!(f, "ASSIGNED"),
            Self::Acknowledge => write!(f, "ACKNOWLEDGE"),
            Self::InProgress => write!(f, "INPROGRESS"),
            Self::OnHold => write!(f, "ONHOLD"),
            Self::Done => write!(f, "DONE"),
            Self::Cancel => write!(f, "CANCEL"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Status as the external work-order system sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundStatus {
    pub status: String,
    pub state: Option<String>,
}

/// Bidirectional mapping between `CaseStatus` and internal status codes.
///
/// Workflows may define codes outside the mapping; those are accepted as-is
/// and carry no milestone or terminal semantics.
#[derive(Debug, Clone)]
pub struct StatusCatalog {
    codes: StatusCodes,
}

impl StatusCatalog {
    pub fn new(codes: StatusCodes) -> Self {
        Self { codes }
    }

    pub fn codes(&self) -> &StatusCodes {
        &self.codes
    }

    pub fn code_of(&self, status: CaseStatus) -> &str {
        match status {
            CaseStatus::New => &self.codes.new,
            CaseStatus::Assigned => &self.codes.assigned,
            CaseStatus::Acknowledge => &self.codes.acknowledge,
            CaseStatus::InProgress => &self.codes.in_progress,
            CaseStatus::OnHold => &self.codes.on_hold,
            CaseStatus::Done => &self.codes.done,
            CaseStatus::Cancel => &self.codes.cancel,
            CaseStatus::Closed => &self.codes.closed,
        }
    }

    pub fn status_of(&self, code: &str) -> Option<CaseStatus> {
        ALL_STATUSES.into_iter().find(|s| self.code_of(*s) == code)
    }

    pub fn milestone_for(&self, code: &str) -> Option<Milestone> {
        self.status_of(code).and_then(|s| s.milestone())
    }

    /// Reject transitions out of terminal statuses and back to NEW.
    pub fn validate_transition(&self, from_code: &str, to_code: &str) -> TixResult<()> {
        let (Some(from), Some(to)) = (self.status_of(from_code), self.status_of(to_code)) else {
            // Leaving a terminal status is refused even towards an unmapped code.
            if self.status_of(from_code).is_some_and(|s| s.is_terminal()) {
                return Err(TixError::validation(
                    "statusId",
                    format!("case is in terminal status {}", from_code),
                ));
            }
            return Ok(());
        };

        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(TixError::validation(
                "statusId",
                format!("transition {} -> {} is not allowed", from, to),
            ))
        }
    }

    /// Internal code for an inbound work-order status. A `CLOSED` state wins
    /// over whatever the status says.
    pub fn inbound_code(&self, status: &str, state: Option<&str>) -> Option<String> {
        if state.is_some_and(|s| s.trim().eq_ignore_ascii_case("CLOSED")) {
            return Some(self.codes.closed.clone());
        }
        CaseStatus::from_name(status).map(|s| self.code_of(s).to_string())
    }

    /// External status for an internal code. `CLOSED` is reported as `DONE`
    /// with state `CLOSED`; unmapped codes pass through.
    pub fn outbound(&self, code: &str) -> OutboundStatus {
        match self.status_of(code) {
            Some(CaseStatus::Closed) => OutboundStatus {
                status: CaseStatus::Done.to_string(),
                state: Some(CaseStatus::Closed.to_string()),
            },
            Some(status) => OutboundStatus { status: status.to_string(), state: None },
            None => OutboundStatus { status: code.to_string(), state: None },
        }
    }
}
