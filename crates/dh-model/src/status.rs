//! Workflow status and the approval state machine
//!
//! ```text
//! Draft ──submit──▶ Submitted ──review──▶ Reviewed ──approve──▶ Approved
//!   ▲                   │                    │                     │
//!   └──────────────────reject────────────────┴─────────────────────┘
//! ```
//!
//! `Rejected` is a persisted code that behaves like `Draft`: editable and
//! submittable. Rejecting always writes `Draft`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered workflow state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RowStatus {
    /// Being edited
    #[default]
    Draft,
    /// Handed in for review
    Submitted,
    /// Checked by a reviewer
    Reviewed,
    /// Signed off
    Approved,
    /// Sent back; equivalent to draft for editing purposes
    Rejected,
}

impl RowStatus {
    /// Persisted numeric code
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Submitted => 1,
            Self::Reviewed => 2,
            Self::Approved => 3,
            Self::Rejected => 4,
        }
    }

    /// Decode a persisted numeric code
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Draft),
            1 => Some(Self::Submitted),
            2 => Some(Self::Reviewed),
            3 => Some(Self::Approved),
            4 => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Field edits are only allowed before submission
    #[inline]
    #[must_use]
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }

    /// Position in the approval ladder; `Rejected` ranks with `Draft`
    #[inline]
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Rejected => 0,
            other => other.code(),
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<RowStatus> for u8 {
    fn from(value: RowStatus) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for RowStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_code(value).ok_or_else(|| format!("unknown row status code {value}"))
    }
}

/// Save-tier outcome stamped on a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ValidationStatus {
    /// Edited since the last validation run
    #[default]
    NotValidated,
    /// No blocking errors and no warnings
    Valid,
    /// Persistable, but the save tier reported warnings
    HasWarnings,
    /// Blocking errors present; never persisted in this state
    HasErrors,
}

impl ValidationStatus {
    /// Persisted numeric code
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::NotValidated => 0,
            Self::Valid => 1,
            Self::HasWarnings => 2,
            Self::HasErrors => 3,
        }
    }
}

impl From<ValidationStatus> for u8 {
    fn from(value: ValidationStatus) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for ValidationStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NotValidated),
            1 => Ok(Self::Valid),
            2 => Ok(Self::HasWarnings),
            3 => Ok(Self::HasErrors),
            other => Err(format!("unknown validation status code {other}")),
        }
    }
}

/// Workflow actions that move a record along the approval ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowAction {
    /// Draft → Submitted
    Submit,
    /// Submitted → Reviewed
    Review,
    /// Reviewed → Approved
    Approve,
    /// Submitted / Reviewed / Approved → Draft
    Reject,
    /// Approved → Approved, flipping report inclusion
    ToggleReportInclusion,
}

impl WorkflowAction {
    /// Status written by this action
    #[must_use]
    pub fn target(self) -> RowStatus {
        match self {
            Self::Submit => RowStatus::Submitted,
            Self::Review => RowStatus::Reviewed,
            Self::Approve | Self::ToggleReportInclusion => RowStatus::Approved,
            Self::Reject => RowStatus::Draft,
        }
    }

    /// Statuses this action may start from
    #[must_use]
    pub fn allowed_from(self) -> &'static [RowStatus] {
        match self {
            Self::Submit => &[RowStatus::Draft, RowStatus::Rejected],
            Self::Review => &[RowStatus::Submitted],
            Self::Approve => &[RowStatus::Reviewed],
            Self::Reject => &[RowStatus::Submitted, RowStatus::Reviewed, RowStatus::Approved],
            Self::ToggleReportInclusion => &[RowStatus::Approved],
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submit => "submit",
            Self::Review => "review",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::ToggleReportInclusion => "toggle report inclusion",
        };
        f.write_str(name)
    }
}

/// Illegal workflow transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} a record in status {from}")]
pub struct TransitionError {
    /// Attempted action
    pub action: WorkflowAction,
    /// Status the record was in
    pub from: RowStatus,
}

/// Check an action against the current status and return the target status
pub fn validate_transition(from: RowStatus, action: WorkflowAction) -> Result<RowStatus, TransitionError> {
    if action.allowed_from().contains(&from) {
        Ok(action.target())
    } else {
        Err(TransitionError { action, from })
    }
}

/// Every action that may be taken from `from`
#[must_use]
pub fn allowed_actions(from: RowStatus) -> Vec<WorkflowAction> {
    use WorkflowAction::{Approve, Reject, Review, Submit, ToggleReportInclusion};
    [Submit, Review, Approve, Reject, ToggleReportInclusion]
        .into_iter()
        .filter(|action| action.allowed_from().contains(&from))
        .collect()
}
