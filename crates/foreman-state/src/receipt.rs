//! Desired states, change reasons and the receipt returned by a reconciliation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::record::Record;

/// The state a record should be left in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Present,
    Absent,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Present => "present",
            DesiredState::Absent => "absent",
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" => Ok(DesiredState::Present),
            "absent" => Ok(DesiredState::Absent),
            _ => Err(StateError::InvalidDesiredState {
                state: s.to_string(),
            }),
        }
    }
}

/// Why a reconciliation did or did not change anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeReason {
    /// The record should exist and does not.
    MissingRecord,
    /// The record exists and matches.
    StatesMatch,
    /// The record exists but differs.
    RecordMismatch,
    /// The record should not exist and does not.
    AlreadyAbsent,
    /// The record exists and should not.
    ExtraRecord,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::MissingRecord => "MissingRecord",
            ChangeReason::StatesMatch => "StatesMatch",
            ChangeReason::RecordMismatch => "RecordMismatch",
            ChangeReason::AlreadyAbsent => "AlreadyAbsent",
            ChangeReason::ExtraRecord => "ExtraRecord",
        }
    }

    /// Human-readable summary of the decision.
    pub fn message(&self) -> &'static str {
        match self {
            ChangeReason::MissingRecord => "The record does not exist and it should.",
            ChangeReason::StatesMatch => "The actual state matches the desired state.",
            ChangeReason::RecordMismatch => "The actual record did not match the desired record.",
            ChangeReason::AlreadyAbsent => "The record is already absent.",
            ChangeReason::ExtraRecord => "The record exists and it should not.",
        }
    }

    /// Whether this reason calls for a create, update or delete.
    pub fn requires_change(&self) -> bool {
        !matches!(self, ChangeReason::StatesMatch | ChangeReason::AlreadyAbsent)
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision taken by the state machine before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDecision {
    pub reason: ChangeReason,
    /// Reason message followed by the comparator's explanation, if any.
    pub detail: String,
}

impl ChangeDecision {
    pub(crate) fn new(reason: ChangeReason, comparison: Option<&str>) -> Self {
        let detail = match comparison {
            Some(explanation) => format!("{} {explanation}", reason.message()),
            None => reason.message().to_string(),
        };
        Self { reason, detail }
    }

    pub fn change_required(&self) -> bool {
        self.reason.requires_change()
    }
}

/// Result of one `ensure_state` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModificationReceipt {
    changed: bool,
    reason: ChangeReason,
    reason_detail: String,
    desired_state: DesiredState,
    minimal_record: Record,
    actual_record: Option<Record>,
    original_record: Option<Record>,
}

impl ModificationReceipt {
    /// Receipt for a call that left the remote state untouched.
    pub(crate) fn unchanged(
        decision: ChangeDecision,
        desired_state: DesiredState,
        minimal_record: Record,
        original_record: Option<Record>,
    ) -> Self {
        Self {
            changed: false,
            reason: decision.reason,
            reason_detail: decision.detail,
            desired_state,
            minimal_record,
            actual_record: original_record.clone(),
            original_record,
        }
    }

    /// Receipt for a call that created, updated or deleted a record.
    pub(crate) fn modified(
        decision: ChangeDecision,
        desired_state: DesiredState,
        minimal_record: Record,
        actual_record: Record,
        original_record: Option<Record>,
    ) -> Self {
        Self {
            changed: true,
            reason: decision.reason,
            reason_detail: decision.detail,
            desired_state,
            minimal_record,
            actual_record: Some(actual_record),
            original_record,
        }
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn reason(&self) -> ChangeReason {
        self.reason
    }

    pub fn reason_detail(&self) -> &str {
        &self.reason_detail
    }

    pub fn desired_state(&self) -> DesiredState {
        self.desired_state
    }

    /// The desired record as sent, including any id carried over from the original.
    pub fn minimal_record(&self) -> &Record {
        &self.minimal_record
    }

    /// The record after the call: the server's response to a mutation, or the
    /// record as read when nothing changed.
    pub fn actual_record(&self) -> Option<&Record> {
        self.actual_record.as_ref()
    }

    /// The record as read before any change.
    pub fn original_record(&self) -> Option<&Record> {
        self.original_record.as_ref()
    }
}
