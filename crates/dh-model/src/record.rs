//! Field-map records
//!
//! Section schemas belong to domain configuration, so the engine treats a
//! row as a JSON object. The handful of bookkeeping fields the engine itself
//! reads and writes are named in [`fields`].

use crate::ids::{RowId, RowVersion};
use crate::status::{RowStatus, ValidationStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Names of the fields owned by the engine
pub mod fields {
    /// Workflow status code
    pub const ROW_STATUS: &str = "RowStatus";
    /// Save-tier status code
    pub const VALIDATION_STATUS: &str = "ValidationStatus";
    /// Free-text validation errors recorded by earlier tooling
    pub const VALIDATION_ERRORS: &str = "ValidationErrors";
    /// Last modification timestamp (RFC 3339, UTC)
    pub const MODIFIED_ON: &str = "ModifiedOnDt";
    /// Last modifying user
    pub const MODIFIED_BY: &str = "ModifiedBy";
    /// Report-inclusion flag; only meaningful while approved
    pub const REPORT_INCLUDE: &str = "ReportIncludeInd";
    /// Soft-delete flag on row shapes that carry one
    pub const ACTIVE: &str = "ActiveInd";
    /// Reviewer stamp
    pub const REVIEWED_BY: &str = "ReviewedBy";
    /// Review timestamp
    pub const REVIEWED_ON: &str = "ReviewedOnDt";
    /// Approver stamp
    pub const APPROVED_BY: &str = "ApprovedBy";
    /// Approval timestamp
    pub const APPROVED_ON: &str = "ApprovedOnDt";
    /// Optimistic-concurrency version stamp
    pub const ROW_VERSION: &str = "rv";

    /// Fields that change on every write and never count as a user edit
    pub const BOOKKEEPING: &[&str] = &[ROW_VERSION, MODIFIED_ON, MODIFIED_BY, VALIDATION_STATUS];
}

/// One physical row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Empty record
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; `None` unless it is an object
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Field value
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether the field is present (even if null)
    #[inline]
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Set a field, returning the previous value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Builder-style [`Record::set`]
    #[inline]
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Overwrite fields present in `partial`, keeping the rest
    pub fn merge(&mut self, partial: &Record) {
        for (field, value) in &partial.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Iterate fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Numeric field value
    #[must_use]
    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    /// Text field value
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Row identity read from `id_field`; numbers are rendered as strings
    #[must_use]
    pub fn row_id(&self, id_field: &str) -> Option<RowId> {
        scalar_string(self.get(id_field)?).map(RowId::new)
    }

    /// Version stamp, if the store has assigned one
    #[must_use]
    pub fn version(&self) -> Option<RowVersion> {
        scalar_string(self.get(fields::ROW_VERSION)?).map(RowVersion::new)
    }

    /// Workflow status; missing or unknown codes read as draft
    #[must_use]
    pub fn row_status(&self) -> RowStatus {
        self.get(fields::ROW_STATUS)
            .and_then(Value::as_u64)
            .and_then(|code| u8::try_from(code).ok())
            .and_then(RowStatus::from_code)
            .unwrap_or_default()
    }

    /// Write the workflow status
    pub fn set_row_status(&mut self, status: RowStatus) {
        self.set(fields::ROW_STATUS, status.code());
    }

    /// Write the save-tier status code
    pub fn set_validation_status(&mut self, status: ValidationStatus) {
        self.set(fields::VALIDATION_STATUS, status.code());
    }

    /// Stamp modification time and user
    pub fn stamp_modified(&mut self, at: DateTime<Utc>, user: &str) {
        self.set(fields::MODIFIED_ON, format_timestamp(at));
        self.set(fields::MODIFIED_BY, user);
    }

    /// Soft-delete state for row shapes with an active flag; others are active
    #[must_use]
    pub fn is_active(&self) -> bool {
        match self.get(fields::ACTIVE) {
            Some(Value::Bool(active)) => *active,
            Some(Value::Number(n)) => n.as_i64() != Some(0),
            _ => true,
        }
    }

    /// Flip the active flag, but only on row shapes that have one
    pub fn set_active_if_present(&mut self, active: bool) {
        if let Some(slot) = self.0.get_mut(fields::ACTIVE) {
            *slot = match slot {
                Value::Number(_) => Value::from(i64::from(active)),
                _ => Value::Bool(active),
            };
        }
    }

    /// Report-inclusion flag
    #[must_use]
    pub fn report_included(&self) -> bool {
        matches!(self.get(fields::REPORT_INCLUDE), Some(Value::Bool(true)))
    }

    /// Compare user-visible content, skipping the named fields
    #[must_use]
    pub fn same_content(&self, other: &Record, ignored: &[&str]) -> bool {
        let visible = |record: &Record| {
            record
                .0
                .iter()
                .filter(|(field, _)| !ignored.contains(&field.as_str()))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect::<Map<String, Value>>()
        };
        visible(self) == visible(other)
    }

    /// Unwrap into a JSON value
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Timestamp format used for every stamp the engine writes
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn row_id_reads_strings_and_numbers() {
        assert_eq!(row(json!({"id": "S1"})).row_id("id"), Some(RowId::new("S1")));
        assert_eq!(row(json!({"id": 42})).row_id("id"), Some(RowId::new("42")));
        assert_eq!(row(json!({"id": ""})).row_id("id"), None);
        assert_eq!(row(json!({"other": 1})).row_id("id"), None);
    }

    #[test]
    fn missing_status_reads_as_draft() {
        assert_eq!(Record::new().row_status(), RowStatus::Draft);
        assert_eq!(row(json!({"RowStatus": 3})).row_status(), RowStatus::Approved);
        assert_eq!(row(json!({"RowStatus": 77})).row_status(), RowStatus::Draft);
    }

    #[test]
    fn merge_overwrites_only_given_fields() {
        let mut base = row(json!({"DepthFrom": 0, "DepthTo": 1}));
        base.merge(&row(json!({"DepthTo": 2})));
        assert_eq!(base, row(json!({"DepthFrom": 0, "DepthTo": 2})));
    }

    #[test]
    fn active_flag_only_flips_when_present() {
        let mut flagged = row(json!({"ActiveInd": true}));
        flagged.set_active_if_present(false);
        assert!(!flagged.is_active());

        let mut numeric = row(json!({"ActiveInd": 1}));
        numeric.set_active_if_present(false);
        assert_eq!(numeric.get(fields::ACTIVE), Some(&json!(0)));

        let mut plain = row(json!({"x": 1}));
        plain.set_active_if_present(false);
        assert!(!plain.has(fields::ACTIVE));
        assert!(plain.is_active());
    }

    #[test]
    fn same_content_skips_bookkeeping() {
        let a = row(json!({"DepthTo": 2, "rv": "1"}));
        let b = row(json!({"DepthTo": 2, "rv": "2", "ModifiedOnDt": "x"}));
        assert!(a.same_content(&b, fields::BOOKKEEPING));
        assert!(!a.same_content(&b, &[]));
    }

    #[test]
    fn version_reads_rv() {
        assert_eq!(row(json!({"rv": 5})).version(), Some(RowVersion::new("5")));
        assert_eq!(Record::new().version(), None);
    }
}
