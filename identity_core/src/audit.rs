//! Append-only record of every mutating operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One audited operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    /// Structured key/value payload (always a JSON object)
    pub details: Value,
}

/// Ordered audit trail. Entries are only ever appended; the whole log is
/// discarded when a new stream is loaded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the current time.
    pub fn record(&mut self, action: impl Into<String>, details: Value) {
        self.entries.push(AuditEntry {
            timestamp: Utc::now(),
            action: action.into(),
            details,
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Only used on session reset.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pretty JSON array of `{timestamp, action, details}`.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}
