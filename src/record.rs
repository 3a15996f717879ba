// Task record stored in a todo list

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single to-do item
///
/// Serialized field names match the snapshot format shared with browser
/// clients: `id`, `text`, `completed`, `createdAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique within a store; derived from the creation time in milliseconds
    pub id: i64,
    /// User-supplied text, never blank
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Todo {
    /// Create an open (not completed) todo
    pub fn new(id: i64, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
            created_at,
        }
    }

    /// Flip the completed flag
    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a millisecond timestamp back into a UTC datetime
pub fn timestamp_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Pick an id for a new record.
///
/// Ids come from the clock, but must stay unique and increasing even when
/// several records are created within the same millisecond or the clock
/// steps backwards. Returns `None` once the id space above the largest
/// existing id is exhausted.
pub fn next_id(now: i64, max_existing: Option<i64>) -> Option<i64> {
    match max_existing {
        Some(max) if max >= now => max.checked_add(1),
        _ => Some(now),
    }
}
