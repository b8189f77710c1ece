//! The chat log record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of a single post.
///
/// Created once at post time and copied by value into every consumer;
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLogRecord {
    /// When the post was made.
    pub at: DateTime<Utc>,
    /// Name of the poster.
    pub name: String,
    /// Posted content.
    pub content: String,
}

impl ChatLogRecord {
    /// Create a new record, capturing the current time.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            name: name.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_captures_fields() {
        let record = ChatLogRecord::new("alice", "hi");
        assert_eq!(record.name, "alice");
        assert_eq!(record.content, "hi");
        assert!(record.at <= Utc::now());
    }

    #[test]
    fn test_record_roundtrips_through_json() {
        let record = ChatLogRecord::new("bob", "yo");
        let json = serde_json::to_string(&record).unwrap();
        let back: ChatLogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
