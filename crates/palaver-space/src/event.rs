//! Event records and the external delivery boundary.

use crate::node::NodeId;
use palaver_core::ChatLogRecord;
use serde::{Deserialize, Serialize};

/// Event severity, on the standard 1..=1000 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Min,
    Low,
    MediumLow,
    Medium,
    MediumHigh,
    High,
    Max,
}

impl EventSeverity {
    /// The numeric severity value.
    #[must_use]
    pub fn value(self) -> u16 {
        match self {
            EventSeverity::Min => 1,
            EventSeverity::Low => 101,
            EventSeverity::MediumLow => 301,
            EventSeverity::Medium => 501,
            EventSeverity::MediumHigh => 701,
            EventSeverity::High => 801,
            EventSeverity::Max => 1000,
        }
    }
}

/// A human-readable message with its locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale identifier, e.g. `en-US`.
    pub locale: String,
    /// The text.
    pub text: String,
}

impl LocalizedText {
    /// Create an `en-US` text.
    #[must_use]
    pub fn english(text: impl Into<String>) -> Self {
        Self {
            locale: String::from("en-US"),
            text: text.into(),
        }
    }
}

/// An ephemeral event composed per post.
///
/// Composed only when someone is watching the source node; it is handed
/// straight to the delivery engine and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    /// The node the event originates from.
    pub source: NodeId,
    /// Event severity.
    pub severity: EventSeverity,
    /// Localized summary.
    pub message: LocalizedText,
    /// The posted record, copied by value.
    pub record: ChatLogRecord,
}

/// The external notification/delivery engine.
///
/// Implementations fan events and attribute changes out to remote
/// subscribers. Callers never hold the address-space lock across these
/// calls.
pub trait DeliveryEngine: Send + Sync {
    /// Deliver a composed event to interested parties.
    fn report_event(&self, event: &ChatEvent);

    /// Make an attribute change visible to attribute subscribers.
    fn attribute_changed(&self, node: &NodeId);
}
