use serde::{Deserialize, Serialize};

use crate::Record;

/// One decoded SSE payload from the search stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Human-readable phase description.
    Status {
        #[serde(default)]
        message: String,
    },
    /// A newly discovered record.
    Lead {
        #[serde(rename = "data")]
        record: Record,
    },
    /// Partial patch for a record previously sent as a lead.
    Update {
        #[serde(rename = "data")]
        record: Record,
    },
    /// Terminal signal; nothing follows.
    Complete,
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Status { .. } => "status",
            StreamEvent::Lead { .. } => "lead",
            StreamEvent::Update { .. } => "update",
            StreamEvent::Complete => "complete",
            StreamEvent::Unknown => "unknown",
        }
    }

    /// Renders the event as one wire frame (`data: <json>\n\n`).
    pub fn to_frame(&self) -> String {
        // Serializing this enum cannot fail: every field is a string or a JSON map.
        let payload = serde_json::to_string(self).unwrap_or_default();
        format!("data: {payload}\n\n")
    }
}
