use leadstream_core::{Record, SessionEvent, SessionOutcome, SessionStatus};
use serde_json::Value;

use crate::persistence::SessionCache;

/// Turns session events into terminal lines, skipping ones that would
/// repeat what is already on screen.
#[derive(Debug, Default)]
pub(crate) struct ProgressLine {
    last_percent: Option<u32>,
    last_message: Option<String>,
}

impl ProgressLine {
    pub(crate) fn render(&mut self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::Progress {
                percent, message, ..
            } => {
                let whole = percent.floor() as u32;
                let changed = self.last_percent != Some(whole) || self.last_message != *message;
                if !changed {
                    return None;
                }
                self.last_percent = Some(whole);
                self.last_message = message.clone();
                Some(match message {
                    Some(text) => format!("[{whole:>3}%] {text}"),
                    None => format!("[{whole:>3}%]"),
                })
            }
            SessionEvent::ResultsChanged { total, .. } => Some(format!("       {total} results so far")),
            SessionEvent::Warning { message, .. } => Some(format!("warning: {message}")),
            SessionEvent::StateChanged {
                status: SessionStatus::Running,
                ..
            } => Some("Searching...".to_string()),
            SessionEvent::StateChanged { .. }
            | SessionEvent::ResultsPublished { .. }
            | SessionEvent::Finished(_) => None,
        }
    }
}

pub(crate) fn outcome_summary(outcome: &SessionOutcome) -> String {
    let headline = match outcome.status {
        SessionStatus::Completed => "Search completed",
        SessionStatus::Cancelled => "Search cancelled",
        SessionStatus::TimedOut => "Search timed out",
        SessionStatus::Failed => "Search failed",
        SessionStatus::Idle | SessionStatus::Running => "Search stopped",
    };
    match &outcome.message {
        Some(message) => format!("{headline}: {message}"),
        None => headline.to_string(),
    }
}

pub(crate) fn cached_summary(cache: &SessionCache) -> String {
    format!(
        "Cached from {} ({} in {}): {} results, {} with email, {} with phone",
        cache.saved_utc,
        cache.parameters.category,
        cache.parameters.location_name,
        cache.stats.total,
        cache.stats.with_email,
        cache.stats.with_phone
    )
}

/// One line per record: id, name, then whatever contact fields are filled.
pub(crate) fn record_line(record: &Record) -> String {
    let mut parts = vec![record.id.to_string()];
    for key in ["name", "email", "phone", "website"] {
        if let Some(text) = record.get(key).and_then(display_value) {
            parts.push(text);
        }
    }
    parts.join(" | ")
}

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.trim().to_string()),
        other => Some(other.to_string()),
    }
}
