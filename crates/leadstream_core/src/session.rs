use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Record;

/// Opaque token identifying one search. Later sessions always compare greater.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchParameters {
    pub category: String,
    /// Bounding box as the backend expects it (`"south,west,north,east"`).
    pub bbox: String,
    pub center: GeoPoint,
    pub radius_km: f64,
    pub location_name: String,
    /// Free-text filter, possibly filled from an audio transcript.
    #[serde(default)]
    pub filter: Option<String>,
    /// Merge with the previous results instead of replacing them.
    #[serde(default)]
    pub merge: bool,
    pub user_id: String,
}

impl SearchParameters {
    /// Appends transcript text to the free-text filter.
    pub(crate) fn absorb_transcript(&mut self, transcript: &str) {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }
        self.filter = Some(match self.filter.as_deref().map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{existing} {transcript}"),
            _ => transcript.to_string(),
        });
    }
}

/// Recorded audio to turn into filter text before the search is sent.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for AudioAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAttachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    TimedOut,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Cancelled
                | SessionStatus::TimedOut
                | SessionStatus::Failed
        )
    }

    fn can_move_to(self, next: SessionStatus) -> bool {
        match self {
            SessionStatus::Idle => next == SessionStatus::Running,
            SessionStatus::Running => next != SessionStatus::Idle,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::TimedOut => "timed out",
            SessionStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSession {
    pub id: SessionId,
    pub parameters: SearchParameters,
    pub status: SessionStatus,
    pub message: Option<String>,
    pub warnings: Vec<String>,
}

impl SearchSession {
    pub(crate) fn new(id: SessionId, parameters: SearchParameters) -> Self {
        Self {
            id,
            parameters,
            status: SessionStatus::Idle,
            message: None,
            warnings: Vec::new(),
        }
    }

    /// One-way transition. Returns `false` (and changes nothing) when not allowed.
    pub(crate) fn transition(&mut self, next: SessionStatus, message: Option<String>) -> bool {
        if !self.status.can_move_to(next) {
            return false;
        }
        self.status = next;
        if message.is_some() {
            self.message = message;
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }
}

/// What callers get back once a session reaches a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub message: Option<String>,
    pub warnings: Vec<String>,
    pub records: Vec<Record>,
}

/// Payload for the history collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: String,
    pub search_parameters: SearchParameters,
    pub result_count: usize,
    pub valid_result_count: usize,
}
