use crate::{
    AudioAttachment, HistoryEntry, Record, SearchParameters, SessionId, SessionOutcome,
    SessionStatus,
};

/// Work the runtime must perform after an `update`.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Transcribe {
        session_id: SessionId,
        audio: AudioAttachment,
    },
    OpenStream {
        session_id: SessionId,
        parameters: SearchParameters,
    },
    /// Best-effort abort of the transport (and any pending transcription).
    AbortStream { session_id: SessionId },
    ArmTimeout { session_id: SessionId },
    DisarmTimeout { session_id: SessionId },
    StartClock { session_id: SessionId },
    StopClock { session_id: SessionId },
    /// Arm the cap on waiting for the completion sprint.
    AwaitCompletion { session_id: SessionId },
    /// Arm the settle delay that precedes reporting completion.
    ScheduleSettle { session_id: SessionId },
    RecordHistory {
        session_id: SessionId,
        entry: HistoryEntry,
    },
    /// Forward to whoever presents the session.
    Notify(SessionEvent),
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        session_id: SessionId,
        status: SessionStatus,
        message: Option<String>,
    },
    Progress {
        session_id: SessionId,
        percent: f64,
        message: Option<String>,
    },
    ResultsChanged {
        session_id: SessionId,
        total: usize,
    },
    /// Authoritative result set, sent when the backend signals completion.
    ResultsPublished {
        session_id: SessionId,
        records: Vec<Record>,
    },
    Warning {
        session_id: SessionId,
        message: String,
    },
    Finished(SessionOutcome),
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::StateChanged { session_id, .. }
            | SessionEvent::Progress { session_id, .. }
            | SessionEvent::ResultsChanged { session_id, .. }
            | SessionEvent::ResultsPublished { session_id, .. }
            | SessionEvent::Warning { session_id, .. } => *session_id,
            SessionEvent::Finished(outcome) => outcome.session_id,
        }
    }
}
