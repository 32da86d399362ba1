use crate::view_model::SessionView;
use crate::{
    EventFrameParser, HistoryEntry, ProgressSynthesizer, Record, ResultAccumulator, SearchSession,
    SessionId, SessionOutcome, SessionStatus,
};

/// Where the current session is within its stream lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    /// Waiting for the audio transcript before opening the stream.
    Transcribing,
    Streaming,
    /// `complete` received; waiting for the displayed sprint to finish.
    AwaitingFinish,
    /// Sprint done; settle delay running.
    Settling,
    Closed,
}

/// Whole controller state. Mutated only through [`crate::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub(crate) last_session: SessionId,
    pub(crate) session: Option<SearchSession>,
    pub(crate) phase: StreamPhase,
    pub(crate) parser: EventFrameParser,
    pub(crate) results: ResultAccumulator,
    pub(crate) progress: ProgressSynthesizer,
    pub(crate) seen_status: bool,
    pub(crate) dropped_frames: usize,
    dirty: bool,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> SessionView {
        let message = match &self.session {
            Some(session) if session.status.is_terminal() => session.message.clone(),
            _ => self.progress.message().map(ToOwned::to_owned),
        };
        SessionView {
            session_id: self.current_session_id(),
            status: self.status(),
            phase: self.phase,
            displayed_percent: self.progress.displayed(),
            target_percent: self.progress.target(),
            message,
            warnings: self
                .session
                .as_ref()
                .map(|session| session.warnings.clone())
                .unwrap_or_default(),
            stats: self.results.stats(),
            dropped_frames: self.dropped_frames,
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn session(&self) -> Option<&SearchSession> {
        self.session.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|session| session.status)
            .unwrap_or_default()
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn results(&self) -> &ResultAccumulator {
        &self.results
    }

    pub fn snapshot(&self) -> Vec<Record> {
        self.results.snapshot()
    }

    pub fn progress(&self) -> &ProgressSynthesizer {
        &self.progress
    }

    pub fn displayed_percent(&self) -> f64 {
        self.progress.displayed()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn allocate_session_id(&mut self) -> SessionId {
        self.last_session = self.last_session.next();
        self.last_session
    }

    pub(crate) fn outcome(&self) -> Option<SessionOutcome> {
        self.session.as_ref().map(|session| SessionOutcome {
            session_id: session.id,
            status: session.status,
            message: session.message.clone(),
            warnings: session.warnings.clone(),
            records: self.results.snapshot(),
        })
    }

    pub(crate) fn history_entry(&self) -> Option<HistoryEntry> {
        let stats = self.results.stats();
        self.session.as_ref().map(|session| HistoryEntry {
            user_id: session.parameters.user_id.clone(),
            search_parameters: session.parameters.clone(),
            result_count: stats.total,
            valid_result_count: stats.valid,
        })
    }
}
