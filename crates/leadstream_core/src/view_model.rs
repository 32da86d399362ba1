use crate::{ResultStats, SessionId, SessionStatus, StreamPhase};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionView {
    pub session_id: Option<SessionId>,
    pub status: SessionStatus,
    pub phase: StreamPhase,
    pub displayed_percent: f64,
    pub target_percent: f64,
    /// Latest phase message while running, outcome message once finished.
    pub message: Option<String>,
    pub warnings: Vec<String>,
    pub stats: ResultStats,
    pub dropped_frames: usize,
    pub dirty: bool,
}

impl SessionView {
    /// Displayed percentage rounded for labels.
    pub fn percent_label(&self) -> String {
        format!("{:.0}%", self.displayed_percent.floor())
    }
}
