use crate::{AudioAttachment, Record, SearchParameters, SessionId};

/// Everything that can happen to the controller. Messages produced by IO or
/// timers carry the session they belong to; stale ones are dropped by `update`.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User submitted a search.
    SearchSubmitted {
        parameters: SearchParameters,
        audio: Option<AudioAttachment>,
    },
    /// Transcription collaborator answered (or failed).
    TranscriptResolved {
        session_id: SessionId,
        result: Result<String, String>,
    },
    /// Raw bytes read from the search stream.
    ChunkReceived {
        session_id: SessionId,
        chunk: Vec<u8>,
    },
    /// Transport reported end of stream.
    StreamEnded { session_id: SessionId },
    /// Request rejected or transport broke.
    StreamFailed {
        session_id: SessionId,
        message: String,
    },
    /// Progress clock period elapsed.
    Tick { session_id: SessionId },
    /// Safety cap on waiting for the completion sprint.
    CompletionWaitElapsed { session_id: SessionId },
    /// Settle delay after the sprint finished.
    SettleElapsed { session_id: SessionId },
    /// Global search timeout fired.
    TimeoutElapsed { session_id: SessionId },
    /// User clicked cancel.
    CancelRequested,
    /// Seed the result set from the session cache before any search runs.
    RestoreResults(Vec<Record>),
}
