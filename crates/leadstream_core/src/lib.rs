//! Leadstream core: pure search-session state machine.
//!
//! Frame parsing, result accumulation and progress synthesis live here along
//! with the `update` function that ties them to a session. Nothing in this
//! crate performs IO or reads a clock; the engine feeds it messages.
mod accumulator;
mod effect;
mod event;
mod frame;
mod msg;
pub mod progress;
mod record;
mod session;
mod state;
mod update;
mod view_model;

pub use accumulator::{ResultAccumulator, ResultStats};
pub use effect::{Effect, SessionEvent};
pub use event::StreamEvent;
pub use frame::{EventFrameParser, FrameWarning};
pub use msg::Msg;
pub use progress::ProgressSynthesizer;
pub use record::{Record, RecordId};
pub use session::{
    AudioAttachment, GeoPoint, HistoryEntry, SearchParameters, SearchSession, SessionId,
    SessionOutcome, SessionStatus,
};
pub use state::{ControllerState, StreamPhase};
pub use update::update;
pub use view_model::SessionView;
