//! Leadstream engine: HTTP collaborators and the async runtime that executes
//! the core's effects.
mod backend;
mod controller;
mod persist;
mod types;

pub use backend::{
    BackendSettings, ChunkStream, HistoryRecorder, ReqwestBackend, SearchBackend, Transcriber,
};
pub use controller::{
    CancelHandle, ControllerClosed, ControllerServices, ControllerSettings, SearchController,
};
pub use persist::{ensure_parent_dir, write_atomically, PersistError};
pub use types::{FailureKind, LocationPayload, SearchRequest, TransportError};
