//! Channel sessions: a playlist of channels bound to a playback orchestrator.

mod controller;
mod manager;

pub use controller::{spawn_session, EngineFactory, SessionContext, SessionHandle, SessionSnapshot};
pub use manager::SessionManager;
