//! Playback retry and failover.
//!
//! - [`classifier`]: raw failure signals to [`ErrorKind`]
//! - [`machine`]: the pure retry/failover state machine
//! - [`engine`]: the render engine boundary and the HTTP probe engine
//! - [`orchestrator`]: drives the state machine against an engine and timers

pub mod classifier;
pub mod engine;
pub mod machine;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use classifier::{classify, ErrorKind, FailureSignal};
pub use engine::{
    EngineEvent, EngineEventSink, HttpProbeEngine, LoadLease, LoadRequest, RenderEngine,
};
pub use machine::{AttemptPhase, AttemptState, Effect, RetryStateMachine, TimerKind, Transition};
pub use orchestrator::{OrchestratorInput, PlaybackOrchestrator};
