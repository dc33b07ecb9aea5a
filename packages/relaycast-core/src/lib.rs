//! Relaycast Core - resilient live stream playback orchestration.
//!
//! Given a match and its ordered list of channel locators, this crate keeps
//! one channel playing: it resolves peer-relay locators into an ordered list
//! of candidate endpoints, classifies render failures, retries transient
//! ones with exponential backoff, fails over between candidates and finally
//! between channels.
//!
//! # Architecture
//!
//! - [`source`]: Locator classification and candidate endpoint resolution
//! - [`playback`]: Failure classifier, retry/failover state machine and the
//!   orchestrator that drives a render engine
//! - [`session`]: Per-match channel sessions (actor tasks) and their manager
//! - [`directory`]: Match/channel directory clients, memoized by [`cache`]
//! - [`events`]: Event system for real-time client communication
//! - [`api`]: HTTP/WebSocket surface
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`RenderEngine`](playback::RenderEngine): Loading and disposing media
//! - [`DirectoryApi`](directory::DirectoryApi): Listing matches and channels
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod directory;
pub mod error;
pub mod events;
pub mod playback;
pub mod protocol_constants;
pub mod runtime;
pub mod session;
pub mod source;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use cache::ResultCache;
pub use error::{
    DirectoryError, DirectoryResult, ErrorCode, RelaycastError, RelaycastResult, SessionError,
    SessionResult,
};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter,
    PlaybackEvent, SessionEvent,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{CacheConfig, Config, DirectoryConfig, RetryPolicy, SessionConfig};
pub use utils::now_millis;

// Re-export resolution and playback types
pub use directory::{CachedDirectory, DirectoryApi, HttpDirectoryClient, Match, StaticDirectory};
pub use playback::{
    classify, AttemptPhase, AttemptState, EngineEvent, ErrorKind, FailureSignal, HttpProbeEngine,
    PlaybackOrchestrator, RenderEngine, RetryStateMachine,
};
pub use session::{SessionHandle, SessionManager, SessionSnapshot};
pub use source::{ChannelLocator, SourceDescriptor, SourceKind, SourceResolver};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{AppState, ServerError};
