//! Event emitter abstraction for decoupling playback from transport.
//!
//! The orchestrator and session controller depend on the [`EventEmitter`]
//! trait rather than concrete broadcast channels, enabling testing and
//! alternative transport implementations.

use super::{PlaybackEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn close(&self, session_id: String) {
///         self.emitter.emit_session(SessionEvent::Closed { session_id, timestamp: now_millis() });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a playback state machine transition.
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a channel session lifecycle event.
    fn emit_session(&self, event: SessionEvent);
}

/// No-op emitter for embedding without a UI, or for tests that only inspect
/// state.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_playback(&self, _event: PlaybackEvent) {
        // No-op
    }

    fn emit_session(&self, _event: SessionEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        playback_count: AtomicUsize,
        session_count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_playback(&self, _event: PlaybackEvent) {
            self.playback_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_session(&self, _event: SessionEvent) {
            self.session_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter {
            playback_count: AtomicUsize::new(0),
            session_count: AtomicUsize::new(0),
        });
        let dyn_emitter: Arc<dyn EventEmitter> = emitter.clone();

        dyn_emitter.emit_session(SessionEvent::Opened {
            session_id: "s".into(),
            match_id: "m".into(),
            channel_count: 2,
            timestamp: 0,
        });
        dyn_emitter.emit_session(SessionEvent::Closed {
            session_id: "s".into(),
            timestamp: 0,
        });

        assert_eq!(emitter.session_count.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.playback_count.load(Ordering::SeqCst), 0);
    }
}
