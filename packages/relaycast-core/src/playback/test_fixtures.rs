//! Shared test doubles for the playback and session layers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::engine::{EngineEvent, EngineEventSink, LoadRequest, RenderEngine};
use super::machine::AttemptPhase;
use crate::events::{EventEmitter, PlaybackEvent, SessionEvent};

/// Result a [`ScriptedEngine`] reports for one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// `started` then `failed(code)`.
    Fail(u16),
    /// `started`, `ready`, `playing`.
    Play,
    /// `started` and nothing else; only the watchdog ends it.
    Hang,
}

/// Engine that replays a per-URL script of outcomes.
///
/// URLs without a script (or whose script ran out) get `fallback`.
pub(crate) struct ScriptedEngine {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    fallback: Outcome,
    loads: Mutex<Vec<String>>,
    disposals: AtomicUsize,
}

impl ScriptedEngine {
    pub(crate) fn new(fallback: Outcome) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            loads: Mutex::new(Vec::new()),
            disposals: AtomicUsize::new(0),
        }
    }

    /// Queues outcomes for loads of `url`, in order.
    pub(crate) fn script(self, url: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// URLs loaded so far, in order.
    pub(crate) fn loads(&self) -> Vec<String> {
        self.loads.lock().clone()
    }

    pub(crate) fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl RenderEngine for ScriptedEngine {
    fn load(&self, request: &LoadRequest, sink: EngineEventSink) {
        self.loads.lock().push(request.url.clone());
        let outcome = self
            .scripts
            .lock()
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback);

        sink.emit(EngineEvent::Started);
        match outcome {
            Outcome::Fail(code) => {
                sink.emit(EngineEvent::Failed(code));
            }
            Outcome::Play => {
                sink.emit(EngineEvent::Ready);
                sink.emit(EngineEvent::Playing);
            }
            Outcome::Hang => {}
        }
    }

    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Emitter that records everything it receives.
#[derive(Default)]
pub(crate) struct RecordingEmitter {
    playback: Mutex<Vec<PlaybackEvent>>,
    session: Mutex<Vec<SessionEvent>>,
}

impl RecordingEmitter {
    pub(crate) fn playback(&self) -> Vec<PlaybackEvent> {
        self.playback.lock().clone()
    }

    pub(crate) fn session(&self) -> Vec<SessionEvent> {
        self.session.lock().clone()
    }

    /// Phases of every recorded playback transition, in order.
    pub(crate) fn phases(&self) -> Vec<AttemptPhase> {
        self.playback
            .lock()
            .iter()
            .map(|event| match event {
                PlaybackEvent::PhaseChanged { phase, .. } => *phase,
            })
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        self.playback.lock().push(event);
    }

    fn emit_session(&self, event: SessionEvent) {
        self.session.lock().push(event);
    }
}
