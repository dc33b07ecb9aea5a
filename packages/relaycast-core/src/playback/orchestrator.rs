//! Effect driver for the retry state machine.
//!
//! [`PlaybackOrchestrator`] owns a [`RetryStateMachine`] and carries out the
//! effects it returns: loads go to the render engine through a
//! [`LoadLease`], timers become spawned sleeps, transitions become
//! [`PlaybackEvent`]s. Engine callbacks and timer expirations come back as
//! [`OrchestratorInput`]s on a single queue, which the owner drains and
//! feeds to [`PlaybackOrchestrator::handle`] one at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::classifier::ErrorKind;
use super::engine::{EngineEvent, EngineEventSink, LoadLease, RenderEngine};
use super::machine::{AttemptState, Effect, RetryStateMachine, TimerKind, Transition};
use crate::events::{EventEmitter, PlaybackEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::source::SourceDescriptor;
use crate::state::RetryPolicy;
use crate::utils::now_millis;

/// Inputs posted back to the orchestrator's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorInput {
    /// An engine event for the load issued at `epoch`.
    Engine { epoch: u64, event: EngineEvent },
    /// A timer scheduled at `epoch` fired.
    Timer { epoch: u64, kind: TimerKind },
}

/// Drives one render engine through scoped load/dispose cycles.
pub struct PlaybackOrchestrator {
    session_id: String,
    machine: RetryStateMachine,
    engine: Arc<dyn RenderEngine>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    inputs: mpsc::UnboundedSender<OrchestratorInput>,
    lease: Option<LoadLease>,
    timer_token: CancellationToken,
    // Cancels outstanding timers when replaced or when the orchestrator drops.
    _timer_guard: DropGuard,
}

impl PlaybackOrchestrator {
    /// Creates an orchestrator and the receiving end of its input queue.
    pub fn new(
        session_id: impl Into<String>,
        engine: Arc<dyn RenderEngine>,
        policy: RetryPolicy,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
    ) -> (Self, mpsc::UnboundedReceiver<OrchestratorInput>) {
        let (inputs, rx) = mpsc::unbounded_channel();
        let timer_token = CancellationToken::new();
        let orchestrator = Self {
            session_id: session_id.into(),
            machine: RetryStateMachine::new(policy),
            engine,
            emitter,
            spawner,
            inputs,
            lease: None,
            _timer_guard: timer_token.clone().drop_guard(),
            timer_token,
        };
        (orchestrator, rx)
    }

    pub fn state(&self) -> AttemptState {
        self.machine.state()
    }

    pub fn epoch(&self) -> u64 {
        self.machine.epoch()
    }

    pub fn descriptor(&self) -> Option<&SourceDescriptor> {
        self.machine.descriptor()
    }

    pub fn last_failure(&self) -> Option<ErrorKind> {
        self.machine.last_failure()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.machine.current_url()
    }

    /// `true` while the engine holds a load.
    pub fn has_active_load(&self) -> bool {
        self.lease.is_some()
    }

    /// Starts playing `descriptor` as channel `channel_index`.
    ///
    /// Returns the resulting transition (`Loading`, or `Failed` when the
    /// descriptor has no candidates).
    pub fn start(
        &mut self,
        channel_index: usize,
        descriptor: SourceDescriptor,
    ) -> Option<Transition> {
        let effects = self.machine.start(channel_index, descriptor);
        self.apply(effects)
    }

    /// Like [`start`](Self::start), beginning relay sources at endpoint
    /// `proxy_index`.
    pub fn start_at(
        &mut self,
        channel_index: usize,
        descriptor: SourceDescriptor,
        proxy_index: usize,
    ) -> Option<Transition> {
        let effects = self.machine.start_at(channel_index, descriptor, proxy_index);
        self.apply(effects)
    }

    /// Cancels pending timers, disposes the current load and goes idle.
    pub fn stop(&mut self) -> Option<Transition> {
        let effects = self.machine.stop();
        self.apply(effects)
    }

    /// Feeds one queued input to the state machine.
    pub fn handle(&mut self, input: OrchestratorInput) -> Option<Transition> {
        let effects = match input {
            OrchestratorInput::Engine { epoch, event } => {
                self.machine.on_engine_event(epoch, event)
            }
            OrchestratorInput::Timer { epoch, kind } => self.machine.on_timer(epoch, kind),
        };
        self.apply(effects)
    }

    fn apply(&mut self, effects: Vec<Effect>) -> Option<Transition> {
        let mut last = None;
        for effect in effects {
            match effect {
                Effect::CancelTimers => self.reset_timers(),
                Effect::Dispose => {
                    self.lease.take();
                }
                Effect::Load { epoch, request } => {
                    // Release any previous load before the engine starts the next one.
                    self.lease.take();
                    let sink = EngineEventSink::new(epoch, self.inputs.clone());
                    self.lease = Some(LoadLease::acquire(
                        Arc::clone(&self.engine),
                        &request,
                        sink,
                    ));
                }
                Effect::Schedule { epoch, kind, delay } => {
                    let token = self.timer_token.clone();
                    let tx = self.inputs.clone();
                    self.spawner.spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {
                                let _ = tx.send(OrchestratorInput::Timer { epoch, kind });
                            }
                        }
                    });
                }
                Effect::Emit(transition) => {
                    self.emitter.emit_playback(self.to_event(&transition));
                    last = Some(transition);
                }
            }
        }
        last
    }

    fn reset_timers(&mut self) {
        self.timer_token = CancellationToken::new();
        // Dropping the previous guard cancels every timer it covered.
        self._timer_guard = self.timer_token.clone().drop_guard();
    }

    fn to_event(&self, transition: &Transition) -> PlaybackEvent {
        PlaybackEvent::PhaseChanged {
            session_id: self.session_id.clone(),
            phase: transition.phase,
            error_kind: transition.error_kind,
            last_failure: transition.last_failure,
            retry_count: transition.retry_count,
            candidate_index: transition.candidate_index,
            channel_index: transition.channel_index,
            candidate_url: transition.candidate_url.clone(),
            retry_in_ms: transition.retry_in.map(|d| d.as_millis() as u64),
            timestamp: now_millis(),
        }
    }
}
