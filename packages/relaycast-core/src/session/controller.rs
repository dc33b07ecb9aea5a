//! Channel session controller.
//!
//! Each session is an actor: one Tokio task owns the channel list, the
//! current index and a [`PlaybackOrchestrator`], and drains three sources in
//! a single loop (caller commands, orchestrator inputs, the settle timer).
//! No two transitions for a session ever run concurrently.
//!
//! Callers talk to the actor through a cloneable [`SessionHandle`] and read
//! its state from a `watch` channel of [`SessionSnapshot`]s.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;

use crate::error::{SessionError, SessionResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::playback::{
    AttemptPhase, AttemptState, ErrorKind, OrchestratorInput, PlaybackOrchestrator, RenderEngine,
    Transition,
};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::source::{ChannelLocator, SourceResolver};
use crate::state::RetryPolicy;
use crate::utils::now_millis;

/// Capacity of a session's command queue.
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Creates a fresh render engine for each session.
pub type EngineFactory = Arc<dyn Fn() -> Arc<dyn RenderEngine> + Send + Sync>;

/// Everything a session needs besides its channel list.
#[derive(Clone)]
pub struct SessionContext {
    pub resolver: SourceResolver,
    pub policy: RetryPolicy,
    /// Delay between a terminal failure and the automatic advance.
    pub settle_delay: Duration,
    pub engine_factory: EngineFactory,
    pub emitter: Arc<dyn EventEmitter>,
    pub spawner: TokioSpawner,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub match_id: String,
    pub channel_index: usize,
    pub channel_count: usize,
    pub channel_title: String,
    /// Source label of the current channel (`relay`, `hls`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    pub attempt: AttemptState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<ErrorKind>,
    /// URL currently loaded (or about to be loaded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'static str>,
    /// A terminal failure is waiting out the settle delay before moving on.
    pub auto_advance_pending: bool,
    pub closed: bool,
    pub updated_at: u64,
}

/// Operations a session accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionOp {
    Select(usize),
    Next,
    Previous,
    Stop,
    Close,
}

struct SessionCommand {
    op: SessionOp,
    /// Receives whether the operation changed anything.
    reply: oneshot::Sender<bool>,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    match_id: String,
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Selects channel `index`. Out of range is a no-op and returns `false`.
    pub async fn select(&self, index: usize) -> SessionResult<bool> {
        self.send(SessionOp::Select(index)).await
    }

    /// Moves to the next channel, wrapping to the first.
    pub async fn next(&self) -> SessionResult<()> {
        self.send(SessionOp::Next).await.map(|_| ())
    }

    /// Moves to the previous channel, wrapping to the last.
    pub async fn previous(&self) -> SessionResult<()> {
        self.send(SessionOp::Previous).await.map(|_| ())
    }

    /// Stops playback but keeps the session open.
    pub async fn stop(&self) -> SessionResult<()> {
        self.send(SessionOp::Stop).await.map(|_| ())
    }

    /// Stops playback and ends the session task.
    pub async fn close(&self) -> SessionResult<()> {
        self.send(SessionOp::Close).await.map(|_| ())
    }

    /// `true` once the session task has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, op: SessionOp) -> SessionResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand { op, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Spawns a session for `channels`, starting playback at `start_index`.
///
/// # Errors
///
/// Returns [`SessionError::NoChannels`] for an empty list and
/// [`SessionError::ChannelOutOfRange`] for a bad start index.
pub fn spawn_session(
    id: impl Into<String>,
    match_id: impl Into<String>,
    channels: Vec<ChannelLocator>,
    start_index: usize,
    context: &SessionContext,
) -> SessionResult<SessionHandle> {
    if channels.is_empty() {
        return Err(SessionError::NoChannels);
    }
    if start_index >= channels.len() {
        return Err(SessionError::ChannelOutOfRange {
            index: start_index,
            count: channels.len(),
        });
    }

    let id = id.into();
    let match_id = match_id.into();

    let (orchestrator, inputs) = PlaybackOrchestrator::new(
        id.clone(),
        (context.engine_factory)(),
        context.policy.clone(),
        Arc::clone(&context.emitter),
        context.spawner.clone(),
    );
    let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

    let mut actor = SessionActor {
        id: id.clone(),
        match_id: match_id.clone(),
        channels,
        current: start_index,
        resolver: context.resolver.clone(),
        settle_delay: context.settle_delay,
        orchestrator,
        emitter: Arc::clone(&context.emitter),
        settle: None,
    };
    let (snapshot_tx, snapshot) = watch::channel(actor.snapshot(false));

    actor.emitter.emit_session(SessionEvent::Opened {
        session_id: id.clone(),
        match_id: match_id.clone(),
        channel_count: actor.channels.len(),
        timestamp: now_millis(),
    });
    log::info!(
        "[Session] {} opened for match {} ({} channel(s))",
        id,
        match_id,
        actor.channels.len()
    );
    actor.switch_to(start_index);
    snapshot_tx.send_replace(actor.snapshot(false));

    context
        .spawner
        .spawn(actor.run(commands, inputs, snapshot_tx));

    Ok(SessionHandle {
        id,
        match_id,
        commands: commands_tx,
        snapshot,
    })
}

/// Pending automatic advance after a terminal failure.
struct SettleTimer {
    sleep: Pin<Box<Sleep>>,
}

/// What woke the actor loop.
enum Wake {
    Command(Option<SessionCommand>),
    Input(OrchestratorInput),
    Settled,
}

struct SessionActor {
    id: String,
    match_id: String,
    channels: Vec<ChannelLocator>,
    current: usize,
    resolver: SourceResolver,
    settle_delay: Duration,
    orchestrator: PlaybackOrchestrator,
    emitter: Arc<dyn EventEmitter>,
    settle: Option<SettleTimer>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut inputs: mpsc::UnboundedReceiver<OrchestratorInput>,
        snapshot: watch::Sender<SessionSnapshot>,
    ) {
        loop {
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                Some(input) = inputs.recv() => Wake::Input(input),
                _ = wait_settle(&mut self.settle) => Wake::Settled,
            };

            match wake {
                Wake::Command(None) => break,
                Wake::Command(Some(SessionCommand {
                    op: SessionOp::Close,
                    reply,
                })) => {
                    self.shutdown(&snapshot);
                    let _ = reply.send(true);
                    return;
                }
                Wake::Command(Some(SessionCommand { op, reply })) => {
                    let applied = self.on_command(op);
                    snapshot.send_replace(self.snapshot(false));
                    let _ = reply.send(applied);
                    continue;
                }
                Wake::Input(input) => {
                    if let Some(transition) = self.orchestrator.handle(input) {
                        self.on_transition(&transition);
                    }
                }
                Wake::Settled => {
                    self.settle = None;
                    let next = self.next_index();
                    log::info!(
                        "[Session] {} auto-advancing to channel {}",
                        self.id,
                        next
                    );
                    self.switch_to(next);
                }
            }
            snapshot.send_replace(self.snapshot(false));
        }

        self.shutdown(&snapshot);
    }

    fn on_command(&mut self, op: SessionOp) -> bool {
        match op {
            SessionOp::Select(index) if index < self.channels.len() => {
                self.switch_to(index);
                true
            }
            SessionOp::Select(index) => {
                log::debug!(
                    "[Session] {} ignoring out-of-range channel {} (count {})",
                    self.id,
                    index,
                    self.channels.len()
                );
                false
            }
            SessionOp::Next => {
                self.switch_to(self.next_index());
                true
            }
            SessionOp::Previous => {
                let previous = (self.current + self.channels.len() - 1) % self.channels.len();
                self.switch_to(previous);
                true
            }
            SessionOp::Stop => {
                self.settle = None;
                self.orchestrator.stop().is_some()
            }
            SessionOp::Close => false,
        }
    }

    fn on_transition(&mut self, transition: &Transition) {
        let error_kind = match transition.error_kind {
            Some(kind) if transition.phase == AttemptPhase::Failed && kind.is_terminal() => kind,
            _ => return,
        };

        if self.channels.len() > 1 {
            let to_index = self.next_index();
            log::warn!(
                "[Session] {} channel {} failed ({:?}), advancing to {} in {}ms",
                self.id,
                self.current,
                transition.last_failure,
                to_index,
                self.settle_delay.as_millis()
            );
            self.settle = Some(SettleTimer {
                sleep: Box::pin(tokio::time::sleep(self.settle_delay)),
            });
            self.emitter.emit_session(SessionEvent::AutoAdvanceScheduled {
                session_id: self.id.clone(),
                from_index: self.current,
                to_index,
                delay_ms: self.settle_delay.as_millis() as u64,
                timestamp: now_millis(),
            });
        } else {
            log::warn!(
                "[Session] {} only channel failed ({:?}), giving up",
                self.id,
                transition.last_failure
            );
            self.emitter.emit_session(SessionEvent::TerminalFailure {
                session_id: self.id.clone(),
                channel_index: self.current,
                error_kind,
                last_failure: transition.last_failure,
                retry_count: transition.retry_count,
                candidate_index: transition.candidate_index,
                timestamp: now_millis(),
            });
        }
    }

    /// Makes `index` current: stops the old cycle, then starts the new one.
    fn switch_to(&mut self, index: usize) {
        self.settle = None;
        self.current = index;

        let locator = &self.channels[index];
        let descriptor = self.resolver.resolve(locator);
        log::info!(
            "[Session] {} playing channel {} '{}' ({})",
            self.id,
            index,
            locator.title,
            descriptor.label()
        );
        self.emitter.emit_session(SessionEvent::ChannelSelected {
            session_id: self.id.clone(),
            channel_index: index,
            title: locator.title.clone(),
            source: descriptor.label(),
            timestamp: now_millis(),
        });

        self.orchestrator.stop();
        if let Some(transition) = self.orchestrator.start(index, descriptor) {
            self.on_transition(&transition);
        }
    }

    fn next_index(&self) -> usize {
        (self.current + 1) % self.channels.len()
    }

    fn shutdown(&mut self, snapshot: &watch::Sender<SessionSnapshot>) {
        self.settle = None;
        self.orchestrator.stop();
        self.emitter.emit_session(SessionEvent::Closed {
            session_id: self.id.clone(),
            timestamp: now_millis(),
        });
        snapshot.send_replace(self.snapshot(true));
        log::info!("[Session] {} closed", self.id);
    }

    fn snapshot(&self, closed: bool) -> SessionSnapshot {
        let descriptor = self.orchestrator.descriptor();
        SessionSnapshot {
            session_id: self.id.clone(),
            match_id: self.match_id.clone(),
            channel_index: self.current,
            channel_count: self.channels.len(),
            channel_title: self.channels[self.current].title.clone(),
            source: descriptor.map(|d| d.label()),
            attempt: self.orchestrator.state(),
            last_failure: self.orchestrator.last_failure(),
            current_url: self.orchestrator.current_url().map(str::to_string),
            mime_type: descriptor.map(|d| d.mime_type_hint),
            auto_advance_pending: self.settle.is_some(),
            closed,
            updated_at: now_millis(),
        }
    }
}

/// Resolves when the settle timer fires; pends forever when none is armed.
async fn wait_settle(settle: &mut Option<SettleTimer>) {
    match settle {
        Some(timer) => timer.sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PlaybackEvent;
    use crate::playback::test_fixtures::{Outcome, RecordingEmitter, ScriptedEngine};

    const DIRECT: &str = "https://cdn.example/backup.mp4";

    fn relay_candidate(id: &str, index: usize) -> String {
        SourceResolver::default()
            .relay_candidate_url(id, index)
            .unwrap()
    }

    fn context(engine: Arc<ScriptedEngine>, emitter: Arc<RecordingEmitter>) -> SessionContext {
        SessionContext {
            resolver: SourceResolver::default(),
            policy: RetryPolicy::default(),
            settle_delay: Duration::from_millis(2000),
            engine_factory: Arc::new(move || engine.clone() as Arc<dyn RenderEngine>),
            emitter,
            spawner: TokioSpawner::current(),
        }
    }

    async fn wait_for(
        handle: &SessionHandle,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut rx = handle.watch();
        let snapshot = rx.wait_for(predicate).await.expect("session dropped");
        snapshot.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn relay_fails_over_to_third_candidate() {
        let engine = Arc::new(
            ScriptedEngine::new(Outcome::Fail(2))
                .script(&relay_candidate("X", 1), [Outcome::Fail(4)])
                .script(&relay_candidate("X", 2), [Outcome::Play]),
        );
        let emitter = Arc::new(RecordingEmitter::default());
        let channels = vec![
            ChannelLocator::new(0, "Relay", "relay://X"),
            ChannelLocator::new(1, "Backup", DIRECT),
        ];

        let handle = spawn_session(
            "s1",
            "m1",
            channels,
            0,
            &context(engine.clone(), emitter.clone()),
        )
        .unwrap();

        let playing = wait_for(&handle, |s| s.attempt.phase == AttemptPhase::Playing).await;
        assert_eq!(playing.channel_index, 0);
        assert_eq!(playing.attempt.candidate_index, 2);
        assert_eq!(playing.attempt.retry_count, 0);
        assert_eq!(playing.current_url.as_deref(), Some(relay_candidate("X", 2).as_str()));
        assert_eq!(playing.mime_type, Some("video/mp4"));

        // The direct channel was never touched.
        assert!(!engine.loads().iter().any(|url| url == DIRECT));
    }

    #[tokio::test(start_paused = true)]
    async fn single_channel_exhaustion_is_surfaced_without_advancing() {
        let engine = Arc::new(ScriptedEngine::new(Outcome::Fail(4)));
        let emitter = Arc::new(RecordingEmitter::default());
        let channels = vec![ChannelLocator::new(0, "Only", "relay://Y")];

        let handle = spawn_session(
            "s2",
            "m2",
            channels,
            0,
            &context(engine.clone(), emitter.clone()),
        )
        .unwrap();

        let failed = wait_for(&handle, |s| s.attempt.phase == AttemptPhase::Failed).await;
        assert_eq!(failed.last_failure, Some(ErrorKind::UnsupportedSource));
        assert!(!failed.auto_advance_pending);

        // Nothing happens afterwards: no new loads, no reselection.
        let loads = engine.loads().len();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(engine.loads().len(), loads);
        assert_eq!(handle.snapshot().attempt.phase, AttemptPhase::Failed);

        let terminal: Vec<_> = emitter
            .session()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::TerminalFailure { .. }))
            .collect();
        assert_eq!(terminal.len(), 1);
        match &terminal[0] {
            SessionEvent::TerminalFailure {
                error_kind,
                last_failure,
                candidate_index,
                ..
            } => {
                assert_eq!(*error_kind, ErrorKind::Exhausted);
                assert_eq!(*last_failure, Some(ErrorKind::UnsupportedSource));
                assert_eq!(*candidate_index, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!emitter
            .session()
            .iter()
            .any(|e| matches!(e, SessionEvent::AutoAdvanceScheduled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_auto_advances_after_settle_delay() {
        let engine =
            Arc::new(ScriptedEngine::new(Outcome::Fail(3)).script(DIRECT, [Outcome::Play]));
        let emitter = Arc::new(RecordingEmitter::default());
        let channels = vec![
            ChannelLocator::new(0, "Relay", "relay://Z"),
            ChannelLocator::new(1, "Backup", DIRECT),
        ];

        let handle = spawn_session(
            "s3",
            "m3",
            channels,
            0,
            &context(engine.clone(), emitter.clone()),
        )
        .unwrap();

        let pending = wait_for(&handle, |s| s.auto_advance_pending).await;
        assert_eq!(pending.channel_index, 0);
        let failed_at = tokio::time::Instant::now();

        let playing = wait_for(&handle, |s| {
            s.channel_index == 1 && s.attempt.phase == AttemptPhase::Playing
        })
        .await;
        assert!(failed_at.elapsed() >= Duration::from_millis(2000));
        assert_eq!(playing.current_url.as_deref(), Some(DIRECT));
        assert!(emitter.session().iter().any(|e| matches!(
            e,
            SessionEvent::AutoAdvanceScheduled {
                from_index: 0,
                to_index: 1,
                delay_ms: 2000,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_selection_cancels_pending_auto_advance() {
        let engine = Arc::new(
            ScriptedEngine::new(Outcome::Fail(3)).script("https://c/three.m3u8", [Outcome::Hang]),
        );
        let emitter = Arc::new(RecordingEmitter::default());
        let channels = vec![
            ChannelLocator::new(0, "A", "https://a/one.m3u8"),
            ChannelLocator::new(1, "B", "https://b/two.m3u8"),
            ChannelLocator::new(2, "C", "https://c/three.m3u8"),
        ];

        let handle = spawn_session(
            "s4",
            "m4",
            channels,
            0,
            &context(engine.clone(), emitter.clone()),
        )
        .unwrap();
        wait_for(&handle, |s| s.auto_advance_pending).await;

        assert!(handle.select(2).await.unwrap());
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.channel_index, 2);
        assert!(!snapshot.auto_advance_pending);

        // Well past the settle delay, still inside channel 2's watchdog.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.channel_index, 2);
        assert_eq!(snapshot.attempt.phase, AttemptPhase::Loading);
        assert!(!snapshot.auto_advance_pending);

        let scheduled: Vec<usize> = emitter
            .session()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::AutoAdvanceScheduled { from_index, .. } => Some(*from_index),
                _ => None,
            })
            .collect();
        assert_eq!(scheduled, vec![0]);
        assert!(!engine.loads().iter().any(|url| url == "https://b/two.m3u8"));
    }

    #[tokio::test(start_paused = true)]
    async fn next_and_previous_wrap_and_out_of_range_is_a_noop() {
        let engine = Arc::new(ScriptedEngine::new(Outcome::Play));
        let emitter = Arc::new(RecordingEmitter::default());
        let channels = vec![
            ChannelLocator::new(0, "A", "https://a/one.mp4"),
            ChannelLocator::new(1, "B", "https://b/two.mp4"),
            ChannelLocator::new(2, "C", "https://c/three.mp4"),
        ];

        let handle = spawn_session(
            "s5",
            "m5",
            channels,
            2,
            &context(engine, emitter),
        )
        .unwrap();
        assert_eq!(handle.snapshot().channel_index, 2);

        handle.next().await.unwrap();
        assert_eq!(handle.snapshot().channel_index, 0);

        handle.previous().await.unwrap();
        assert_eq!(handle.snapshot().channel_index, 2);

        assert!(!handle.select(7).await.unwrap());
        assert_eq!(handle.snapshot().channel_index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_channels_stops_then_starts() {
        let engine = Arc::new(ScriptedEngine::new(Outcome::Play));
        let emitter = Arc::new(RecordingEmitter::default());
        let channels = vec![
            ChannelLocator::new(0, "A", "https://a/one.mp4"),
            ChannelLocator::new(1, "B", "https://b/two.mp4"),
        ];

        let handle = spawn_session(
            "s6",
            "m6",
            channels,
            0,
            &context(engine.clone(), emitter.clone()),
        )
        .unwrap();
        wait_for(&handle, |s| s.attempt.phase == AttemptPhase::Playing).await;

        handle.next().await.unwrap();
        wait_for(&handle, |s| {
            s.channel_index == 1 && s.attempt.phase == AttemptPhase::Playing
        })
        .await;

        assert_eq!(engine.disposals(), 1);
        let phases = emitter.phases();
        let playing_at = phases
            .iter()
            .position(|p| *p == AttemptPhase::Playing)
            .unwrap();
        assert_eq!(
            &phases[playing_at + 1..playing_at + 3],
            &[AttemptPhase::Idle, AttemptPhase::Loading]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn close_releases_engine_and_ends_task() {
        let engine = Arc::new(ScriptedEngine::new(Outcome::Hang));
        let emitter = Arc::new(RecordingEmitter::default());
        let channels = vec![ChannelLocator::new(0, "A", "relay://W")];

        let handle = spawn_session(
            "s7",
            "m7",
            channels,
            0,
            &context(engine.clone(), emitter.clone()),
        )
        .unwrap();
        handle.close().await.unwrap();

        assert!(handle.snapshot().closed);
        assert_eq!(engine.disposals(), 1);
        assert_eq!(handle.next().await, Err(SessionError::Closed));
        assert!(emitter
            .session()
            .iter()
            .any(|e| matches!(e, SessionEvent::Closed { .. })));

        // No watchdog fires after close.
        let events = emitter.playback().len();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(emitter.playback().len(), events);
        assert!(emitter.playback().iter().all(|e| match e {
            PlaybackEvent::PhaseChanged { error_kind, .. } => error_kind.is_none(),
        }));
    }

    #[test]
    fn spawn_rejects_empty_and_out_of_range() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let engine = Arc::new(ScriptedEngine::new(Outcome::Play));
        let context = context(engine, Arc::new(RecordingEmitter::default()));

        assert_eq!(
            spawn_session("a", "m", Vec::new(), 0, &context).err(),
            Some(SessionError::NoChannels)
        );
        assert_eq!(
            spawn_session("b", "m", vec![ChannelLocator::new(0, "A", DIRECT)], 1, &context).err(),
            Some(SessionError::ChannelOutOfRange { index: 1, count: 1 })
        );
    }
}
