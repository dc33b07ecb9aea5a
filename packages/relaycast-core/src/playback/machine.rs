//! Retry/failover state machine.
//!
//! [`RetryStateMachine`] is pure: it owns the [`AttemptState`] and an epoch
//! counter, consumes inputs (start, stop, engine events, timer expirations)
//! and returns the [`Effect`]s the driver must perform. It never touches a
//! clock or the engine itself, which keeps every transition testable without
//! a runtime.
//!
//! # Epochs
//!
//! Every load cycle and every stop bumps the epoch. Loads and timers are
//! tagged with the epoch current when they were issued; inputs carrying an
//! older epoch are dropped on receipt, so a late timer or engine callback can
//! never touch state that belongs to a newer cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::classifier::{classify, ErrorKind, FailureSignal};
use super::engine::{EngineEvent, LoadRequest};
use crate::source::SourceDescriptor;
use crate::state::RetryPolicy;
use crate::utils::backoff_delay;

/// Phase of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptPhase {
    #[default]
    Idle,
    Loading,
    Playing,
    Retrying,
    AdvancingCandidate,
    Failed,
}

impl AttemptPhase {
    /// A live attempt may still change state on its own.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Idle | Self::Failed)
    }
}

/// Counters and phase of the attempt on the active channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptState {
    pub channel_index: usize,
    pub candidate_index: usize,
    pub retry_count: u32,
    /// Relay endpoint the cycle started from.
    pub proxy_index: usize,
    pub phase: AttemptPhase,
}

/// Timers the state machine schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Forces a `Timeout` failure if loading does not reach `ready` in time.
    Watchdog,
    /// Reloads the same candidate after backoff.
    Retry,
    /// Loads the next candidate after the fixed advance delay.
    Advance,
}

/// Observable description of a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub phase: AttemptPhase,
    pub error_kind: Option<ErrorKind>,
    pub last_failure: Option<ErrorKind>,
    pub retry_count: u32,
    pub candidate_index: usize,
    pub channel_index: usize,
    pub candidate_url: Option<String>,
    pub retry_in: Option<Duration>,
}

/// Work the driver must carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Cancel every pending timer.
    CancelTimers,
    /// Release the engine's current load, if any.
    Dispose,
    /// Hand a candidate to the engine; its events carry `epoch`.
    Load { epoch: u64, request: LoadRequest },
    /// Post `kind` back after `delay`, tagged with `epoch`.
    Schedule {
        epoch: u64,
        kind: TimerKind,
        delay: Duration,
    },
    /// Report a transition to observers.
    Emit(Transition),
}

/// Pure retry/failover state machine for one channel at a time.
#[derive(Debug)]
pub struct RetryStateMachine {
    policy: RetryPolicy,
    state: AttemptState,
    descriptor: Option<SourceDescriptor>,
    last_failure: Option<ErrorKind>,
    epoch: u64,
}

impl RetryStateMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: AttemptState::default(),
            descriptor: None,
            last_failure: None,
            epoch: 0,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Descriptor of the channel being played, if any.
    pub fn descriptor(&self) -> Option<&SourceDescriptor> {
        self.descriptor.as_ref()
    }

    /// Last classified failure on the active channel.
    pub fn last_failure(&self) -> Option<ErrorKind> {
        self.last_failure
    }

    /// URL of the current candidate.
    pub fn current_url(&self) -> Option<&str> {
        self.descriptor
            .as_ref()
            .and_then(|d| d.candidate(self.state.candidate_index))
    }

    /// Starts a fresh cycle for `descriptor` from its first candidate.
    pub fn start(&mut self, channel_index: usize, descriptor: SourceDescriptor) -> Vec<Effect> {
        self.start_at(channel_index, descriptor, 0)
    }

    /// Starts a fresh cycle, beginning relay sources at endpoint
    /// `proxy_index`. Direct sources, and offsets past the last endpoint,
    /// start from candidate 0.
    pub fn start_at(
        &mut self,
        channel_index: usize,
        descriptor: SourceDescriptor,
        proxy_index: usize,
    ) -> Vec<Effect> {
        let mut effects = self.supersede();

        let proxy_index = if descriptor.is_relay() && proxy_index < descriptor.candidate_count() {
            proxy_index
        } else {
            0
        };

        self.state = AttemptState {
            channel_index,
            candidate_index: proxy_index,
            retry_count: 0,
            proxy_index,
            phase: AttemptPhase::Idle,
        };
        self.last_failure = None;
        self.descriptor = Some(descriptor);

        self.load_current(&mut effects);
        effects
    }

    /// Cancels everything and returns to `Idle`. Safe from any state;
    /// calling it again while idle does nothing.
    pub fn stop(&mut self) -> Vec<Effect> {
        if self.state.phase == AttemptPhase::Idle {
            return Vec::new();
        }

        let mut effects = self.supersede();
        self.state.phase = AttemptPhase::Idle;
        self.state.retry_count = 0;
        effects.push(Effect::Emit(self.transition(None, None, None)));
        effects
    }

    /// Applies an engine event issued for `epoch`.
    pub fn on_engine_event(&mut self, epoch: u64, event: EngineEvent) -> Vec<Effect> {
        if epoch != self.epoch {
            log::trace!(
                "[Playback] Dropping stale engine event {:?} (epoch {} < {})",
                event,
                epoch,
                self.epoch
            );
            return Vec::new();
        }

        match event {
            EngineEvent::Started => Vec::new(),
            EngineEvent::Ready | EngineEvent::Playing => {
                if self.state.phase != AttemptPhase::Loading {
                    return Vec::new();
                }
                self.state.phase = AttemptPhase::Playing;
                self.state.retry_count = 0;
                let url = self.current_url().map(str::to_string);
                vec![
                    Effect::CancelTimers,
                    Effect::Emit(self.transition(None, url, None)),
                ]
            }
            EngineEvent::Failed(code) => self.fail_if_active(&FailureSignal::EngineCode(code)),
            EngineEvent::LoadFailed(reason) => {
                self.fail_if_active(&FailureSignal::LoadError(reason))
            }
        }
    }

    /// Applies a timer expiration scheduled for `epoch`.
    pub fn on_timer(&mut self, epoch: u64, kind: TimerKind) -> Vec<Effect> {
        if epoch != self.epoch {
            log::trace!(
                "[Playback] Dropping stale {:?} timer (epoch {} < {})",
                kind,
                epoch,
                self.epoch
            );
            return Vec::new();
        }

        match (kind, self.state.phase) {
            (TimerKind::Watchdog, AttemptPhase::Loading) => {
                self.fail(classify(&FailureSignal::WatchdogExpired))
            }
            (TimerKind::Retry, AttemptPhase::Retrying)
            | (TimerKind::Advance, AttemptPhase::AdvancingCandidate) => {
                let mut effects = self.supersede();
                self.load_current(&mut effects);
                effects
            }
            _ => Vec::new(),
        }
    }

    /// Bumps the epoch and releases everything tied to the previous one.
    fn supersede(&mut self) -> Vec<Effect> {
        self.epoch += 1;
        vec![Effect::CancelTimers, Effect::Dispose]
    }

    fn load_current(&mut self, effects: &mut Vec<Effect>) {
        let (url, mime_type, watchdog) = match self.descriptor.as_ref() {
            Some(descriptor) => match descriptor.candidate(self.state.candidate_index) {
                Some(url) => (
                    url.to_string(),
                    descriptor.mime_type_hint,
                    self.watchdog_for(descriptor),
                ),
                None => return self.exhaust(effects),
            },
            None => return self.exhaust(effects),
        };

        self.state.phase = AttemptPhase::Loading;
        log::debug!(
            "[Playback] Loading candidate {} (retry {}): {}",
            self.state.candidate_index,
            self.state.retry_count,
            url
        );

        effects.push(Effect::Load {
            epoch: self.epoch,
            request: LoadRequest {
                url: url.clone(),
                mime_type,
            },
        });
        effects.push(Effect::Schedule {
            epoch: self.epoch,
            kind: TimerKind::Watchdog,
            delay: watchdog,
        });
        effects.push(Effect::Emit(self.transition(None, Some(url), None)));
    }

    fn fail_if_active(&mut self, signal: &FailureSignal) -> Vec<Effect> {
        match self.state.phase {
            AttemptPhase::Loading | AttemptPhase::Playing => self.fail(classify(signal)),
            _ => Vec::new(),
        }
    }

    fn fail(&mut self, kind: ErrorKind) -> Vec<Effect> {
        let mut effects = self.supersede();
        self.last_failure = Some(kind);

        let candidate_count = self
            .descriptor
            .as_ref()
            .map_or(0, SourceDescriptor::candidate_count);

        let budget_left = self.state.retry_count < self.policy.max_attempts;
        let has_next = self.state.candidate_index + 1 < candidate_count;
        // Structural failures never touch the retry budget.
        let retry = kind.is_retryable() && !kind.advances_candidate() && budget_left;
        let advance = has_next && (kind.advances_candidate() || kind.is_retryable());

        if retry {
            let delay = backoff_delay(
                self.policy.base_delay(),
                self.policy.backoff_multiplier,
                self.state.retry_count,
            );
            self.state.retry_count += 1;
            self.state.phase = AttemptPhase::Retrying;
            log::warn!(
                "[Playback] Candidate {} failed ({:?}), retry {}/{} in {}ms",
                self.state.candidate_index,
                kind,
                self.state.retry_count,
                self.policy.max_attempts,
                delay.as_millis()
            );

            effects.push(Effect::Schedule {
                epoch: self.epoch,
                kind: TimerKind::Retry,
                delay,
            });
            let url = self.current_url().map(str::to_string);
            effects.push(Effect::Emit(self.transition(Some(kind), url, Some(delay))));
        } else if advance {
            let delay = self.policy.advance_delay();
            self.state.candidate_index += 1;
            self.state.retry_count = 0;
            self.state.phase = AttemptPhase::AdvancingCandidate;
            log::warn!(
                "[Playback] Candidate {} failed ({:?}), advancing to candidate {}",
                self.state.candidate_index - 1,
                kind,
                self.state.candidate_index
            );

            effects.push(Effect::Schedule {
                epoch: self.epoch,
                kind: TimerKind::Advance,
                delay,
            });
            let url = self.current_url().map(str::to_string);
            effects.push(Effect::Emit(self.transition(Some(kind), url, Some(delay))));
        } else {
            self.exhaust(&mut effects);
        }

        effects
    }

    fn exhaust(&mut self, effects: &mut Vec<Effect>) {
        self.state.phase = AttemptPhase::Failed;
        log::warn!(
            "[Playback] Channel {} exhausted after candidate {} (last failure: {:?})",
            self.state.channel_index,
            self.state.candidate_index,
            self.last_failure
        );
        effects.push(Effect::Emit(self.transition(
            Some(classify(&FailureSignal::BudgetExhausted)),
            None,
            None,
        )));
    }

    fn watchdog_for(&self, descriptor: &SourceDescriptor) -> Duration {
        if descriptor.is_relay() {
            Duration::from_millis(self.policy.relay_watchdog_ms)
        } else {
            Duration::from_millis(self.policy.direct_watchdog_ms)
        }
    }

    fn transition(
        &self,
        error_kind: Option<ErrorKind>,
        candidate_url: Option<String>,
        retry_in: Option<Duration>,
    ) -> Transition {
        Transition {
            phase: self.state.phase,
            error_kind,
            last_failure: self.last_failure,
            retry_count: self.state.retry_count,
            candidate_index: self.state.candidate_index,
            channel_index: self.state.channel_index,
            candidate_url,
            retry_in,
        }
    }
}
