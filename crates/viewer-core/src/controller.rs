//! Preview session controller.
//!
//! A single-writer state machine deciding, from load signals that may arrive
//! late, twice or never, whether a preview is ready, should fall back to the
//! next strategy, or has failed for good. It performs no I/O: every operation
//! returns the side effects the caller must carry out (arm or disarm a
//! deadline, issue a load, notify the host).
//!
//! ```text
//! Idle --start--> Loading
//! Loading --Loaded--> Ready
//! Loading --PartialContent--> Degraded
//! Loading --Failed/timeout, attempts remain--> Loading (next strategy)
//! Loading --Failed/timeout, exhausted--> Failed
//! Degraded | Failed --retry--> Loading
//! any --cancel--> Idle
//! ```

use crate::clock::{Clock, SystemClock};
use crate::session::{PreviewPolicy, PreviewSession, SessionState, SessionStatus};
use crate::signal::{FailureReason, Generation, Signal};
use crate::source::{resolve, DocumentRef, ResolvedSource};
use doc_model::Strategy;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Instruction for the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub generation: Generation,
    pub strategy: Strategy,
    /// Zero for the first load of a session; surfaces may use it to bust caches.
    pub attempt: u32,
    pub source: ResolvedSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ArmDeadline { generation: Generation, deadline: Instant },
    DisarmDeadline { generation: Generation },
    Load(LoadRequest),
    Notify(SessionStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("at least one rendering strategy is required")]
    NoStrategies,
    #[error("timeout per attempt must be greater than zero")]
    ZeroTimeout,
    #[error("cannot {operation} a preview that is {state}")]
    InvalidTransition { operation: &'static str, state: SessionState },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub sessions_started: u64,
    pub fallbacks: u64,
    pub timeouts: u64,
    pub user_retries: u64,
    /// Signals tagged with a generation that is no longer current.
    pub stale_signals: u64,
    /// Current-generation signals that arrived after the attempt settled.
    pub ignored_signals: u64,
    pub stale_timeouts: u64,
}

pub struct PreviewController {
    clock: Arc<dyn Clock>,
    session: Option<PreviewSession>,
    generation: Generation,
    stats: ControllerStats,
}

impl PreviewController {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            session: None,
            generation: Generation::default(),
            stats: ControllerStats::default(),
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Opens a fresh session for `document`, replacing any previous one.
    pub fn start(
        &mut self,
        document: DocumentRef,
        policy: PreviewPolicy,
    ) -> Result<Vec<Effect>, ControllerError> {
        if policy.strategies.is_empty() {
            return Err(ControllerError::NoStrategies);
        }
        if policy.timeout_per_attempt.is_zero() {
            return Err(ControllerError::ZeroTimeout);
        }

        let mut effects = Vec::new();
        self.discard_session(&mut effects);

        self.generation = self.generation.next();
        info!(
            "preview {}: opening {document} ({} strategies, {:?} per attempt, max {} attempts)",
            self.generation,
            policy.strategies.len(),
            policy.timeout_per_attempt,
            policy.max_attempts
        );
        self.session = Some(PreviewSession::new(document, policy, self.generation));
        self.stats.sessions_started += 1;

        self.begin_attempt(&mut effects);
        Ok(effects)
    }

    pub fn on_signal(&mut self, generation: Generation, signal: Signal) -> Vec<Effect> {
        let mut effects = Vec::new();

        let Some(session) = self.session.as_mut() else {
            self.stats.stale_signals += 1;
            debug!("dropping {} signal for {generation}: no active session", signal.name());
            return effects;
        };

        if session.generation != generation {
            self.stats.stale_signals += 1;
            debug!(
                "dropping stale {} signal for {generation} (current {})",
                signal.name(),
                session.generation
            );
            return effects;
        }

        match (session.state, signal) {
            (SessionState::Loading, Signal::Loaded) => {
                disarm(session, &mut effects);
                session.state = SessionState::Ready;
                info!("preview {generation}: ready via {}", session.strategy());
                effects.push(Effect::Notify(session.status()));
            }
            (SessionState::Loading, Signal::PartialContent) => {
                disarm(session, &mut effects);
                session.state = SessionState::Degraded;
                info!("preview {generation}: partial content via {}", session.strategy());
                effects.push(Effect::Notify(session.status()));
            }
            (SessionState::Loading, Signal::Failed(reason)) => {
                self.handle_failure(FailureReason::Surface(reason), &mut effects);
            }
            (state, signal) => {
                self.stats.ignored_signals += 1;
                debug!("preview {generation}: ignoring {} signal while {state}", signal.name());
            }
        }

        effects
    }

    /// Deadline expiry for `generation`. Timers from earlier attempts or
    /// sessions are ignored.
    pub fn on_timeout(&mut self, generation: Generation) -> Vec<Effect> {
        let mut effects = Vec::new();

        let armed = self.session.as_ref().is_some_and(|session| {
            session.generation == generation
                && session.state == SessionState::Loading
                && session.deadline.is_some()
        });
        if !armed {
            self.stats.stale_timeouts += 1;
            debug!("ignoring stale deadline for {generation}");
            return effects;
        }

        self.stats.timeouts += 1;
        if let Some(session) = self.session.as_ref() {
            warn!(
                "preview {generation}: no signal from {} within {:?}",
                session.strategy(),
                session.timeout_per_attempt()
            );
        }
        self.handle_failure(FailureReason::Timeout, &mut effects);
        effects
    }

    /// Fires the current deadline if the clock has passed it.
    pub fn poll(&mut self) -> Vec<Effect> {
        let now = self.clock.now();
        let due = self.session.as_ref().and_then(|session| match session.deadline {
            Some(deadline) if session.state == SessionState::Loading && now >= deadline => {
                Some(session.generation)
            }
            _ => None,
        });

        match due {
            Some(generation) => self.on_timeout(generation),
            None => Vec::new(),
        }
    }

    /// User-initiated restart of the whole fallback chain.
    pub fn retry(&mut self) -> Result<Vec<Effect>, ControllerError> {
        let Some(session) = self.session.as_mut() else {
            return Err(ControllerError::InvalidTransition {
                operation: "retry",
                state: SessionState::Idle,
            });
        };

        match session.state {
            SessionState::Failed | SessionState::Degraded => {}
            state => return Err(ControllerError::InvalidTransition { operation: "retry", state }),
        }

        self.generation = self.generation.next();
        session.generation = self.generation;
        session.attempt = 0;
        session.strategy_index = 0;
        session.last_error = None;
        session.state = SessionState::Loading;
        self.stats.user_retries += 1;
        info!("preview {}: retry requested", self.generation);

        let mut effects = Vec::new();
        self.begin_attempt(&mut effects);
        Ok(effects)
    }

    /// Discards the session. Signals still in flight for it are dropped.
    pub fn cancel(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.session.is_none() {
            return effects;
        }

        self.discard_session(&mut effects);
        self.generation = self.generation.next();
        info!("preview cancelled, now at {}", self.generation);
        effects.push(Effect::Notify(SessionStatus::Idle));
        effects
    }

    pub fn session(&self) -> Option<&PreviewSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.session.as_ref().map_or(SessionState::Idle, PreviewSession::state)
    }

    pub fn status(&self) -> SessionStatus {
        self.session.as_ref().map_or(SessionStatus::Idle, PreviewSession::status)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Issues the load for the session's current strategy, skipping
    /// strategies that cannot present the document at all.
    fn begin_attempt(&mut self, effects: &mut Vec<Effect>) {
        loop {
            let Some(session) = self.session.as_mut() else {
                return;
            };

            let strategy = session.strategy();
            match resolve(strategy, &session.document) {
                Ok(source) => {
                    let deadline = self.clock.now() + session.policy.timeout_per_attempt;
                    session.state = SessionState::Loading;
                    session.deadline = Some(deadline);

                    debug!(
                        "preview {}: loading {} via {strategy} (attempt {})",
                        session.generation,
                        source.kind(),
                        session.attempt
                    );
                    effects.push(Effect::ArmDeadline { generation: session.generation, deadline });
                    effects.push(Effect::Load(LoadRequest {
                        generation: session.generation,
                        strategy,
                        attempt: session.attempt,
                        source,
                    }));
                    effects.push(Effect::Notify(session.status()));
                    return;
                }
                Err(err) => {
                    debug!("preview {}: skipping {strategy}: {err}", session.generation);
                    if !self.fall_back(FailureReason::Unsupported(err.to_string()), effects) {
                        return;
                    }
                }
            }
        }
    }

    fn handle_failure(&mut self, reason: FailureReason, effects: &mut Vec<Effect>) {
        if let Some(session) = self.session.as_mut() {
            disarm(session, effects);
        }

        if self.fall_back(reason, effects) {
            self.begin_attempt(effects);
        }
    }

    /// Records `reason` and moves to the next strategy when the budget
    /// allows. Returns `false` once the session has terminally failed.
    fn fall_back(&mut self, reason: FailureReason, effects: &mut Vec<Effect>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        if session.attempt < session.policy.max_attempts && session.has_next_strategy() {
            let from = session.strategy();
            session.attempt += 1;
            session.strategy_index += 1;
            self.generation = self.generation.next();
            session.generation = self.generation;
            self.stats.fallbacks += 1;
            info!(
                "preview {}: {from} failed ({reason}), falling back to {} (attempt {}/{})",
                session.generation,
                session.strategy(),
                session.attempt,
                session.policy.max_attempts
            );
            session.last_error = Some(reason);
            true
        } else {
            warn!(
                "preview {}: giving up after attempt {} on {} ({reason})",
                session.generation,
                session.attempt,
                session.strategy()
            );
            session.state = SessionState::Failed;
            session.last_error = Some(reason);
            effects.push(Effect::Notify(session.status()));
            false
        }
    }

    fn discard_session(&mut self, effects: &mut Vec<Effect>) {
        if let Some(mut session) = self.session.take() {
            disarm(&mut session, effects);
        }
    }
}

fn disarm(session: &mut PreviewSession, effects: &mut Vec<Effect>) {
    if session.deadline.take().is_some() {
        effects.push(Effect::DisarmDeadline { generation: session.generation });
    }
}
