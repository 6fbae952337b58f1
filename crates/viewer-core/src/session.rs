//! One document-open attempt and the status view hosts render from it.

use crate::signal::{FailureReason, Generation};
use crate::source::DocumentRef;
use doc_model::{Strategy, ViewerSettings};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Loading,
    Ready,
    /// Shown through a reduced-fidelity path; waits for a user retry.
    Degraded,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start parameters for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewPolicy {
    pub strategies: Vec<Strategy>,
    pub timeout_per_attempt: Duration,
    pub max_attempts: u32,
}

impl PreviewPolicy {
    pub fn new(
        strategies: Vec<Strategy>,
        timeout_per_attempt: Duration,
        max_attempts: u32,
    ) -> Self {
        Self { strategies, timeout_per_attempt, max_attempts }
    }

    pub fn from_settings(settings: &ViewerSettings) -> Self {
        Self {
            strategies: settings.strategies.clone(),
            timeout_per_attempt: Duration::from_millis(settings.timeout_per_attempt_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

impl Default for PreviewPolicy {
    fn default() -> Self {
        Self::from_settings(&ViewerSettings::default())
    }
}

#[derive(Debug, Clone)]
pub struct PreviewSession {
    pub(crate) document: DocumentRef,
    pub(crate) policy: PreviewPolicy,
    pub(crate) strategy_index: usize,
    pub(crate) state: SessionState,
    pub(crate) attempt: u32,
    pub(crate) deadline: Option<Instant>,
    pub(crate) last_error: Option<FailureReason>,
    pub(crate) generation: Generation,
}

impl PreviewSession {
    pub(crate) fn new(
        document: DocumentRef,
        policy: PreviewPolicy,
        generation: Generation,
    ) -> Self {
        Self {
            document,
            policy,
            strategy_index: 0,
            state: SessionState::Loading,
            attempt: 0,
            deadline: None,
            last_error: None,
            generation,
        }
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    pub fn strategy(&self) -> Strategy {
        self.policy.strategies[self.strategy_index]
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.policy.strategies
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn timeout_per_attempt(&self) -> Duration {
        self.policy.timeout_per_attempt
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn last_error(&self) -> Option<&FailureReason> {
        self.last_error.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn has_next_strategy(&self) -> bool {
        self.strategy_index + 1 < self.policy.strategies.len()
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Loading => {
                SessionStatus::Loading { strategy: self.strategy(), attempt: self.attempt }
            }
            SessionState::Ready => SessionStatus::Ready { strategy: self.strategy() },
            SessionState::Degraded => SessionStatus::Degraded { strategy: self.strategy() },
            SessionState::Failed => SessionStatus::Failed {
                last_error: self
                    .last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_owned()),
            },
        }
    }
}

/// What the host renders: spinner, content, fallback notice or error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Loading { strategy: Strategy, attempt: u32 },
    Ready { strategy: Strategy },
    Degraded { strategy: Strategy },
    Failed { last_error: String },
}

impl SessionStatus {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Loading { .. } => SessionState::Loading,
            Self::Ready { .. } => SessionState::Ready,
            Self::Degraded { .. } => SessionState::Degraded,
            Self::Failed { .. } => SessionState::Failed,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready { .. } | Self::Degraded { .. } | Self::Failed { .. })
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading { strategy, attempt } => {
                write!(f, "loading via {strategy} (attempt {attempt})")
            }
            Self::Ready { strategy } => write!(f, "ready via {strategy}"),
            Self::Degraded { strategy } => write!(f, "degraded via {strategy}"),
            Self::Failed { last_error } => write!(f, "failed: {last_error}"),
        }
    }
}
