//! Signals reported by a rendering surface and the generation tag that
//! scopes them to a single load attempt.

use std::fmt;

/// Monotonic tag identifying one load attempt.
///
/// Every start, automatic fallback, user retry and cancel moves the
/// controller to a new generation; anything tagged with an older one is
/// stale and gets dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// What a rendering surface can say about the attempt it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Loaded,
    Failed(String),
    /// Something is on screen but it may be incomplete or unstyled.
    PartialContent,
}

impl Signal {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Failed(_) => "failed",
            Self::PartialContent => "partial",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No signal arrived before the attempt's deadline.
    Timeout,
    /// The surface reported a failure.
    Surface(String),
    /// The strategy cannot present this kind of document at all.
    Unsupported(String),
}

impl FailureReason {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Surface(reason) => f.write_str(reason),
            Self::Unsupported(reason) => write!(f, "strategy unavailable: {reason}"),
        }
    }
}
