//! Rendering surfaces.
//!
//! A surface receives [`LoadRequest`]s and answers through the
//! [`SignalReporter`] it is handed, now, later, or never.

use crate::handle::SignalReporter;
use log::warn;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use viewer_core::LoadRequest;

/// Something that can present a resolved document source.
///
/// `load` must not block on the outcome; it may report synchronously
/// from within the call, from another thread, or not at all.
pub trait RenderingSurface: Send + Sync {
    fn load(&self, request: &LoadRequest, reporter: SignalReporter);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Loaded,
    Failed(String),
    Partial,
    Silent,
}

/// One scripted answer: an outcome reported after `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub outcome: ScriptedOutcome,
    pub delay: Duration,
}

impl ScriptStep {
    pub fn now(outcome: ScriptedOutcome) -> Self {
        Self { outcome, delay: Duration::ZERO }
    }

    pub fn after(outcome: ScriptedOutcome, delay: Duration) -> Self {
        Self { outcome, delay }
    }

    pub fn silent() -> Self {
        Self::now(ScriptedOutcome::Silent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid script step '{step}': {reason}")]
pub struct ParseScriptError {
    pub step: String,
    pub reason: String,
}

/// Accepts `loaded`, `partial`, `silent`, `fail` or `fail:<reason>`,
/// optionally suffixed with `@<millis>`. An `@` not followed by digits is
/// part of the step, so reasons may contain addresses.
impl FromStr for ScriptStep {
    type Err = ParseScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid =
            |reason: &str| ParseScriptError { step: raw.to_owned(), reason: reason.to_owned() };

        let (body, delay) = match raw.rsplit_once('@') {
            Some((body, ms)) if is_millis(ms) => {
                let ms =
                    ms.trim().parse::<u64>().map_err(|_| invalid("delay is out of range"))?;
                (body.trim(), Duration::from_millis(ms))
            }
            _ => (raw, Duration::ZERO),
        };

        let outcome = match body {
            "loaded" => ScriptedOutcome::Loaded,
            "partial" => ScriptedOutcome::Partial,
            "silent" => ScriptedOutcome::Silent,
            "fail" => ScriptedOutcome::Failed("load failed".to_owned()),
            _ => match body.strip_prefix("fail:") {
                Some(reason) if !reason.trim().is_empty() => {
                    ScriptedOutcome::Failed(reason.trim().to_owned())
                }
                Some(_) => return Err(invalid("failure reason is empty")),
                None => return Err(invalid("expected loaded, partial, silent or fail[:reason]")),
            },
        };

        Ok(Self { outcome, delay })
    }
}

fn is_millis(suffix: &str) -> bool {
    let suffix = suffix.trim();
    !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit())
}

/// Surface that answers each load with the next scripted step. Once the
/// script runs out every further load stays silent.
#[derive(Default)]
pub struct ScriptedSurface {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<LoadRequest>>,
    last_reporter: Mutex<Option<SignalReporter>>,
}

impl ScriptedSurface {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps: Mutex::new(steps.into()), ..Self::default() }
    }

    /// Parses a comma-separated script such as `fail:blocked,loaded@200`.
    pub fn parse(script: &str) -> Result<Self, ParseScriptError> {
        let steps = script
            .split(',')
            .filter(|step| !step.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<ScriptStep>, _>>()?;
        Ok(Self::new(steps))
    }

    /// Every load received so far, in order.
    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last_reporter(&self) -> Option<SignalReporter> {
        self.last_reporter.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl RenderingSurface for ScriptedSurface {
    fn load(&self, request: &LoadRequest, reporter: SignalReporter) {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
        *self.last_reporter.lock().unwrap_or_else(PoisonError::into_inner) = Some(reporter.clone());

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(ScriptStep::silent);

        if step.outcome == ScriptedOutcome::Silent {
            return;
        }
        if step.delay.is_zero() {
            deliver(&reporter, step.outcome);
            return;
        }

        let spawned = thread::Builder::new()
            .name(format!("scripted-{}", request.generation))
            .spawn(move || {
                thread::sleep(step.delay);
                deliver(&reporter, step.outcome);
            });
        if let Err(err) = spawned {
            warn!("scripted surface could not schedule a delayed signal: {err}");
        }
    }
}

fn deliver(reporter: &SignalReporter, outcome: ScriptedOutcome) {
    match outcome {
        ScriptedOutcome::Loaded => reporter.loaded(),
        ScriptedOutcome::Failed(reason) => reporter.failed(reason),
        ScriptedOutcome::Partial => reporter.partial(),
        ScriptedOutcome::Silent => {}
    }
}
