//! Thread-safe preview runtime.
//!
//! [`PreviewHandle`] owns the controller behind a mutex so that every
//! caller (user commands, surface signals, the deadline timer) funnels into
//! one writer. Effects are applied in two phases: timer commands and status
//! notifications are queued while the lock is held, loads are issued to the
//! surface after it is released so a surface may report synchronously.

use crate::surface::RenderingSurface;
use crate::timer::DeadlineTimer;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use viewer_core::{
    ControllerError, ControllerStats, DocumentRef, Effect, Generation, LoadRequest,
    PreviewController, PreviewPolicy, SessionState, SessionStatus, Signal,
};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to start deadline timer: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("preview runtime has been shut down")]
    ShutDown,
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

pub(crate) struct Shared {
    controller: Mutex<PreviewController>,
    surface: Arc<dyn RenderingSurface>,
    timer: DeadlineTimer,
    subscribers: Mutex<Vec<Sender<SessionStatus>>>,
    /// Set once under the controller lock; no session starts afterwards.
    closed: AtomicBool,
}

impl Shared {
    fn controller(&self) -> MutexGuard<'_, PreviewController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `op` under the controller lock, then issues any resulting loads.
    fn drive<F>(self: &Arc<Self>, op: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(&mut PreviewController) -> Result<Vec<Effect>, ControllerError>,
    {
        let loads = {
            let mut controller = self.controller();
            if self.closed.load(Ordering::Acquire) {
                return Err(RuntimeError::ShutDown);
            }
            let effects = op(&mut controller)?;
            self.apply(effects)
        };

        self.dispatch(loads);
        Ok(())
    }

    /// Hands loads to the surface, skipping any another thread has already
    /// superseded since the lock was released.
    fn dispatch(self: &Arc<Self>, loads: Vec<LoadRequest>) {
        for request in loads {
            let current = self.controller().generation();
            if request.generation != current {
                debug!(
                    "skipping superseded {} load for {} (current {current})",
                    request.strategy, request.generation
                );
                continue;
            }

            debug!("issuing {} load for {}", request.strategy, request.generation);
            let reporter =
                SignalReporter { shared: Arc::downgrade(self), generation: request.generation };
            self.surface.load(&request, reporter);
        }
    }

    /// Cancels the session and refuses further work, then stops the timer.
    fn close(&self) {
        {
            let mut controller = self.controller();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            let effects = controller.cancel();
            self.apply(effects);
        }
        self.timer.shutdown();
    }

    fn apply(&self, effects: Vec<Effect>) -> Vec<LoadRequest> {
        let mut loads = Vec::new();
        for effect in effects {
            match effect {
                Effect::ArmDeadline { generation, deadline } => {
                    self.timer.arm(generation, deadline)
                }
                Effect::DisarmDeadline { generation } => self.timer.disarm(generation),
                Effect::Load(request) => loads.push(request),
                Effect::Notify(status) => self.broadcast(status),
            }
        }
        loads
    }

    fn broadcast(&self, status: SessionStatus) {
        trace!("status: {status}");
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(status.clone()).is_ok());
    }

    fn signal(self: &Arc<Self>, generation: Generation, signal: Signal) {
        // Signal handling never fails; only start and retry validate.
        let _ = self.drive(|controller| Ok(controller.on_signal(generation, signal)));
    }

    fn expire(self: &Arc<Self>, generation: Generation) {
        let _ = self.drive(|controller| Ok(controller.on_timeout(generation)));
    }
}

/// Reports signals for one load attempt back to the runtime.
///
/// Cloneable and `Send`; outlives neither the runtime (reports become no-ops
/// once it is gone) nor its attempt (later reports are dropped as stale).
#[derive(Clone)]
pub struct SignalReporter {
    shared: Weak<Shared>,
    generation: Generation,
}

impl SignalReporter {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn report(&self, signal: Signal) {
        match self.shared.upgrade() {
            Some(shared) => shared.signal(self.generation, signal),
            None => {
                debug!("runtime gone, dropping {} signal for {}", signal.name(), self.generation)
            }
        }
    }

    pub fn loaded(&self) {
        self.report(Signal::Loaded);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.report(Signal::failed(reason));
    }

    pub fn partial(&self) {
        self.report(Signal::PartialContent);
    }
}

/// Shared handle to a preview runtime. Clones refer to the same session.
#[derive(Clone)]
pub struct PreviewHandle {
    shared: Arc<Shared>,
}

impl PreviewHandle {
    pub fn new(surface: Arc<dyn RenderingSurface>) -> Result<Self, RuntimeError> {
        Self::with_controller(surface, PreviewController::with_system_clock())
    }

    /// Uses `controller` as is. Its clock must track real time, since the
    /// deadline thread sleeps on wall-clock instants.
    pub fn with_controller(
        surface: Arc<dyn RenderingSurface>,
        controller: PreviewController,
    ) -> Result<Self, RuntimeError> {
        let slot: Arc<OnceLock<Weak<Shared>>> = Arc::new(OnceLock::new());
        let timer_slot = Arc::clone(&slot);

        let timer = DeadlineTimer::spawn(Box::new(move |generation| {
            if let Some(shared) = timer_slot.get().and_then(Weak::upgrade) {
                shared.expire(generation);
            }
        }))?;

        let shared = Arc::new(Shared {
            controller: Mutex::new(controller),
            surface,
            timer,
            subscribers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        let _ = slot.set(Arc::downgrade(&shared));

        Ok(Self { shared })
    }

    pub fn start(&self, document: DocumentRef, policy: PreviewPolicy) -> Result<(), RuntimeError> {
        self.shared.drive(|controller| controller.start(document, policy))
    }

    /// Feeds a signal directly, for hosts that track generations themselves.
    pub fn signal(&self, generation: Generation, signal: Signal) {
        self.shared.signal(generation, signal);
    }

    pub fn retry(&self) -> Result<(), RuntimeError> {
        self.shared.drive(PreviewController::retry)
    }

    pub fn cancel(&self) {
        let _ = self.shared.drive(|controller| Ok(controller.cancel()));
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.controller().status()
    }

    pub fn state(&self) -> SessionState {
        self.shared.controller().state()
    }

    pub fn generation(&self) -> Generation {
        self.shared.controller().generation()
    }

    pub fn stats(&self) -> ControllerStats {
        self.shared.controller().stats()
    }

    /// Receives every status change from now on.
    pub fn subscribe(&self) -> Receiver<SessionStatus> {
        let (tx, rx) = mpsc::channel();
        self.shared.subscribers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        rx
    }

    /// Cancels the session and stops the deadline thread. Applies to every
    /// clone: later `start` and `retry` calls fail with
    /// [`RuntimeError::ShutDown`].
    pub fn shutdown(&self) {
        self.shared.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}
