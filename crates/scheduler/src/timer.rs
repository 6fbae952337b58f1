//! Deadline timer thread.
//!
//! A single background thread holds at most one armed deadline, tagged with
//! the generation it belongs to. Commands arrive over a channel; when the
//! armed deadline passes, the callback is invoked with its generation.

use log::{debug, warn};
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use viewer_core::Generation;

/// Callback invoked from the timer thread when a deadline expires.
pub type DeadlineCallback = Box<dyn Fn(Generation) + Send>;

enum TimerCommand {
    Arm { generation: Generation, deadline: Instant },
    Disarm { generation: Generation },
    Shutdown,
}

pub struct DeadlineTimer {
    commands: Sender<TimerCommand>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeadlineTimer {
    /// Spawns the timer thread.
    pub fn spawn(on_expire: DeadlineCallback) -> io::Result<Self> {
        let (commands, inbox) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("preview-deadline".to_owned())
            .spawn(move || run(inbox, on_expire))?;

        Ok(Self { commands, thread: Mutex::new(Some(thread)) })
    }

    /// Replaces whatever deadline is armed.
    pub fn arm(&self, generation: Generation, deadline: Instant) {
        self.send(TimerCommand::Arm { generation, deadline });
    }

    /// Clears the armed deadline if it still belongs to `generation`.
    pub fn disarm(&self, generation: Generation) {
        self.send(TimerCommand::Disarm { generation });
    }

    /// Stops the thread. Joins it unless called from the timer thread itself.
    pub fn shutdown(&self) {
        self.send(TimerCommand::Shutdown);

        let handle = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("deadline timer thread panicked");
            }
        }
    }

    fn send(&self, command: TimerCommand) {
        // The thread only exits on shutdown, after which commands are moot.
        let _ = self.commands.send(command);
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(inbox: mpsc::Receiver<TimerCommand>, on_expire: DeadlineCallback) {
    let mut armed: Option<(Generation, Instant)> = None;

    loop {
        let command = match armed {
            Some((_, deadline)) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match inbox.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match inbox.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        match command {
            None => {
                if let Some((generation, _)) = armed.take() {
                    debug!("deadline expired for {generation}");
                    on_expire(generation);
                }
            }
            Some(TimerCommand::Arm { generation, deadline }) => {
                armed = Some((generation, deadline));
            }
            Some(TimerCommand::Disarm { generation }) => {
                if armed.is_some_and(|(current, _)| current == generation) {
                    armed = None;
                }
            }
            Some(TimerCommand::Shutdown) => break,
        }
    }

    debug!("deadline timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timer() -> (DeadlineTimer, mpsc::Receiver<Generation>) {
        let (tx, rx) = mpsc::channel();
        let timer = DeadlineTimer::spawn(Box::new(move |generation| {
            let _ = tx.send(generation);
        }))
        .expect("timer thread should spawn");
        (timer, rx)
    }

    #[test]
    fn fires_once_for_armed_generation() {
        let (timer, fired) = timer();
        timer.arm(Generation(4), Instant::now() + Duration::from_millis(20));

        assert_eq!(fired.recv_timeout(Duration::from_secs(2)), Ok(Generation(4)));
        assert!(fired.recv_timeout(Duration::from_millis(60)).is_err());
        timer.shutdown();
    }

    #[test]
    fn disarm_prevents_expiry() {
        let (timer, fired) = timer();
        timer.arm(Generation(1), Instant::now() + Duration::from_millis(30));
        timer.disarm(Generation(1));

        assert!(fired.recv_timeout(Duration::from_millis(100)).is_err());
        timer.shutdown();
    }

    #[test]
    fn disarm_for_older_generation_keeps_current_deadline() {
        let (timer, fired) = timer();
        timer.arm(Generation(1), Instant::now() + Duration::from_secs(60));
        timer.arm(Generation(2), Instant::now() + Duration::from_millis(20));
        timer.disarm(Generation(1));

        assert_eq!(fired.recv_timeout(Duration::from_secs(2)), Ok(Generation(2)));
        timer.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (timer, _fired) = timer();
        timer.shutdown();
        timer.shutdown();
    }
}
