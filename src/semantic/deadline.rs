//! Deadlines for blocking calls into external collaborators.
//!
//! The call runs on a helper thread; the caller waits at most `timeout`.
//! A call that overruns cannot be cancelled: its thread stays alive until
//! the call returns on its own, and its result is dropped. [`Deadline`]
//! refuses new calls while such a thread is still running, so a hung
//! collaborator pins at most one extra thread.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum DeadlineError {
    #[error("call did not finish within {0:?}")]
    Elapsed(Duration),

    #[error("an earlier call is still running past its deadline")]
    Stalled,

    #[error("call aborted before producing a result")]
    Aborted,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Deadline shared by every call into one collaborator.
#[derive(Debug, Clone)]
pub struct Deadline {
    timeout: Duration,
    overrunning: Arc<AtomicUsize>,
}

/// Settles the call state when the worker finishes, panics included.
struct Settle {
    state: Arc<AtomicU8>,
    overrunning: Arc<AtomicUsize>,
}

impl Drop for Settle {
    fn drop(&mut self) {
        let settled = self
            .state
            .compare_exchange(RUNNING, FINISHED, Ordering::SeqCst, Ordering::SeqCst);
        if settled.is_err() {
            // the caller gave up on us and counted us as overrunning
            self.overrunning.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            overrunning: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Calls that timed out and have not returned yet.
    pub fn overrunning(&self) -> usize {
        self.overrunning.load(Ordering::SeqCst)
    }

    /// Run `call` on a helper thread and wait at most the timeout for it.
    ///
    /// Fails with [`DeadlineError::Stalled`] without spawning anything while
    /// an earlier call is still overrunning.
    pub fn run<T, F>(&self, call: F) -> Result<T, DeadlineError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.overrunning() > 0 {
            return Err(DeadlineError::Stalled);
        }

        let state = Arc::new(AtomicU8::new(RUNNING));
        let settle = Settle {
            state: Arc::clone(&state),
            overrunning: Arc::clone(&self.overrunning),
        };
        let (tx, rx) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name("shotsearch-deadline".to_string())
            .spawn(move || {
                let _settle = settle;
                // receiver may be gone after a timeout
                let _ = tx.send(call());
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                // count first so the worker never decrements below zero
                self.overrunning.fetch_add(1, Ordering::SeqCst);
                let abandoned =
                    state.compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst);
                if abandoned.is_err() {
                    // finished in the meantime
                    self.overrunning.fetch_sub(1, Ordering::SeqCst);
                }
                Err(DeadlineError::Elapsed(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(DeadlineError::Aborted),
        }
    }
}

/// One-off deadline for a call with no shared collaborator state.
pub fn run_with_deadline<T, F>(timeout: Duration, call: F) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Deadline::new(timeout).run(call)
}
