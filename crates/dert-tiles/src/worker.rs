//! Background jobs.
//!
//! Writing the existence-tree cache must not block the caller that
//! triggered discovery, so the store hands it to a [`TaskExecutor`] and
//! records the outcome in a [`PersistTracker`].

use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs fire-and-forget jobs.
pub trait TaskExecutor: Send + Sync {
    /// Run `job` at some point. There is no completion handle.
    fn submit(&self, name: &str, job: Job);
}

/// Runs each job on its own detached, named thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl TaskExecutor for ThreadExecutor {
    fn submit(&self, name: &str, job: Job) {
        let spawned = thread::Builder::new().name(name.to_string()).spawn(job);
        if let Err(e) = spawned {
            tracing::error!(job = name, error = %e, "failed to spawn background thread");
        }
    }
}

/// Runs each job immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn submit(&self, _name: &str, job: Job) {
        job();
    }
}

/// Outcome of the existence-tree cache write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PersistState {
    /// Nothing has been submitted.
    #[default]
    Idle,
    /// A write is queued or running.
    Pending,
    /// The cache file was written.
    Persisted,
    /// The write failed with this message. The in-memory tree is unaffected.
    Failed(String),
}

impl PersistState {
    fn is_settled(&self) -> bool {
        !matches!(self, PersistState::Pending)
    }
}

/// Shared record of the persistence job's state.
#[derive(Debug, Default)]
pub struct PersistTracker {
    state: Mutex<PersistState>,
    changed: Condvar,
}

impl PersistTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> PersistState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Record a new state and wake waiters.
    pub fn set(&self, state: PersistState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.changed.notify_all();
    }

    /// Block until no write is pending or `timeout` elapses; returns the state seen last.
    pub fn wait(&self, timeout: Duration) -> PersistState {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !state.is_settled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        state.clone()
    }
}
