//! Cancellable delayed-event scheduler
//!
//! Each scheduled timer is a small task that sleeps and then posts its id
//! to the scheduler's channel. Cancelling aborts the task. A timer that
//! fired just before being cancelled may still be delivered, so consumers
//! must ignore ids they no longer wait for.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

pub struct Scheduler {
    tx: mpsc::UnboundedSender<TimerId>,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl Scheduler {
    /// Create a scheduler and the receiver its timers fire into
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                tasks: HashMap::new(),
            },
            rx,
        )
    }

    /// Fire `id` after `delay`, replacing any pending timer with the same id
    pub fn schedule(&mut self, id: TimerId, delay: Duration) {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(id);
        });
        if let Some(previous) = self.tasks.insert(id, task) {
            previous.abort();
        }
        self.tasks.retain(|_, task| !task.is_finished());
    }

    pub fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }

    /// Number of timers that have not fired or been cancelled
    pub fn pending(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
