// SPDX-License-Identifier: GPL-3.0-only
//! Dedicated background thread for camera hardware work
//!
//! Every hardware command and every hardware callback runs on one
//! strictly-ordered queue owned by a single thread. Callbacks for a device
//! therefore observe the order in which operations on that device were
//! submitted, and nothing here ever runs on (or blocks) the caller's thread.
//!
//! # Example
//!
//! ```ignore
//! let executor = CameraExecutor::start("CameraBackground");
//! executor.execute(|| open_camera())?;
//! let ids = executor.run(|| hal.camera_ids()).await??;
//! executor.shutdown();
//! ```

use crate::errors::{CameraError, CameraResult};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Task),
    RunAt(Instant, Task),
    Shutdown,
}

/// Delayed task ordered by due time, then by submission order
struct Timer {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed so the BinaryHeap pops the earliest timer first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Shared {
    name: String,
    /// `None` once shut down; guarded so no submission can race past shutdown
    sender: Mutex<Option<mpsc::Sender<Command>>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: OnceLock<ThreadId>,
}

/// Handle to the single-threaded camera work queue
///
/// Cheap to clone; all clones feed the same thread.
#[derive(Clone)]
pub struct CameraExecutor {
    shared: Arc<Shared>,
}

impl CameraExecutor {
    /// Spawn the worker thread and return a handle to its queue
    pub fn start(name: &str) -> Self {
        let (sender, receiver) = mpsc::channel::<Command>();
        let shared = Arc::new(Shared {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            thread_handle: Mutex::new(None),
            thread_id: OnceLock::new(),
        });

        info!(name = %name, "Starting camera executor");

        let name_clone = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_queue(&name_clone, receiver));

        match handle {
            Ok(handle) => {
                let _ = shared.thread_id.set(handle.thread().id());
                *shared.thread_handle.lock().unwrap() = Some(handle);
            }
            Err(e) => {
                // Without a worker the queue is unusable; behave as already shut down
                error!(name = %name, error = %e, "Failed to spawn camera executor thread");
                shared.sender.lock().unwrap().take();
            }
        }

        Self { shared }
    }

    /// Queue `task` behind everything submitted so far
    pub fn execute<F>(&self, task: F) -> CameraResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Command::Run(Box::new(task)))
    }

    /// Queue `task` to run once `delay` has elapsed
    ///
    /// Delayed tasks still pending at shutdown are discarded.
    pub fn execute_after<F>(&self, delay: Duration, task: F) -> CameraResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if delay.is_zero() {
            return self.execute(task);
        }
        self.send(Command::RunAt(Instant::now() + delay, Box::new(task)))
    }

    /// Run `f` on the queue and await its return value
    pub async fn run<T, F>(&self, f: F) -> CameraResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.execute(move || {
            let _ = tx.send(f());
        })?;
        // The sender is only dropped unsent if the task never ran
        rx.await.map_err(|_| CameraError::SubstrateClosed)
    }

    /// True when called from the executor's own thread
    pub fn is_current(&self) -> bool {
        self.shared
            .thread_id
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    /// True once `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.shared.sender.lock().unwrap().is_none()
    }

    /// Stop accepting work, let queued tasks finish, and join the thread
    ///
    /// Idempotent. When called from a task on the executor itself the thread
    /// is not joined (it exits once the current task returns).
    pub fn shutdown(&self) {
        let sender = self.shared.sender.lock().unwrap().take();
        if let Some(sender) = sender {
            info!(name = %self.shared.name, "Shutting down camera executor");
            let _ = sender.send(Command::Shutdown);
        }

        if self.is_current() {
            return;
        }

        let handle = self.shared.thread_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            debug!(name = %self.shared.name, "Waiting for camera executor thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.shared.name, "Camera executor thread panicked: {:?}", e);
            }
        }
    }

    fn send(&self, command: Command) -> CameraResult<()> {
        let guard = self.shared.sender.lock().unwrap();
        let sender = guard.as_ref().ok_or(CameraError::SubstrateClosed)?;
        sender
            .send(command)
            .map_err(|_| CameraError::SubstrateClosed)
    }
}

impl std::fmt::Debug for CameraExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraExecutor")
            .field("name", &self.shared.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run_task(name: &str, task: Task) {
    // A panicking callback must not take the whole queue down with it
    if let Err(e) = std::panic::catch_unwind(AssertUnwindSafe(task)) {
        error!(name = %name, "Camera task panicked: {:?}", e);
    }
}

fn run_queue(name: &str, receiver: mpsc::Receiver<Command>) {
    debug!(name = %name, "Camera executor thread started");

    let mut timers: BinaryHeap<Timer> = BinaryHeap::new();
    let mut next_seq = 0u64;

    loop {
        let now = Instant::now();
        while timers.peek().is_some_and(|t| t.due <= now) {
            if let Some(timer) = timers.pop() {
                run_task(name, timer.task);
            }
        }

        let command = match timers.peek() {
            Some(timer) => {
                let wait = timer.due.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match receiver.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            Command::Run(task) => run_task(name, task),
            Command::RunAt(due, task) => {
                timers.push(Timer {
                    due,
                    seq: next_seq,
                    task,
                });
                next_seq += 1;
            }
            Command::Shutdown => {
                // Work accepted before shutdown still runs, in order
                while let Ok(command) = receiver.try_recv() {
                    if let Command::Run(task) = command {
                        run_task(name, task);
                    }
                }
                if !timers.is_empty() {
                    debug!(name = %name, pending = timers.len(), "Discarding delayed tasks");
                }
                break;
            }
        }
    }

    info!(name = %name, "Camera executor thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_tasks_run_in_submission_order() {
        let executor = CameraExecutor::start("test-order");
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..50 {
            let log = Arc::clone(&log);
            executor.execute(move || log.lock().unwrap().push(i)).unwrap();
        }
        executor.shutdown();

        let log = log.lock().unwrap();
        assert_eq!(*log, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_runs_off_caller_thread() {
        let executor = CameraExecutor::start("test-thread");
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();
        let exec_clone = executor.clone();
        executor
            .execute(move || {
                tx.send((thread::current().id(), exec_clone.is_current()))
                    .unwrap();
            })
            .unwrap();

        let (worker, is_current) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_ne!(worker, caller);
        assert!(is_current);
        assert!(!executor.is_current());
        executor.shutdown();
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let executor = CameraExecutor::start("test-closed");
        executor.shutdown();
        assert!(executor.is_closed());
        assert_eq!(executor.execute(|| {}), Err(CameraError::SubstrateClosed));
        assert_eq!(
            executor.execute_after(Duration::from_millis(5), || {}),
            Err(CameraError::SubstrateClosed)
        );
        // Second shutdown is a no-op
        executor.shutdown();
    }

    #[test]
    fn test_queued_work_finishes_at_shutdown() {
        let executor = CameraExecutor::start("test-drain");
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            executor
                .execute(move || {
                    thread::sleep(Duration::from_millis(2));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        executor.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_delayed_tasks_fire_in_due_order() {
        let executor = CameraExecutor::start("test-delay");
        let (tx, rx) = mpsc::channel();
        let tx_late = tx.clone();
        executor
            .execute_after(Duration::from_millis(60), move || {
                tx_late.send("late").unwrap();
            })
            .unwrap();
        executor
            .execute_after(Duration::from_millis(10), move || {
                tx.send("early").unwrap();
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "early");
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "late");
        executor.shutdown();
    }

    #[test]
    fn test_panicking_task_does_not_kill_queue() {
        let executor = CameraExecutor::start("test-panic");
        executor.execute(|| panic!("boom")).unwrap();
        let (tx, rx) = mpsc::channel();
        executor.execute(move || tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        executor.shutdown();
    }

    #[tokio::test]
    async fn test_run_returns_value() {
        let executor = CameraExecutor::start("test-run");
        let value = executor.run(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
        executor.shutdown();
        assert_eq!(executor.run(|| 1).await, Err(CameraError::SubstrateClosed));
    }
}
