//! Fixed-size worker pool
//!
//! Named threads pull boxed tasks from a shared flume queue. Every submission
//! returns a [`TaskHandle`] for status queries and cooperative cancellation;
//! the running task sees cancellation through its [`CancellationToken`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

#[derive(Debug, Default)]
struct TaskState {
    phase: AtomicU8,
    cancelled: AtomicBool,
}

impl TaskState {
    fn finish(&self) {
        self.phase.store(DONE, Ordering::Release);
    }
}

/// Handle to a submitted task
#[derive(Clone, Debug)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(TaskState::default()),
        }
    }

    /// Finished, failed, or skipped after cancellation
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.phase.load(Ordering::Acquire) == DONE
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.phase.load(Ordering::Acquire) == RUNNING
    }

    /// Cancels the task. A queued task will never start. A running task is
    /// only flagged when `may_interrupt` is set; it observes the flag through
    /// its token. Returns false when the task already finished or is running
    /// and may not be interrupted.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        match self.state.phase.load(Ordering::Acquire) {
            DONE => false,
            RUNNING if !may_interrupt => false,
            _ => {
                self.state.cancelled.store(true, Ordering::Release);
                true
            }
        }
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            state: Arc::clone(&self.state),
        }
    }
}

/// Read side of a task's cancellation flag
#[derive(Clone, Debug)]
pub struct CancellationToken {
    state: Arc<TaskState>,
}

impl CancellationToken {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }
}

type Task = Box<dyn FnOnce(&CancellationToken) + Send>;

struct Queued {
    task: Task,
    handle: TaskHandle,
}

pub struct WorkerPool {
    name: String,
    sender: Option<flume::Sender<Queued>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers (at least one) named `{name}-{index}`
    pub fn new(name: &str, threads: usize) -> std::io::Result<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = flume::unbounded::<Queued>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(receiver))?;
            workers.push(worker);
        }
        debug!("Started worker pool '{name}' with {threads} threads");
        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            workers,
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a task. After shutdown the task is dropped unrun and the handle
    /// comes back cancelled and done.
    pub fn submit(&self, task: impl FnOnce(&CancellationToken) + Send + 'static) -> TaskHandle {
        let handle = TaskHandle::new();
        let queued = Queued {
            task: Box::new(task),
            handle: handle.clone(),
        };
        let rejected = match &self.sender {
            Some(sender) => sender.send(queued).err().map(|e| e.into_inner()),
            None => Some(queued),
        };
        if let Some(rejected) = rejected {
            warn!("Worker pool '{}' is shut down, dropping task", self.name);
            rejected.handle.cancel(true);
            rejected.handle.state.finish();
        }
        handle
    }

    /// Stops accepting work, drains the queue and joins every worker
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker in pool '{}' panicked", self.name);
            }
        }
        debug!("Worker pool '{}' stopped", self.name);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: flume::Receiver<Queued>) {
    for Queued { task, handle } in receiver.iter() {
        let state = &handle.state;
        if handle.is_cancelled()
            || state
                .phase
                .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            state.finish();
            continue;
        }

        let token = handle.token();
        if panic::catch_unwind(AssertUnwindSafe(|| task(&token))).is_err() {
            error!(
                "Task panicked on {}",
                thread::current().name().unwrap_or("worker")
            );
        }
        state.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn runs_submitted_tasks() {
        let pool = WorkerPool::new("test", 2).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..4 {
            let tx = tx.clone();
            pool.submit(move |_| tx.send(i).unwrap());
        }
        let mut seen: Vec<i32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn cancelled_before_start_never_runs() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = pool.submit(move |_| {
            let _ = gate_rx.recv_timeout(Duration::from_secs(5));
        });
        let ran_clone = Arc::clone(&ran);
        let queued = pool.submit(move |_| {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(queued.cancel(false));
        gate_tx.send(()).unwrap();
        drop(pool);

        assert!(blocker.is_done());
        assert!(queued.is_done());
        assert!(queued.is_cancelled());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn running_task_sees_interrupt() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let handle = pool.submit(move |token| {
            started_tx.send(()).unwrap();
            for _ in 0..500 {
                if token.is_cancelled() {
                    result_tx.send(true).unwrap();
                    return;
                }
                thread::sleep(Duration::from_millis(10));
            }
            result_tx.send(false).unwrap();
        });

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!handle.cancel(false));
        assert!(handle.cancel(true));
        assert!(result_rx.recv_timeout(Duration::from_secs(10)).unwrap());
    }

    #[test]
    fn panicking_task_does_not_kill_worker() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let first = pool.submit(|_| panic!("boom"));
        let (tx, rx) = mpsc::channel();
        pool.submit(move |_| tx.send(()).unwrap());

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(pool);
        assert!(first.is_done());
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let mut pool = WorkerPool::new("test", 1).unwrap();
        pool.shutdown();
        let handle = pool.submit(|_| {});
        assert!(handle.is_done());
        assert!(handle.is_cancelled());
        assert!(!handle.cancel(true));
    }
}
