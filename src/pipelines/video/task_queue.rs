// SPDX-License-Identifier: GPL-3.0-only

//! Serialized task queue
//!
//! A single named worker thread owns some state `S` and runs every submitted
//! task against it, one at a time, in submission order:
//!
//! ```text
//!  capture thread ─┐  submit / submit_detached
//!  action thread  ─┼──────────────▶ [ unbounded FIFO ] ──▶ worker thread (owns S)
//!  ...            ─┘  submit_barrier                          │
//!                                                             ▼
//!                                      TaskHandle<T> ◀── oneshot result
//! ```
//!
//! Because there is exactly one consumer, a barrier task sees the effects of
//! every task submitted before it and no later task starts until it has
//! returned. Ordinary and barrier tasks differ in how they are traced and in
//! that only ordinary work may be submitted detached.
//!
//! A failing task only affects its own handle. Panics are caught on the
//! worker and reported as [`TaskError::Panicked`].

use crate::errors::TaskError;
use futures::FutureExt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// How a task is scheduled relative to its neighbours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Ordinary,
    /// Runs alone, after all earlier tasks and before all later ones
    Barrier,
}

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

struct Envelope<S> {
    seq: u64,
    kind: TaskKind,
    job: Job<S>,
}

/// Completion handle for a submitted task
///
/// Await it from async code, or call [`TaskHandle::wait`] from a plain thread.
#[must_use = "dropping a TaskHandle discards the task's result"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    /// Block the current thread until the task completes
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Result<T, TaskError> {
        self.rx.blocking_recv().unwrap_or(Err(TaskError::QueueClosed))
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx
            .poll_unpin(cx)
            .map(|r| r.unwrap_or(Err(TaskError::QueueClosed)))
    }
}

/// FIFO executor that owns `S` on a dedicated thread
pub struct SerializedTaskQueue<S: Send + 'static> {
    name: String,
    sender: Option<mpsc::UnboundedSender<Envelope<S>>>,
    worker: Mutex<Option<JoinHandle<S>>>,
    next_seq: AtomicU64,
}

impl<S: Send + 'static> SerializedTaskQueue<S> {
    /// Spawn the worker thread, moving `state` onto it
    pub fn new(name: &str, state: S) -> Result<Self, TaskError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope<S>>();
        let thread_name = name.to_string();

        let worker = thread::Builder::new()
            .name(format!("queue-{}", name))
            .spawn(move || {
                let mut state = state;
                debug!(name = %thread_name, "Task queue worker started");
                while let Some(envelope) = receiver.blocking_recv() {
                    match envelope.kind {
                        TaskKind::Barrier => {
                            debug!(name = %thread_name, seq = envelope.seq, "Running barrier task")
                        }
                        TaskKind::Ordinary => {
                            trace!(name = %thread_name, seq = envelope.seq, "Running task")
                        }
                    }
                    (envelope.job)(&mut state);
                }
                debug!(name = %thread_name, "Task queue worker exiting");
                state
            })
            .map_err(|e| {
                warn!(name = %name, error = %e, "Failed to spawn task queue worker");
                TaskError::QueueClosed
            })?;

        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            worker: Mutex::new(Some(worker)),
            next_seq: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit an ordinary task
    pub fn submit<T, F>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> T + Send + 'static,
    {
        self.enqueue(TaskKind::Ordinary, work)
    }

    /// Submit a task that runs exclusive of all other queued work
    pub fn submit_barrier<T, F>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> T + Send + 'static,
    {
        self.enqueue(TaskKind::Barrier, work)
    }

    /// Submit an ordinary task nobody waits for
    ///
    /// Panics are logged and otherwise ignored. Returns `false` if the queue
    /// is closed.
    pub fn submit_detached<F>(&self, work: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let name = self.name.clone();
        let job: Job<S> = Box::new(move |state: &mut S| {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| work(state))) {
                warn!(name = %name, seq, panic = %panic_message(panic), "Detached task panicked");
            }
        });
        self.send(Envelope {
            seq,
            kind: TaskKind::Ordinary,
            job,
        })
    }

    fn enqueue<T, F>(&self, kind: TaskKind, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let job: Job<S> = Box::new(move |state: &mut S| {
            let result = catch_unwind(AssertUnwindSafe(|| work(state)))
                .map_err(|panic| TaskError::Panicked(panic_message(panic)));
            // The caller may have stopped waiting
            let _ = tx.send(result);
        });
        // On a closed queue the job (and its sender) is dropped, so the
        // handle resolves to QueueClosed.
        self.send(Envelope { seq, kind, job });
        TaskHandle { rx }
    }

    fn send(&self, envelope: Envelope<S>) -> bool {
        match &self.sender {
            Some(sender) => sender.send(envelope).is_ok(),
            None => false,
        }
    }

    /// Stop accepting work, let the worker drain what is queued, and return
    /// the state
    pub fn shutdown(mut self) -> Result<S, TaskError> {
        self.sender.take();
        let handle = self
            .worker
            .get_mut()
            .map_err(|_| TaskError::QueueClosed)?
            .take()
            .ok_or(TaskError::QueueClosed)?;
        handle
            .join()
            .map_err(|panic| TaskError::Panicked(panic_message(panic)))
    }
}

impl<S: Send + 'static> Drop for SerializedTaskQueue<S> {
    fn drop(&mut self) {
        self.sender.take();
        let handle = self.worker.get_mut().ok().and_then(|w| w.take());
        if let Some(handle) = handle {
            if thread::current().id() == handle.thread().id() {
                // Dropped from one of our own tasks; the worker exits once drained.
                return;
            }
            if handle.join().is_err() {
                warn!(name = %self.name, "Task queue worker panicked");
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tasks_run_in_submission_order() {
        let queue = SerializedTaskQueue::new("order", Vec::<u32>::new()).expect("queue");
        for i in 0..100 {
            queue.submit_detached(move |log| log.push(i));
        }
        let log = queue.shutdown().expect("shutdown");
        assert_eq!(log, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_barrier_sees_prior_work() {
        let queue = SerializedTaskQueue::new("barrier", 0u32).expect("queue");
        for _ in 0..10 {
            queue.submit_detached(|n| *n += 1);
        }
        let seen = queue.submit_barrier(|n| *n).wait();
        assert_eq!(seen, Ok(10));
    }

    #[test]
    fn test_panic_only_fails_its_own_handle() {
        let queue = SerializedTaskQueue::new("panic", 0u32).expect("queue");
        let bad = queue.submit(|_: &mut u32| -> u32 { panic!("boom") });
        let good = queue.submit(|n| {
            *n += 1;
            *n
        });
        assert!(matches!(bad.wait(), Err(TaskError::Panicked(msg)) if msg == "boom"));
        assert_eq!(good.wait(), Ok(1));
    }

    #[test]
    fn test_state_survives_panic_in_detached_task() {
        let queue = SerializedTaskQueue::new("detached-panic", 5u32).expect("queue");
        queue.submit_detached(|_| panic!("detached"));
        assert_eq!(queue.submit_barrier(|n| *n).wait(), Ok(5));
    }

    #[tokio::test]
    async fn test_handle_is_awaitable() {
        let queue = SerializedTaskQueue::new("async", String::from("a")).expect("queue");
        let handle = queue.submit(|s| {
            s.push('b');
            s.clone()
        });
        assert_eq!(handle.await, Ok("ab".to_string()));
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        let queue = Arc::new(SerializedTaskQueue::new("producers", Vec::new()).expect("queue"));
        let mut threads = Vec::new();
        for p in 0..4u32 {
            let queue = Arc::clone(&queue);
            threads.push(thread::spawn(move || {
                for i in 0..50u32 {
                    queue.submit_detached(move |log: &mut Vec<(u32, u32)>| log.push((p, i)));
                }
            }));
        }
        for t in threads {
            t.join().expect("producer");
        }
        let queue = Arc::into_inner(queue).expect("sole owner");
        let log = queue.shutdown().expect("shutdown");
        assert_eq!(log.len(), 200);
        for p in 0..4 {
            let seq: Vec<u32> = log.iter().filter(|(q, _)| *q == p).map(|(_, i)| *i).collect();
            assert_eq!(seq, (0..50).collect::<Vec<_>>());
        }
    }
}
