//! Bounded worker pool and single-shot completion signals.
//!
//! Every network operation runs as a task on the session's pool. The queue
//! is unbounded but at most `concurrent_statements` tasks make progress at a
//! time, matching the transport connection pool. Each task hands its outcome
//! to a [`TaskHandle`], the bridge between the async transport and the
//! synchronous cursor API.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

/// Single-shot completion signal for one background task.
///
/// The task records its outcome exactly once; [`TaskHandle::wait`] blocks
/// until then and afterwards serves the recorded outcome any number of
/// times without blocking.
#[derive(Debug)]
pub(crate) struct TaskHandle<T> {
    state: Mutex<WaitState<T>>,
}

#[derive(Debug)]
enum WaitState<T> {
    Pending(oneshot::Receiver<T>),
    Ready(T),
    Interrupted,
}

impl<T: Clone> TaskHandle<T> {
    fn new(rx: oneshot::Receiver<T>) -> Self {
        Self {
            state: Mutex::new(WaitState::Pending(rx)),
        }
    }

    /// Block until the task has completed, then return its outcome.
    /// Retrieval is idempotent.
    pub(crate) fn wait(&self) -> Result<T> {
        let mut state = self.state.lock().expect("completion signal poisoned");
        match &mut *state {
            WaitState::Ready(value) => Ok(value.clone()),
            WaitState::Interrupted => Err(Error::Interrupted),
            WaitState::Pending(_) => {
                let rx = match std::mem::replace(&mut *state, WaitState::Interrupted) {
                    WaitState::Pending(rx) => rx,
                    _ => unreachable!(),
                };
                match rx.blocking_recv() {
                    Ok(value) => {
                        *state = WaitState::Ready(value.clone());
                        Ok(value)
                    }
                    // sender dropped without completing: pool torn down
                    Err(_) => Err(Error::Interrupted),
                }
            }
        }
    }
}

/// Capped-concurrency execution service scoped to one session.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    runtime: Mutex<Option<Runtime>>,
    permits: Arc<Semaphore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(max_concurrent: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("querynode-worker")
            .build()
            .map_err(|e| Error::Config(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Submit a unit of work. The returned handle can be waited on from a
    /// synchronous caller; the task itself runs to completion regardless.
    pub(crate) fn submit<T, F>(&self, fut: F) -> Result<TaskHandle<T>>
    where
        T: Clone + Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let runtime = self.runtime.lock().expect("worker pool poisoned");
        let runtime = runtime.as_ref().ok_or(Error::SessionClosed)?;

        let (tx, rx) = oneshot::channel();
        let permits = self.permits.clone();
        let handle = runtime.spawn(async move {
            // queue until a slot frees up; acquisition only fails when the
            // semaphore is closed, which the pool never does
            let _permit = permits.acquire_owned().await;
            let outcome = fut.await;
            // the receiver may be gone if nobody waits for this task
            let _ = tx.send(outcome);
        });

        let mut tasks = self.tasks.lock().expect("worker pool poisoned");
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
        Ok(TaskHandle::new(rx))
    }

    /// Shut the pool down. Blocks until every submitted task has signaled
    /// completion, then stops the runtime.
    pub(crate) fn shutdown(&self) {
        let runtime = {
            let mut guard = self.runtime.lock().expect("worker pool poisoned");
            guard.take()
        };
        let Some(runtime) = runtime else {
            return;
        };
        let pending: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("worker pool poisoned");
            tasks.drain(..).collect()
        };
        debug!(tasks = pending.len(), "draining worker pool");
        runtime.block_on(async {
            for task in pending {
                let _ = task.await;
            }
        });
        runtime.shutdown_background();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
