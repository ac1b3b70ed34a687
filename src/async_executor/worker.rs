use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::DbError;

pub(super) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of OS threads pulling jobs from one shared queue.
pub(super) struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    pub fn spawn(size: usize) -> Result<Self, DbError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("sql-bridge-worker-{index}"))
                .spawn(move || run_worker(index, &receiver))
                .map_err(|err| DbError::Internal(format!("failed to spawn worker thread: {err}")))?;
            handles.push(handle);
        }
        tracing::debug!(workers = size, "async workers started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a job. Hands the job back if the pool has shut down.
    pub fn submit(&self, job: Job) -> Result<(), Job> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(job).map_err(|mpsc::SendError(job)| job),
            None => Err(job),
        }
    }

    /// Stop accepting jobs, let queued jobs finish, and join every worker.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for handle in handles {
            // a job that shuts its own executor down cannot join itself
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("async worker exited with a panic");
            }
        }
        tracing::debug!(workers = self.size, "async workers stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // workers drain the queue and exit once the sender is gone
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn run_worker(index: usize, receiver: &Mutex<Receiver<Job>>) {
    loop {
        let next = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(job) = next else {
            break;
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::warn!(worker = index, "async job panicked");
        }
    }
    tracing::trace!(worker = index, "async worker exiting");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn shutdown_drains_queued_jobs() {
        let pool = WorkerPool::spawn(2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let done = Arc::clone(&done);
            assert!(
                pool.submit(Box::new(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                }))
                .is_ok()
            );
        }
        pool.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert!(pool.submit(Box::new(|| {})).is_err());
    }

    #[test]
    fn panicking_job_does_not_kill_the_worker() {
        let pool = WorkerPool::spawn(1).unwrap();
        let (tx, rx) = mpsc::channel();
        assert!(pool.submit(Box::new(|| panic!("boom"))).is_ok());
        assert!(pool.submit(Box::new(move || tx.send(7).unwrap())).is_ok());
        assert_eq!(rx.recv().unwrap(), 7);
        pool.shutdown();
    }
}
