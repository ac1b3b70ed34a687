use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::DbError;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETED: u8 = 2;
const FAILED: u8 = 3;
const CANCELLED: u8 = 4;

/// Lifecycle of a [`PendingOperation`].
///
/// `Pending -> Running -> Completed | Failed`, or `Pending -> Cancelled`.
/// The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            PENDING => Self::Pending,
            RUNNING => Self::Running,
            COMPLETED => Self::Completed,
            FAILED => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    cancel_requested: AtomicBool,
}

type Outcome<T> = Result<T, DbError>;

/// Sending half of the result channel, shared so whichever side finishes
/// the operation first delivers its outcome.
type ResultSlot<T> = Arc<Mutex<Option<oneshot::Sender<Outcome<T>>>>>;

fn deliver<T>(slot: &ResultSlot<T>, outcome: Outcome<T>) {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(sender) = sender {
        // the waiter may have dropped its handle; the outcome drops here
        let _ = sender.send(outcome);
    }
}

/// Cooperative cancellation flag visible to a running job.
#[derive(Debug, Clone)]
pub(crate) struct CancelToken {
    shared: Arc<Shared>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), DbError> {
        if self.is_cancelled() {
            Err(DbError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Handle to an operation queued on an
/// [`AsyncExecutor`](super::AsyncExecutor).
///
/// Block on it with [`wait`](Self::wait) from a plain thread, or `.await` it
/// from async code. Never call `wait` from inside a tokio runtime.
#[derive(Debug)]
#[must_use = "dropping a PendingOperation discards its result"]
pub struct PendingOperation<T> {
    shared: Arc<Shared>,
    slot: ResultSlot<T>,
    receiver: oneshot::Receiver<Outcome<T>>,
}

impl<T> PendingOperation<T> {
    #[must_use]
    pub fn state(&self) -> OperationState {
        OperationState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Request cancellation.
    ///
    /// Returns `true` if the operation had not started and now never will;
    /// its result is then already available as [`DbError::Cancelled`].
    /// A running operation is asked to stop and its result is discarded:
    /// the waiter sees [`DbError::Cancelled`], though side effects that
    /// already reached the backend stay. Cancelling a finished operation
    /// does nothing.
    pub fn cancel(&self) -> bool {
        if self
            .shared
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.shared.cancel_requested.store(true, Ordering::Release);
            deliver(&self.slot, Err(DbError::Cancelled));
            tracing::debug!("cancelled pending operation");
            return true;
        }
        if self.state() == OperationState::Running {
            self.shared.cancel_requested.store(true, Ordering::Release);
            tracing::debug!("cancellation requested for running operation");
        }
        false
    }

    /// Block the current thread until the operation finishes.
    ///
    /// # Errors
    /// The operation's own error, [`DbError::Cancelled`] if it was
    /// cancelled, or [`DbError::Internal`] if its worker went away.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous execution context.
    pub fn wait(self) -> Result<T, DbError> {
        let Self {
            shared, receiver, ..
        } = self;
        match receiver.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(closed_error(&shared)),
        }
    }

    /// The result if the operation has finished, without blocking.
    ///
    /// Returns `None` while it is still pending or running. After a result
    /// has been returned once, later calls report [`DbError::Internal`].
    pub fn try_result(&mut self) -> Option<Result<T, DbError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(closed_error(&self.shared))),
        }
    }
}

impl<T> Future for PendingOperation<T> {
    type Output = Result<T, DbError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(closed_error(&this.shared))),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn closed_error(shared: &Shared) -> DbError {
    if OperationState::from_u8(shared.state.load(Ordering::Acquire)) == OperationState::Cancelled {
        DbError::Cancelled
    } else {
        DbError::Internal("operation result is no longer available".into())
    }
}

/// Worker-side half of a [`PendingOperation`].
pub(super) struct Completer<T> {
    shared: Arc<Shared>,
    slot: ResultSlot<T>,
}

/// Create a linked operation handle and completer.
pub(super) fn pending<T>() -> (PendingOperation<T>, Completer<T>) {
    let shared = Arc::new(Shared {
        state: AtomicU8::new(PENDING),
        cancel_requested: AtomicBool::new(false),
    });
    let (sender, receiver) = oneshot::channel();
    let slot = Arc::new(Mutex::new(Some(sender)));
    (
        PendingOperation {
            shared: Arc::clone(&shared),
            slot: Arc::clone(&slot),
            receiver,
        },
        Completer { shared, slot },
    )
}

impl<T> Completer<T> {
    /// Run `job` unless the operation was cancelled first, and deliver its
    /// outcome.
    pub fn run<F>(self, job: F)
    where
        F: FnOnce(&CancelToken) -> Result<T, DbError>,
    {
        if self
            .shared
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // cancelled while queued; `cancel` already delivered
            return;
        }

        let token = CancelToken {
            shared: Arc::clone(&self.shared),
        };
        let outcome = match job(&token) {
            discarded if token.is_cancelled() => {
                // release whatever the job produced, leases included, before waking the waiter
                drop(discarded);
                tracing::debug!("discarding result of cancelled operation");
                Err(DbError::Cancelled)
            }
            outcome => outcome,
        };
        let terminal = if outcome.is_ok() { COMPLETED } else { FAILED };
        self.shared.state.store(terminal, Ordering::Release);
        deliver(&self.slot, outcome);
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        let pending = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if !pending {
            return;
        }
        // the job panicked or was dropped unrun
        let state = &self.shared.state;
        let observed = match state.load(Ordering::Acquire) {
            current @ (PENDING | RUNNING) => state
                .compare_exchange(current, FAILED, Ordering::AcqRel, Ordering::Acquire)
                .map_or_else(|actual| actual, |_| FAILED),
            other => other,
        };
        let error = if observed == CANCELLED {
            DbError::Cancelled
        } else {
            DbError::Internal("worker dropped the operation".into())
        };
        deliver(&self.slot, Err(error));
    }
}
