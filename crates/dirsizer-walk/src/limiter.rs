//! Concurrency ceiling enforcement.

use std::sync::Arc;

use dirsizer_core::{CancellationToken, LimitScope, SizeError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Hands out concurrency permits for one top-level invocation.
///
/// In [`LimitScope::PerContainer`] every expanded container gets its own
/// fan-out semaphore and collaborator calls are unbounded. In
/// [`LimitScope::Global`] fan-out is unbounded and one shared semaphore
/// bounds the collaborator calls instead. Global permits are never held
/// while waiting on children, so the pool cannot starve itself.
#[derive(Debug, Clone)]
pub(crate) struct Limiter {
    workers: usize,
    global: Option<Arc<Semaphore>>,
}

impl Limiter {
    pub fn new(scope: LimitScope, workers: usize) -> Self {
        let workers = workers.max(1);
        let global = match scope {
            LimitScope::PerContainer => None,
            LimitScope::Global => Some(Arc::new(Semaphore::new(workers))),
        };
        Self { workers, global }
    }

    /// Fan-out limiter for the children of one container.
    pub fn fan_out(&self) -> FanOut {
        match self.global {
            Some(_) => FanOut(None),
            None => FanOut(Some(Arc::new(Semaphore::new(self.workers)))),
        }
    }

    /// Permit for a single list or measure call.
    pub async fn io_permit(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<OwnedSemaphorePermit>, SizeError> {
        match &self.global {
            Some(semaphore) => acquire(semaphore, cancel).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Ticket dispenser for one container's child tasks.
#[derive(Debug)]
pub(crate) struct FanOut(Option<Arc<Semaphore>>);

impl FanOut {
    /// Wait for a free slot. Waiting is a cancellation point.
    pub async fn ticket(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<OwnedSemaphorePermit>, SizeError> {
        match &self.0 {
            Some(semaphore) => acquire(semaphore, cancel).await.map(Some),
            None if cancel.is_cancelled() => Err(SizeError::Cancelled),
            None => Ok(None),
        }
    }
}

async fn acquire(
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Result<OwnedSemaphorePermit, SizeError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SizeError::Cancelled),
        // The semaphores are never closed.
        permit = Arc::clone(semaphore).acquire_owned() => permit.map_err(|_| SizeError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_per_container_fan_out_is_fresh() {
        let limiter = Limiter::new(LimitScope::PerContainer, 1);
        let cancel = CancellationToken::new();

        let first = limiter.fan_out();
        let second = limiter.fan_out();

        let _held = first.ticket(&cancel).await.unwrap();
        // A sibling container's slots are independent of the first one's.
        assert!(second.ticket(&cancel).await.unwrap().is_some());
        assert!(limiter.io_permit(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_global_scope_bounds_io() {
        let limiter = Limiter::new(LimitScope::Global, 1);
        let cancel = CancellationToken::new();

        assert!(limiter.fan_out().ticket(&cancel).await.unwrap().is_none());

        let held = limiter.io_permit(&cancel).await.unwrap();
        assert!(held.is_some());

        let waiting = limiter.clone();
        let waiter_cancel = cancel.clone();
        let waiter = tokio::spawn(async move { waiting.io_permit(&waiter_cancel).await.map(|p| p.is_some()) });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_waiting_is_cancellable() {
        let limiter = Limiter::new(LimitScope::PerContainer, 1);
        let fan_out = limiter.fan_out();
        let cancel = CancellationToken::new();

        let _held = fan_out.ticket(&cancel).await.unwrap();
        cancel.cancel();

        let err = fan_out.ticket(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
