//! The handle returned by [`super::Pool::acquire`].

use crate::connector::Connector;
use crate::error::PoolError;
use crate::lease::Lease;
use crate::selector::{DefaultSelector, Selector};
use crate::slot::SlotId;
use crate::waiter::WaiterId;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::Pool;

/// A pending (or already-resolved) acquisition. Polling it drives nothing
/// on its own — the pool's own admission and connect-completion handling
/// do all the work — this future only observes the waiter's eventual
/// outcome.
///
/// Dropping an `Acquiring` before it resolves cancels the waiter on a
/// best-effort basis: if it is still queued, it is removed; if it is
/// already connecting or bound, the drop is a no-op and the connection (or
/// attempt) it was going to receive is simply recycled or discarded
/// normally once the attempt resolves.
pub struct Acquiring<C: Connector, S: Selector<C> = DefaultSelector> {
    pool: Rc<Pool<C, S>>,
    waiter: Option<WaiterId>,
    weight: usize,
    rx: oneshot::Receiver<Result<SlotId, PoolError<C::Error>>>,
    done: bool,
}

impl<C: Connector, S: Selector<C>> Acquiring<C, S> {
    pub(crate) fn new(
        pool: Rc<Pool<C, S>>,
        waiter: Option<WaiterId>,
        weight: usize,
        rx: oneshot::Receiver<Result<SlotId, PoolError<C::Error>>>,
    ) -> Self {
        Self {
            pool,
            waiter,
            weight,
            rx,
            done: false,
        }
    }

    /// Cancel this acquisition. Returns `true` if the waiter was still
    /// queued and is now removed; `false` if it had already started
    /// connecting, been bound to a slot, resolved, or this was called
    /// before (a no-op).
    pub fn cancel(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.done = true;
        match self.waiter.take() {
            Some(waiter) => self.pool.cancel_waiter(waiter),
            None => false,
        }
    }
}

impl<C: Connector, S: Selector<C>> Future for Acquiring<C, S> {
    type Output = Result<Lease<C, S>, PoolError<C::Error>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        // Sender dropped without completing only happens when `close` drops
        // a still-`Connecting` waiter's sender outright.
        let resolved = futures::ready!(Pin::new(&mut this.rx).poll(cx)).unwrap_or(Err(PoolError::PoolClosed));
        this.done = true;
        Poll::Ready(resolved.map(|slot| Lease::new(this.pool.clone(), slot, this.weight)))
    }
}

impl<C: Connector, S: Selector<C>> Drop for Acquiring<C, S> {
    fn drop(&mut self) {
        if !self.done {
            if let Some(waiter) = self.waiter.take() {
                self.pool.cancel_waiter(waiter);
            }
        }
    }
}
