//! Internal record of one pending acquisition.

use crate::arena::{GenerationalArena, Id};
use crate::connector::Connector;
use crate::error::PoolError;
use crate::slot::SlotId;
use tokio::sync::oneshot;

pub(crate) enum WaiterTag {}

/// A generational index into the pool's waiter arena. An `Acquiring` handle
/// holds onto one of these for its whole lifetime, including across
/// `.await` points where it is never polled, so a raw `slab` key (reusable
/// the moment a waiter completes) would not be safe here either.
pub(crate) type WaiterId = Id<WaiterTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub(crate) enum WaiterState {
    Queued,
    Connecting,
    Completed,
    Cancelled,
}

/// Two optional hooks fired as the waiter moves through admission. There is
/// no polymorphic listener hierarchy to preserve here, just two function
/// pointers a caller may or may not have installed.
#[derive(Default)]
pub struct WaiterListener {
    /// Fired when the waiter is appended to the FIFO queue (admission
    /// step 4).
    pub on_enqueue: Option<Box<dyn FnMut()>>,
    /// Fired when a connect attempt is started on the waiter's behalf
    /// (admission step 3, or a queue drain that promotes it).
    pub on_connect: Option<Box<dyn FnMut()>>,
}

impl std::fmt::Debug for WaiterListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaiterListener")
            .field("on_enqueue", &self.on_enqueue.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .finish()
    }
}

impl WaiterListener {
    pub(crate) fn fire_enqueue(&mut self) {
        if let Some(f) = self.on_enqueue.as_mut() {
            f();
        }
    }

    pub(crate) fn fire_connect(&mut self) {
        if let Some(f) = self.on_connect.as_mut() {
            f();
        }
    }
}

pub(crate) struct Waiter<C: Connector> {
    pub context: C::Context,
    pub weight: usize,
    pub state: WaiterState,
    pub listener: Option<WaiterListener>,
    /// Bound slot while `Connecting`.
    pub slot: Option<SlotId>,
    /// The one-shot "callback": `Some` until the waiter completes exactly
    /// once (success or failure).
    pub tx: Option<oneshot::Sender<Result<SlotId, PoolError<C::Error>>>>,
}

impl<C: Connector> std::fmt::Debug for Waiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("weight", &self.weight)
            .field("state", &self.state.as_ref())
            .field("slot", &self.slot)
            .finish()
    }
}

impl<C: Connector> Waiter<C> {
    pub fn new(context: C::Context, weight: usize, listener: Option<WaiterListener>) -> Self {
        Self {
            context,
            weight,
            state: WaiterState::Queued,
            listener,
            slot: None,
            tx: None,
        }
    }

    /// Complete this waiter exactly once. A second call is a no-op: the
    /// `tx` has already been consumed.
    pub fn complete(&mut self, result: Result<SlotId, PoolError<C::Error>>) {
        self.state = WaiterState::Completed;
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
    }
}

pub(crate) type WaiterArena<C> = GenerationalArena<Waiter<C>, WaiterTag>;
