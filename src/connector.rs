//! The external connector interface. The pool calls into this to open
//! connections; it never interprets the connection's bytes or protocol.

use crate::context::PoolContext;
use crate::slot::SlotId;
use std::rc::Weak;

/// Outcome of a successful connect attempt.
#[derive(Debug)]
pub struct Connected<Conn> {
    pub connection: Conn,
    /// Concurrent capacity this connection supports (multiplexing factor).
    pub max_capacity: usize,
    /// This slot's share of the pool's global weight budget.
    pub weight: usize,
}

/// The narrow, selector-independent slice of `Pool<C, S>` a
/// [`ConnectorListener`] needs to call back into. `Pool` is generic over its
/// [`crate::selector::Selector`], but a single `Connector` impl is shared by
/// pools built with any selector, so the listener can't name `S` — it goes
/// through this trait object instead.
pub(crate) trait SlotHandle<C: Connector> {
    fn handle_remove(&self, slot: SlotId);
    fn handle_concurrency_change(&self, slot: SlotId, new_max_capacity: usize);
}

/// Notifies the pool of remote-initiated changes to a connection it does
/// not otherwise observe: the connector holds the only reference to the
/// transport, so it is the connector that notices when it goes away.
///
/// Cloning is cheap; the listener carries only a weak reference back to
/// the pool, so holding one past the slot's removal is harmless.
pub struct ConnectorListener<C: Connector> {
    pub(crate) pool: Weak<dyn SlotHandle<C>>,
    pub(crate) slot: SlotId,
}

impl<C: Connector> Clone for ConnectorListener<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            slot: self.slot,
        }
    }
}

impl<C: Connector> ConnectorListener<C> {
    /// The connection behind this slot is gone. Any outstanding leases on
    /// it become no-ops on recycle.
    pub fn on_remove(&self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.handle_remove(self.slot);
        }
    }

    /// The connection's concurrent capacity changed (e.g. a multiplexed
    /// transport renegotiated its stream limit). Outstanding leases are
    /// respected: capacity never drops below the number of leases in use.
    pub fn on_concurrency_change(&self, new_max_capacity: usize) {
        if let Some(pool) = self.pool.upgrade() {
            pool.handle_concurrency_change(self.slot, new_max_capacity);
        }
    }
}

/// Opens connections on the pool's behalf. Implementations are external to
/// the pool core: transport, protocol, and validity heuristics all live
/// here.
pub trait Connector: 'static {
    /// The connection value handed out through leases.
    type Conn;
    /// The execution context type callers bind their waiters to.
    type Context: PoolContext;
    /// The cause reported on a failed connect attempt.
    type Error: std::error::Error + 'static;

    /// Start opening a connection bound to `ctx`. Must resolve to exactly
    /// one outcome: a successful [`Connected`] or an `Err`.
    fn connect(
        &self,
        ctx: &Self::Context,
        listener: ConnectorListener<Self>,
    ) -> impl std::future::Future<Output = Result<Connected<Self::Conn>, Self::Error>> + 'static
    where
        Self: Sized;

    /// Pure validity check, used defensively by callers that want to
    /// discard a connection before leasing it further. The pool itself
    /// never calls this.
    fn is_valid(&self, _connection: &Self::Conn) -> bool {
        true
    }
}

/// Snapshot of one slot, passed to an installed [`crate::selector::Selector`].
/// Stable for the duration of the selector call: the selector runs
/// synchronously on the executor, so nothing can mutate the slot out from
/// under it.
pub struct SlotView<'a, C: Connector> {
    pub(crate) id: SlotId,
    pub(crate) capacity: usize,
    pub(crate) max_capacity: usize,
    pub(crate) context: &'a C::Context,
    pub(crate) connection: &'a C::Conn,
}

impl<'a, C: Connector> SlotView<'a, C> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }
    pub fn context(&self) -> &C::Context {
        self.context
    }
    pub fn connection(&self) -> &C::Conn {
        self.connection
    }
}
