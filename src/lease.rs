//! A single-use token representing one unit of capacity held on a slot.

use crate::connector::Connector;
use crate::error::PoolError;
use crate::pool::Pool;
use crate::selector::{DefaultSelector, Selector};
use crate::slot::SlotId;
use std::cell::Cell;
use std::rc::Rc;

/// RAII handle on one unit of a slot's capacity. Created when the pool
/// hands out a slot to a waiter; destroyed on first [`Lease::recycle`].
///
/// The back-reference to the slot is by id, not by borrow: it never
/// extends the slot's own lifetime. If the slot is removed before recycle,
/// recycling becomes a no-op on the (already-gone) slot but still marks
/// this lease used.
pub struct Lease<C: Connector, S: Selector<C> = DefaultSelector> {
    pool: Rc<Pool<C, S>>,
    slot: SlotId,
    /// Capacity units to return to the slot on recycle. Equal to the
    /// weight requested by the `acquire` call that produced this lease.
    weight: usize,
    used: Cell<bool>,
}

impl<C: Connector, S: Selector<C>> Lease<C, S> {
    pub(crate) fn new(pool: Rc<Pool<C, S>>, slot: SlotId, weight: usize) -> Self {
        Self {
            pool,
            slot,
            weight,
            used: Cell::new(false),
        }
    }

    /// Run `f` against the underlying connection. Returns `None` if the
    /// slot has already been removed out from under this lease.
    pub fn with<T>(&self, f: impl FnOnce(&C::Conn) -> T) -> Option<T> {
        self.pool.with_connection(self.slot, f)
    }

    /// Release this lease's unit of capacity back to the pool. Recycling
    /// a lease a second time is a programming error and fails fast with
    /// [`PoolError::InvalidRecycle`] without touching pool state.
    pub fn recycle(&self) -> Result<(), PoolError<C::Error>> {
        if self.used.replace(true) {
            return Err(PoolError::InvalidRecycle);
        }
        self.pool.recycle_slot(self.slot, self.weight);
        Ok(())
    }
}

impl<C: Connector, S: Selector<C>> std::fmt::Debug for Lease<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("slot", &self.slot)
            .field("used", &self.used.get())
            .finish()
    }
}

impl<C: Connector, S: Selector<C>> Drop for Lease<C, S> {
    fn drop(&mut self) {
        if !self.used.get() {
            let _ = self.recycle();
        }
    }
}
