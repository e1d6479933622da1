//! Internal record of one connection (or in-flight connect attempt).

use crate::arena::{GenerationalArena, Id};
use crate::connector::Connector;
use crate::waiter::WaiterId;

pub(crate) enum SlotTag {}

/// A generational index into the pool's slot arena. Leases and selector
/// snapshots carry this rather than a raw key so that a slot freed and its
/// key reused by a later connection can never be mistaken for the one
/// originally leased.
pub(crate) type SlotId = Id<SlotTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub(crate) enum SlotState {
    Connecting,
    Available,
    Removed,
}

pub(crate) struct Slot<C: Connector> {
    pub connection: Option<C::Conn>,
    pub context: C::Context,
    /// Free units right now, `0 <= capacity <= max_capacity`.
    pub capacity: usize,
    pub max_capacity: usize,
    /// This slot's share of the global weight budget. Provisional (equal
    /// to the opening waiter's weight) while `Connecting`.
    pub weight: usize,
    pub state: SlotState,
    /// While `Connecting`, the waiter this attempt was opened for.
    pub bound_waiter: Option<WaiterId>,
    /// Stamped from the pool's recycle counter each time this slot is
    /// recycled; 0 if it never has been. `evict` sorts by this, newest
    /// first.
    pub recycle_seq: u64,
}

impl<C: Connector> Slot<C> {
    pub fn connecting(context: C::Context, weight: usize, waiter: WaiterId) -> Self {
        Self {
            connection: None,
            context,
            capacity: 0,
            max_capacity: 0,
            weight,
            state: SlotState::Connecting,
            bound_waiter: Some(waiter),
            recycle_seq: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == SlotState::Available && self.capacity == self.max_capacity
    }
}

impl<C: Connector> std::fmt::Debug for Slot<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("state", &self.state.as_ref())
            .field("capacity", &self.capacity)
            .field("max_capacity", &self.max_capacity)
            .field("weight", &self.weight)
            .field("bound_waiter", &self.bound_waiter)
            .field("recycle_seq", &self.recycle_seq)
            .finish()
    }
}

pub(crate) type SlotArena<C> = GenerationalArena<Slot<C>, SlotTag>;
