//! Pluggable policy for choosing which slot serves the next waiter.

use crate::connector::{Connector, SlotView};

/// Chooses a slot for a waiter from among the `Available` slots that
/// currently have any free capacity at all. Runs on the executor: must be
/// synchronous and must not suspend.
pub trait Selector<C: Connector>: 'static {
    /// Return the index into `candidates` to bind the waiter to, or `None`
    /// to fall through to opening a new slot (or queuing).
    fn select(&self, weight: usize, candidates: &[SlotView<'_, C>]) -> Option<usize>;
}

/// First `Available` slot with `capacity >= weight`, in iteration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSelector;

impl<C: Connector> Selector<C> for DefaultSelector {
    fn select(&self, weight: usize, candidates: &[SlotView<'_, C>]) -> Option<usize> {
        candidates.iter().position(|s| s.capacity() >= weight)
    }
}
