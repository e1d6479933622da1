//! Observability. Purely additive: nothing here feeds back into admission
//! or selection decisions.

use serde::Serialize;
use std::cell::RefCell;
use strum::EnumCount;
use strum::IntoEnumIterator;

/// A single kind of thing the pool counts, covering both current-state
/// gauges (`Connecting`/`Available`/`Removed`/`Waiting`) and cumulative
/// lifetime events.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::EnumCount, strum::EnumIter, strum::AsRefStr,
)]
pub enum MetricVariant {
    Connecting,
    Available,
    Removed,
    Waiting,
    Recycled,
    Evicted,
    Cancelled,
    TooBusy,
}

/// An array indexed by [`MetricVariant`].
#[derive(Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariantArray<T>([T; MetricVariant::COUNT]);

impl<T> std::ops::Index<MetricVariant> for VariantArray<T> {
    type Output = T;
    fn index(&self, index: MetricVariant) -> &Self::Output {
        &self.0[index as usize]
    }
}

impl<T> std::ops::IndexMut<MetricVariant> for VariantArray<T> {
    fn index_mut(&mut self, index: MetricVariant) -> &mut Self::Output {
        &mut self.0[index as usize]
    }
}

impl<T: std::fmt::Debug + std::cmp::PartialEq + Default> std::fmt::Debug for VariantArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("");
        for variant in MetricVariant::iter() {
            if self[variant] != T::default() {
                d.field(variant.as_ref(), &self[variant]);
            }
        }
        d.finish()
    }
}

/// A snapshot of the pool's current and lifetime metrics.
#[derive(Debug, Default, Serialize)]
pub struct PoolMetrics {
    /// Current gauges: slots by state, plus queued-waiter count.
    pub current: VariantArray<usize>,
    /// Cumulative counters since pool creation.
    pub all_time: VariantArray<usize>,
    /// Sum of weight over `Connecting ∪ Available` slots.
    pub weight: usize,
}

/// Accumulator updated without a lock (single-writer executor owns it).
#[derive(Debug, Default)]
pub(crate) struct MetricsAccum {
    current: RefCell<VariantArray<usize>>,
    all_time: RefCell<VariantArray<usize>>,
}

impl MetricsAccum {
    pub fn inc_current(&self, variant: MetricVariant) {
        self.current.borrow_mut()[variant] += 1;
    }

    pub fn dec_current(&self, variant: MetricVariant) {
        self.current.borrow_mut()[variant] -= 1;
    }

    pub fn inc_all_time(&self, variant: MetricVariant) {
        self.all_time.borrow_mut()[variant] += 1;
    }

    pub fn transition(&self, from: MetricVariant, to: MetricVariant) {
        self.dec_current(from);
        self.inc_current(to);
        self.inc_all_time(to);
    }

    pub fn snapshot(&self, weight: usize) -> PoolMetrics {
        PoolMetrics {
            current: *self.current.borrow(),
            all_time: *self.all_time.borrow(),
            weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_move_counts_and_accumulate_all_time() {
        let m = MetricsAccum::default();
        m.inc_current(MetricVariant::Connecting);
        m.transition(MetricVariant::Connecting, MetricVariant::Available);
        let snap = m.snapshot(0);
        assert_eq!(snap.current[MetricVariant::Connecting], 0);
        assert_eq!(snap.current[MetricVariant::Available], 1);
        assert_eq!(snap.all_time[MetricVariant::Available], 1);
    }
}
