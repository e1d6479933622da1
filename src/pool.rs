//! The pool core: admission, the FIFO waiter queue, and the two queue-drain
//! paths (capacity freed on one slot vs. weight budget freed pool-wide).
//!
//! Every mutating entry point borrows `inner` for the span of its own
//! synchronous logic only, and drops that borrow before spawning a connect
//! attempt or touching anything outside this module. The one deliberate
//! exception is [`crate::waiter::WaiterListener`]'s hooks, which fire while
//! `inner` is still borrowed — they must never call back into the pool
//! synchronously, or the inner `RefCell` will panic on the reentrant borrow.
//! That panic is the single-writer discipline made visible rather than a
//! bug: it turns a reentrancy violation into a loud failure instead of
//! silent state corruption.

use crate::connector::{Connected, Connector, ConnectorListener, SlotHandle, SlotView};
use crate::error::PoolError;
use crate::metrics::{MetricVariant, MetricsAccum, PoolMetrics};
use crate::selector::{DefaultSelector, Selector};
use crate::slot::{Slot, SlotArena, SlotId, SlotState};
use crate::waiter::{Waiter, WaiterArena, WaiterId, WaiterListener, WaiterState};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

mod acquire;
pub use acquire::Acquiring;

/// Admission limits. Immutable for the pool's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Maximum number of slots (`Connecting` + `Available`) at once.
    pub max_size: usize,
    /// Maximum sum of slot weight (`Connecting` + `Available`) at once.
    pub max_weight: usize,
    /// Maximum number of queued waiters. Defaults to unbounded.
    pub max_waiters: usize,
}

impl PoolConfig {
    pub fn new(max_size: usize, max_weight: usize) -> Self {
        Self {
            max_size,
            max_weight,
            max_waiters: usize::MAX,
        }
    }

    pub fn with_max_waiters(mut self, max_waiters: usize) -> Self {
        self.max_waiters = max_waiters;
        self
    }

    /// Panics if any bound is zero. Call once, before handing the config to
    /// [`Pool::new`]; not re-checked on every admission.
    pub fn assert_valid(&self) {
        assert!(self.max_size > 0, "PoolConfig::max_size must be non-zero");
        assert!(self.max_weight > 0, "PoolConfig::max_weight must be non-zero");
        assert!(self.max_waiters > 0, "PoolConfig::max_waiters must be non-zero");
    }
}

/// What `close` returns for each slot that existed at the time it ran.
#[derive(Debug)]
pub enum ClosedSlot<Conn> {
    /// A connection that had been fully established.
    Connected(Conn),
    /// A connect attempt still in flight. Its eventual connector callback
    /// is not suppressed, but resolves against a pool that is already
    /// gone, so it is silently dropped; the waiter it was opened for has
    /// already been failed with [`PoolError::PoolClosed`].
    Pending,
}

struct Inner<C: Connector> {
    slots: SlotArena<C>,
    waiters: WaiterArena<C>,
    queue: VecDeque<WaiterId>,
    /// Sum of `weight` over every `Connecting ∪ Available` slot.
    total_weight: usize,
    /// Monotonic counter stamped onto a slot each time it is recycled, so
    /// `evict` can return connections newest-recycled-first (R3).
    next_recycle_seq: u64,
    closed: bool,
}

impl<C: Connector> Default for Inner<C> {
    fn default() -> Self {
        Self {
            slots: SlotArena::default(),
            waiters: WaiterArena::default(),
            queue: VecDeque::new(),
            total_weight: 0,
            next_recycle_seq: 0,
            closed: false,
        }
    }
}

pub struct Pool<C: Connector, S: Selector<C> = DefaultSelector> {
    connector: C,
    config: PoolConfig,
    selector: S,
    inner: RefCell<Inner<C>>,
    metrics: MetricsAccum,
    /// Back-reference handed to connect attempts via [`ConnectorListener`],
    /// which can't name `S` (see [`SlotHandle`]).
    self_weak: Weak<Self>,
}

impl<C: Connector> Pool<C, DefaultSelector> {
    pub fn new(config: PoolConfig, connector: C) -> Rc<Self> {
        Self::with_selector(config, connector, DefaultSelector)
    }
}

impl<C: Connector, S: Selector<C>> Pool<C, S> {
    pub fn with_selector(config: PoolConfig, connector: C, selector: S) -> Rc<Self> {
        config.assert_valid();
        Rc::new_cyclic(|self_weak| Self {
            connector,
            config,
            selector,
            inner: RefCell::new(Inner::default()),
            metrics: MetricsAccum::default(),
            self_weak: self_weak.clone(),
        })
    }

    /// Request one unit of capacity, bound to `ctx`'s execution context.
    /// `weight` both consumes pool-wide weight budget while a fresh
    /// connection is opened on this waiter's behalf, and, once bound to a
    /// slot (fresh or already `Available`), is the number of capacity
    /// units reserved on it.
    pub fn acquire(self: &Rc<Self>, ctx: C::Context, weight: usize) -> Acquiring<C, S> {
        self.acquire_with_listener(ctx, weight, None)
    }

    pub fn acquire_with_listener(
        self: &Rc<Self>,
        ctx: C::Context,
        weight: usize,
        listener: Option<WaiterListener>,
    ) -> Acquiring<C, S> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let waiter_id = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                drop(inner);
                let _ = tx.send(Err(PoolError::PoolClosed));
                return Acquiring::new(self.clone(), None, weight, rx);
            }
            let mut waiter = Waiter::new(ctx, weight, listener);
            waiter.tx = Some(tx);
            inner.waiters.insert(waiter)
        };
        self.try_admit(waiter_id);
        Acquiring::new(self.clone(), Some(waiter_id), weight, rx)
    }

    /// Admission for a freshly created waiter: try an existing slot, else
    /// open a new one if budget allows, else queue, else reject.
    fn try_admit(self: &Rc<Self>, waiter_id: WaiterId) {
        let mut inner = self.inner.borrow_mut();
        let weight = match inner.waiters.get(waiter_id) {
            Some(w) => w.weight,
            None => return,
        };

        // Step 2: an Available slot with free capacity, selector's pick.
        let candidates: Vec<SlotId> = inner
            .slots
            .iter()
            .filter(|(_, s)| s.state == SlotState::Available && s.capacity >= 1)
            .map(|(id, _)| id)
            .collect();

        if !candidates.is_empty() {
            let chosen = {
                let views: Vec<SlotView<C>> = candidates
                    .iter()
                    .map(|&id| {
                        let s = inner.slots.get(id).expect("candidate came from this arena");
                        SlotView {
                            id,
                            capacity: s.capacity,
                            max_capacity: s.max_capacity,
                            context: &s.context,
                            connection: s
                                .connection
                                .as_ref()
                                .expect("Available slot always holds a connection"),
                        }
                    })
                    .collect();
                self.selector.select(weight, &views).map(|idx| views[idx].id)
            };
            if let Some(slot_id) = chosen {
                if let Some(slot) = inner.slots.get_mut(slot_id) {
                    slot.capacity -= weight;
                }
                if let Some(w) = inner.waiters.get_mut(waiter_id) {
                    w.complete(Ok(slot_id));
                }
                inner.waiters.remove(waiter_id);
                tracing::trace!(?waiter_id, ?slot_id, "acquire bound to an existing slot");
                return;
            }
        }

        // Step 3: open a new slot if weight and size budgets allow.
        if inner.total_weight + weight <= self.config.max_weight
            && inner.slots.len() < self.config.max_size
        {
            let ctx = {
                let w = inner.waiters.get_mut(waiter_id).expect("waiter still pending");
                w.state = WaiterState::Connecting;
                if let Some(listener) = w.listener.as_mut() {
                    listener.fire_connect();
                }
                w.context.clone()
            };
            inner.total_weight += weight;
            self.metrics.inc_current(MetricVariant::Connecting);
            self.metrics.inc_all_time(MetricVariant::Connecting);
            let slot_id = inner
                .slots
                .insert(Slot::connecting(ctx.clone(), weight, waiter_id));
            inner.waiters.get_mut(waiter_id).expect("waiter still pending").slot = Some(slot_id);
            tracing::trace!(?waiter_id, ?slot_id, "acquire starting a new connect attempt");
            drop(inner);
            self.start_connect(slot_id, ctx);
            return;
        }

        // Step 4: queue if there's room.
        if inner.queue.len() < self.config.max_waiters {
            inner.queue.push_back(waiter_id);
            self.metrics.inc_current(MetricVariant::Waiting);
            if let Some(listener) = inner
                .waiters
                .get_mut(waiter_id)
                .expect("waiter still pending")
                .listener
                .as_mut()
            {
                listener.fire_enqueue();
            }
            tracing::trace!(?waiter_id, "acquire queued");
            return;
        }

        // Step 5: reject.
        if let Some(w) = inner.waiters.get_mut(waiter_id) {
            w.complete(Err(PoolError::PoolTooBusy));
        }
        inner.waiters.remove(waiter_id);
        self.metrics.inc_all_time(MetricVariant::TooBusy);
        tracing::trace!(?waiter_id, "acquire rejected: pool too busy");
    }

    fn start_connect(self: &Rc<Self>, slot_id: SlotId, ctx: C::Context) {
        let pool = self.clone();
        let handle: Weak<dyn SlotHandle<C>> = self.self_weak.clone();
        let listener = ConnectorListener {
            pool: handle,
            slot: slot_id,
        };
        let connect_ctx = ctx.clone();
        ctx.spawn(async move {
            let outcome = pool.connector.connect(&connect_ctx, listener).await;
            match outcome {
                Ok(Connected {
                    connection,
                    max_capacity,
                    weight,
                }) => pool.on_connect_succeeded(slot_id, connection, max_capacity, weight),
                Err(cause) => pool.on_connect_failed(slot_id, cause),
            }
        });
    }

    fn on_connect_succeeded(
        self: &Rc<Self>,
        slot_id: SlotId,
        connection: C::Conn,
        max_capacity: usize,
        weight: usize,
    ) {
        let mut inner = self.inner.borrow_mut();
        let bound_waiter = {
            let Some(slot) = inner.slots.get_mut(slot_id) else {
                // Pool closed or slot removed while connecting; connector's
                // callback still fires, we just have nothing left to do.
                return;
            };
            let old_weight = slot.weight;
            slot.connection = Some(connection);
            slot.max_capacity = max_capacity;
            slot.capacity = max_capacity;
            slot.weight = weight;
            slot.state = SlotState::Available;
            inner.total_weight = inner.total_weight + weight - old_weight;
            slot.bound_waiter.take()
        };
        self.metrics.transition(MetricVariant::Connecting, MetricVariant::Available);
        tracing::trace!(?slot_id, max_capacity, weight, "connect succeeded");

        if let Some(waiter_id) = bound_waiter {
            if let Some(bound_weight) = inner.waiters.get(waiter_id).map(|w| w.weight) {
                if let Some(slot) = inner.slots.get_mut(slot_id) {
                    slot.capacity = slot.capacity.saturating_sub(bound_weight);
                }
                if let Some(w) = inner.waiters.get_mut(waiter_id) {
                    w.complete(Ok(slot_id));
                }
                inner.waiters.remove(waiter_id);
            }
        }

        self.drain_slot_capacity(&mut inner, slot_id);
    }

    fn on_connect_failed(self: &Rc<Self>, slot_id: SlotId, cause: C::Error) {
        let mut inner = self.inner.borrow_mut();
        let Some(slot) = inner.slots.remove(slot_id) else {
            return;
        };
        inner.total_weight -= slot.weight;
        self.metrics.dec_current(MetricVariant::Connecting);
        tracing::trace!(?slot_id, ?cause, "connect failed");
        if let Some(waiter_id) = slot.bound_waiter {
            if let Some(w) = inner.waiters.get_mut(waiter_id) {
                w.complete(Err(PoolError::Connect(cause)));
            }
            inner.waiters.remove(waiter_id);
        }
        let pending = self.try_admit_next_queued(&mut inner);
        drop(inner);
        if let Some((slot_id, ctx)) = pending {
            self.start_connect(slot_id, ctx);
        }
    }

    /// Pop the next queued waiter and start a connect attempt for it, if
    /// the weight and size budgets allow. This is the weight-budget-driven
    /// drain path: it runs after a slot disappears (failure or removal)
    /// frees up budget for a *brand-new* connect attempt, as distinct from
    /// [`Self::drain_slot_capacity`], which hands existing free capacity on
    /// one already-connected slot to queued waiters without opening
    /// anything new.
    fn try_admit_next_queued(&self, inner: &mut Inner<C>) -> Option<(SlotId, C::Context)> {
        let &front_id = inner.queue.front()?;
        let weight = inner.waiters.get(front_id)?.weight;
        if inner.total_weight + weight > self.config.max_weight || inner.slots.len() >= self.config.max_size {
            return None;
        }
        inner.queue.pop_front();
        self.metrics.dec_current(MetricVariant::Waiting);

        let ctx = {
            let waiter = inner.waiters.get_mut(front_id).expect("front of queue exists");
            waiter.state = WaiterState::Connecting;
            if let Some(listener) = waiter.listener.as_mut() {
                listener.fire_connect();
            }
            waiter.context.clone()
        };
        inner.total_weight += weight;
        self.metrics.inc_current(MetricVariant::Connecting);
        self.metrics.inc_all_time(MetricVariant::Connecting);
        let slot_id = inner.slots.insert(Slot::connecting(ctx.clone(), weight, front_id));
        inner.waiters.get_mut(front_id).expect("front of queue exists").slot = Some(slot_id);
        Some((slot_id, ctx))
    }

    /// Hand a slot's newly-freed capacity to as many queued waiters as it
    /// can satisfy, front to back, without opening any new connection.
    fn drain_slot_capacity(&self, inner: &mut Inner<C>, slot_id: SlotId) {
        loop {
            let Some(slot) = inner.slots.get(slot_id) else { break };
            if slot.capacity == 0 {
                break;
            }
            let Some(&front_id) = inner.queue.front() else { break };
            let Some(front_weight) = inner.waiters.get(front_id).map(|w| w.weight) else {
                inner.queue.pop_front();
                continue;
            };
            if front_weight > slot.capacity {
                break;
            }
            inner.queue.pop_front();
            self.metrics.dec_current(MetricVariant::Waiting);
            if let Some(slot) = inner.slots.get_mut(slot_id) {
                slot.capacity -= front_weight;
            }
            if let Some(w) = inner.waiters.get_mut(front_id) {
                w.complete(Ok(slot_id));
            }
            inner.waiters.remove(front_id);
        }
    }

    /// Return `weight` units of capacity to `slot_id`. A no-op if the slot
    /// has since been removed, or (should not happen in practice) is not
    /// currently `Available`.
    pub(crate) fn recycle_slot(self: &Rc<Self>, slot_id: SlotId, weight: usize) {
        let mut inner = self.inner.borrow_mut();
        {
            let Some(slot) = inner.slots.get(slot_id) else { return };
            if slot.state != SlotState::Available {
                return;
            }
        }
        inner.next_recycle_seq += 1;
        let seq = inner.next_recycle_seq;
        let slot = inner.slots.get_mut(slot_id).expect("checked Available above");
        slot.capacity = (slot.capacity + weight).min(slot.max_capacity);
        slot.recycle_seq = seq;
        self.metrics.inc_all_time(MetricVariant::Recycled);
        tracing::trace!(?slot_id, weight, "lease recycled");
        self.drain_slot_capacity(&mut inner, slot_id);
    }

    pub(crate) fn with_connection<T>(&self, slot_id: SlotId, f: impl FnOnce(&C::Conn) -> T) -> Option<T> {
        let inner = self.inner.borrow();
        let slot = inner.slots.get(slot_id)?;
        slot.connection.as_ref().map(f)
    }

    pub(crate) fn handle_remove(self: &Rc<Self>, slot_id: SlotId) {
        let mut inner = self.inner.borrow_mut();
        let Some(mut slot) = inner.slots.remove(slot_id) else {
            return;
        };
        slot.state = SlotState::Removed;
        inner.total_weight -= slot.weight;
        let was_connected = slot.connection.is_some();
        self.metrics.transition(
            if was_connected {
                MetricVariant::Available
            } else {
                MetricVariant::Connecting
            },
            MetricVariant::Removed,
        );
        tracing::trace!(?slot_id, "slot removed by connector");
        if let Some(waiter_id) = slot.bound_waiter.take() {
            inner.waiters.remove(waiter_id);
        }
        let pending = self.try_admit_next_queued(&mut inner);
        drop(inner);
        if let Some((slot_id, ctx)) = pending {
            self.start_connect(slot_id, ctx);
        }
    }

    pub(crate) fn handle_concurrency_change(self: &Rc<Self>, slot_id: SlotId, new_max_capacity: usize) {
        let mut inner = self.inner.borrow_mut();
        let Some(slot) = inner.slots.get_mut(slot_id) else {
            return;
        };
        if slot.state != SlotState::Available {
            return;
        }
        let leased = slot.max_capacity - slot.capacity;
        slot.max_capacity = new_max_capacity;
        slot.capacity = new_max_capacity.saturating_sub(leased);
        tracing::trace!(?slot_id, new_max_capacity, leased, "slot concurrency changed");
        self.drain_slot_capacity(&mut inner, slot_id);
    }

    /// Cancel a queued waiter: drop it from the queue without resolving its
    /// future. Returns `true` if it was still `Queued`, `false` if it had
    /// already moved past that state (or never existed), in which case
    /// cancellation has no effect.
    pub(crate) fn cancel_waiter(&self, waiter_id: WaiterId) -> bool {
        let mut inner = self.inner.borrow_mut();
        match inner.waiters.get(waiter_id).map(|w| w.state) {
            Some(WaiterState::Queued) => {
                inner.queue.retain(|&id| id != waiter_id);
                if let Some(w) = inner.waiters.get_mut(waiter_id) {
                    w.state = WaiterState::Cancelled;
                }
                inner.waiters.remove(waiter_id);
                self.metrics.dec_current(MetricVariant::Waiting);
                self.metrics.inc_all_time(MetricVariant::Cancelled);
                true
            }
            _ => false,
        }
    }

    /// Remove every idle `Available` slot (no outstanding leases) whose
    /// connection fails `keep`. Connecting slots are never candidates:
    /// there is no connection yet to evaluate. Returned connections are
    /// ordered newest-recycled-first (R3).
    pub fn evict(self: &Rc<Self>, mut keep: impl FnMut(&C::Conn) -> bool) -> Vec<C::Conn> {
        let mut inner = self.inner.borrow_mut();
        let mut doomed: Vec<(SlotId, u64)> = inner
            .slots
            .iter()
            .filter(|(_, s)| {
                s.is_idle()
                    && !keep(s.connection.as_ref().expect("Available slot always holds a connection"))
            })
            .map(|(id, s)| (id, s.recycle_seq))
            .collect();
        doomed.sort_by_key(|&(_, seq)| std::cmp::Reverse(seq));
        let mut out = Vec::with_capacity(doomed.len());
        for (slot_id, _) in doomed {
            if let Some(slot) = inner.slots.remove(slot_id) {
                inner.total_weight -= slot.weight;
                self.metrics.transition(MetricVariant::Available, MetricVariant::Removed);
                self.metrics.inc_all_time(MetricVariant::Evicted);
                if let Some(conn) = slot.connection {
                    out.push(conn);
                }
            }
        }
        out
    }

    /// Fail every queued waiter with [`PoolError::PoolClosed`], drop every
    /// in-flight connect attempt (its connector callback, once it fires,
    /// is silently discarded), and return every connection the pool was
    /// holding. Idempotent only in the sense that a second call returns
    /// `Err(PoolError::PoolClosed)` rather than panicking.
    pub fn close(self: &Rc<Self>) -> Result<Vec<ClosedSlot<C::Conn>>, PoolError<C::Error>> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Err(PoolError::PoolClosed);
        }
        inner.closed = true;

        let queued: Vec<WaiterId> = inner.queue.drain(..).collect();
        for waiter_id in queued {
            if let Some(w) = inner.waiters.get_mut(waiter_id) {
                w.complete(Err(PoolError::PoolClosed));
            }
            inner.waiters.remove(waiter_id);
            self.metrics.dec_current(MetricVariant::Waiting);
        }

        let slot_ids: Vec<SlotId> = inner.slots.iter().map(|(id, _)| id).collect();
        let mut out = Vec::with_capacity(slot_ids.len());
        for slot_id in slot_ids {
            let Some(slot) = inner.slots.remove(slot_id) else {
                continue;
            };
            if let Some(waiter_id) = slot.bound_waiter {
                inner.waiters.remove(waiter_id);
            }
            inner.total_weight -= slot.weight;
            match slot.state {
                SlotState::Available => out.push(ClosedSlot::Connected(
                    slot.connection.expect("Available slot always holds a connection"),
                )),
                SlotState::Connecting => out.push(ClosedSlot::Pending),
                SlotState::Removed => {}
            }
        }
        tracing::debug!(returned = out.len(), "pool closed");
        Ok(out)
    }

    /// Number of slots with spare capacity right now (`Available` only;
    /// `Connecting` attempts are not yet usable capacity).
    pub fn size(&self) -> usize {
        self.inner
            .borrow()
            .slots
            .iter()
            .filter(|(_, s)| s.state == SlotState::Available)
            .count()
    }

    /// Sum of weight over every `Connecting ∪ Available` slot.
    pub fn weight(&self) -> usize {
        self.inner.borrow().total_weight
    }

    /// Number of waiters currently queued (neither bound to a slot nor
    /// connecting one of their own).
    pub fn waiters(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.metrics.snapshot(self.weight())
    }
}

impl<C: Connector, S: Selector<C>> SlotHandle<C> for Pool<C, S> {
    fn handle_remove(&self, slot: SlotId) {
        if let Some(pool) = self.self_weak.upgrade() {
            pool.handle_remove(slot);
        }
    }

    fn handle_concurrency_change(&self, slot: SlotId, new_max_capacity: usize) {
        if let Some(pool) = self.self_weak.upgrade() {
            pool.handle_concurrency_change(slot, new_max_capacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LocalContext;
    use crate::test_support::{MockConnector, MockOutcome};
    use std::time::Duration;

    #[test]
    #[should_panic(expected = "max_size")]
    fn config_rejects_zero_max_size() {
        PoolConfig::new(0, 1).assert_valid();
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn single_acquire_succeeds() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let pool = Pool::new(PoolConfig::new(1, 1), MockConnector::immediate());
                let lease = pool.acquire(LocalContext, 1).await.expect("acquire succeeds");
                assert_eq!(pool.size(), 1);
                assert_eq!(pool.weight(), 1);
                assert_eq!(lease.with(|conn| *conn), Some(0));
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn extra_capacity_satisfies_second_waiter_on_same_slot() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let pool = Pool::new(PoolConfig::new(1, 1), MockConnector::with_capacity(2, 1));
                let first = pool.acquire(LocalContext, 1).await.expect("first connects");
                let second = pool.acquire(LocalContext, 1).await.expect("second rides the spare capacity");

                assert_eq!(first.with(|c| *c), second.with(|c| *c));
                // Only one connect attempt: the second waiter was satisfied
                // by the first slot's spare capacity, never opened its own.
                assert_eq!(pool.size(), 1);
                assert_eq!(pool.weight(), 1);
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn connect_failure_frees_weight_for_next_queued_waiter() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let connector = MockConnector::new(MockOutcome::Connect { max_capacity: 1, weight: 1 });
                connector.push(MockOutcome::Fail("boom"));
                let pool = Pool::new(PoolConfig::new(2, 2), connector);

                // Consumes the whole weight budget on its own connect attempt.
                let first = pool.acquire(LocalContext, 2);
                // No budget left: queued behind `first`.
                let second = pool.acquire(LocalContext, 1);
                assert_eq!(pool.waiters(), 1);

                let first_result = first.await;
                assert!(matches!(first_result, Err(ref e) if e.kind() == "Connect"));

                let lease = second.await.expect("freed weight admits the queued waiter");
                assert_eq!(pool.weight(), 1);
                assert_eq!(pool.size(), 1);
                drop(lease);
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn evict_removes_idle_slot_but_leaves_leased_one() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let pool = Pool::new(PoolConfig::new(4, 4), MockConnector::immediate());
                let a = pool.acquire(LocalContext, 1).await.unwrap(); // conn 0
                let b = pool.acquire(LocalContext, 1).await.unwrap(); // conn 1, its own slot
                drop(a); // recycled, now idle

                let evicted = pool.evict(|conn| *conn != 0);
                assert_eq!(evicted, vec![0]);
                // b's slot is still Available (leased), so still counted.
                assert_eq!(pool.size(), 1);
                drop(b);
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn evict_skips_slots_still_connecting() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let connector = MockConnector::immediate().with_delay(Duration::from_secs(1));
                let pool = Pool::new(PoolConfig::new(2, 2), connector);
                let acquiring = pool.acquire(LocalContext, 1);
                assert_eq!(pool.size(), 0); // Connecting, not yet Available

                let evicted = pool.evict(|_| false); // "evict everything" that's a candidate
                assert!(evicted.is_empty());

                tokio::time::advance(Duration::from_secs(1)).await;
                let lease = acquiring.await.expect("cancel had no bearing on this connect");
                drop(lease);
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn evict_returns_connections_newest_recycle_first() {
        tokio::task::LocalSet::new()
            .run_until(async {
                // pool(10, 10), open 3 slots in order [0, 1, 2].
                let pool = Pool::new(PoolConfig::new(10, 10), MockConnector::immediate());
                let l0 = pool.acquire(LocalContext, 1).await.unwrap();
                let l1 = pool.acquire(LocalContext, 1).await.unwrap();
                let l2 = pool.acquire(LocalContext, 1).await.unwrap();

                // Recycle [1, 2]: slot 0 is still leased, so not a candidate.
                l1.recycle().unwrap();
                l2.recycle().unwrap();
                assert_eq!(pool.evict(|_| false), vec![2, 1]);
                drop(l0);
            })
            .await;

        tokio::task::LocalSet::new()
            .run_until(async {
                // Recycle [0, 1, 2].
                let pool = Pool::new(PoolConfig::new(10, 10), MockConnector::immediate());
                let l0 = pool.acquire(LocalContext, 1).await.unwrap();
                let l1 = pool.acquire(LocalContext, 1).await.unwrap();
                let l2 = pool.acquire(LocalContext, 1).await.unwrap();

                l0.recycle().unwrap();
                l1.recycle().unwrap();
                l2.recycle().unwrap();
                assert_eq!(pool.evict(|_| false), vec![2, 1, 0]);
            })
            .await;

        tokio::task::LocalSet::new()
            .run_until(async {
                // Recycle [0, 1]: slot 2 is still leased, so not a candidate.
                let pool = Pool::new(PoolConfig::new(10, 10), MockConnector::immediate());
                let l0 = pool.acquire(LocalContext, 1).await.unwrap();
                let l1 = pool.acquire(LocalContext, 1).await.unwrap();
                let l2 = pool.acquire(LocalContext, 1).await.unwrap();

                l0.recycle().unwrap();
                l1.recycle().unwrap();
                assert_eq!(pool.evict(|_| false), vec![1, 0]);
                drop(l2);
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn close_reports_both_established_and_in_flight_slots() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let connector = MockConnector::immediate().with_delay(Duration::from_millis(10));
                let pool = Pool::new(PoolConfig::new(2, 2), connector);

                let first = pool.acquire(LocalContext, 1);
                tokio::time::advance(Duration::from_millis(10)).await;
                let lease = first.await.expect("first connect resolves");

                // A second slot's worth of budget is still free: opens its
                // own connect attempt, left in flight when we close.
                let second = pool.acquire(LocalContext, 1);

                let closed = pool.close().expect("close succeeds while one slot is pending");
                assert_eq!(closed.len(), 2);
                let connected = closed.iter().filter(|s| matches!(s, ClosedSlot::Connected(_))).count();
                let pending = closed.iter().filter(|s| matches!(s, ClosedSlot::Pending)).count();
                assert_eq!(connected, 1);
                assert_eq!(pending, 1);

                assert!(matches!(second.await, Err(e) if e.is_closed()));
                drop(lease);
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn pool_too_busy_when_no_room_to_queue() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let connector = MockConnector::immediate().with_delay(Duration::from_secs(1));
                let pool = Pool::new(PoolConfig::new(1, 1).with_max_waiters(0), connector);
                // Consumes the only slot's weight budget; still connecting.
                let _first = pool.acquire(LocalContext, 1);
                let second = pool.acquire(LocalContext, 1).await;
                assert!(matches!(second, Err(PoolError::PoolTooBusy)));
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn cancel_removes_a_still_queued_waiter() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let connector = MockConnector::immediate().with_delay(Duration::from_secs(1));
                let pool = Pool::new(PoolConfig::new(1, 1), connector);
                let _first = pool.acquire(LocalContext, 1); // consumes the budget, still connecting
                let mut second = pool.acquire(LocalContext, 1); // queued
                assert_eq!(pool.waiters(), 1);

                assert!(second.cancel());
                assert_eq!(pool.waiters(), 0);

                // Cancelling an already-cancelled acquisition is a no-op.
                assert!(!second.cancel());
                assert_eq!(pool.waiters(), 0);
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn cancel_has_no_effect_once_connecting() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let connector = MockConnector::immediate().with_delay(Duration::from_secs(1));
                let pool = Pool::new(PoolConfig::new(1, 1), connector);
                let mut acquiring = pool.acquire(LocalContext, 1); // starts connecting immediately
                assert!(!acquiring.cancel()); // no-op: not queued

                tokio::time::advance(Duration::from_secs(1)).await;
                let lease = acquiring.await.expect("cancel after connecting has no effect");
                drop(lease);
            })
            .await;
    }

    #[test_log::test(tokio::test(flavor = "current_thread", start_paused = true))]
    async fn recycling_a_lease_twice_fails_fast() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let pool = Pool::new(PoolConfig::new(1, 1), MockConnector::immediate());
                let lease = pool.acquire(LocalContext, 1).await.unwrap();
                assert!(lease.recycle().is_ok());
                assert!(matches!(lease.recycle(), Err(PoolError::InvalidRecycle)));
            })
            .await;
    }
}
