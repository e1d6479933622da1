//! A generic, reactive connection pool.
//!
//! The pool core knows nothing about what a "connection" is or how it is
//! opened; that is entirely the [`Connector`]'s job. The pool only tracks
//! slots (one per connection, or per in-flight connect attempt), a FIFO
//! queue of waiters, and a weight/size admission budget, and hands out
//! [`Lease`]s that callers recycle when done.

mod arena;
pub(crate) mod connector;
pub(crate) mod context;
pub(crate) mod error;
pub(crate) mod lease;
pub(crate) mod metrics;
pub(crate) mod pool;
pub(crate) mod selector;
pub(crate) mod slot;
pub(crate) mod waiter;

#[cfg(test)]
pub(crate) mod test_support;

pub use connector::{Connected, Connector, ConnectorListener, SlotView};
pub use context::{LocalContext, PoolContext};
pub use error::PoolError;
pub use lease::Lease;
pub use metrics::{MetricVariant, PoolMetrics, VariantArray};
pub use pool::{Acquiring, ClosedSlot, Pool, PoolConfig};
pub use selector::{DefaultSelector, Selector};
pub use waiter::WaiterListener;
