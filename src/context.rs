//! The caller's execution affinity.
//!
//! The pool itself runs single-threaded (everything is `Rc`/`RefCell`), but
//! callers may be spread across many independent cooperative tasks. A
//! [`PoolContext`] is how the pool is told "run this completion somewhere
//! that isn't my own call stack" — it is never invoked from inside a
//! mutation, only scheduled.

use std::future::Future;

/// A caller-supplied execution affinity. The pool never calls back into
/// user code synchronously from within a mutation; instead it binds the
/// waiter's `PoolContext` and dispatches the completion through it.
pub trait PoolContext: Clone + 'static {
    /// Schedule `fut` to run later, off the current call stack.
    fn spawn(&self, fut: impl Future<Output = ()> + 'static);
}

/// The default context: runs completions as a task on the local (current
/// thread) `tokio` executor. Requires a [`tokio::task::LocalSet`] to be
/// active, matching how this crate's own tests drive the pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalContext;

impl PoolContext for LocalContext {
    fn spawn(&self, fut: impl Future<Output = ()> + 'static) {
        tokio::task::spawn_local(fut);
    }
}
