/// Error surface of the pool: the three logical failure kinds from the pool
/// itself, plus whatever cause the connector reports verbatim.
#[derive(thiserror::Error, Debug)]
pub enum PoolError<E> {
    /// The pool has been closed; no further operations are accepted.
    #[error("pool is closed")]
    PoolClosed,
    /// The waiter queue is full and no slot can absorb the request.
    #[error("pool is too busy (waiter queue is full)")]
    PoolTooBusy,
    /// A lease was recycled twice. This is a programming error in the
    /// caller; it never corrupts pool state.
    #[error("lease was already recycled")]
    InvalidRecycle,
    /// The connector failed to open a connection.
    #[error("connect failed: {0}")]
    Connect(#[source] E),
}

impl<E> PoolError<E> {
    pub fn is_closed(&self) -> bool {
        matches!(self, PoolError::PoolClosed)
    }
}

impl<E> PoolError<E> {
    /// The discriminant as a string, independent of whether `E` itself is
    /// `Display`able — handy for assertions in tests.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::PoolClosed => "PoolClosed",
            PoolError::PoolTooBusy => "PoolTooBusy",
            PoolError::InvalidRecycle => "InvalidRecycle",
            PoolError::Connect(_) => "Connect",
        }
    }
}
