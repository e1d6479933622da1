//! A scriptable [`Connector`] used by this crate's own tests. Not part of
//! the public API.

use crate::connector::{Connected, Connector, ConnectorListener};
use crate::context::LocalContext;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

/// The cause reported by a scripted failure.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("{0}")]
pub(crate) struct MockError(pub &'static str);

/// One scripted result for the next `connect` call.
#[derive(Debug, Clone)]
pub(crate) enum MockOutcome {
    Connect { max_capacity: usize, weight: usize },
    Fail(&'static str),
}

/// A [`Connector`] whose outcomes are scripted ahead of time rather than
/// driven by a real transport. Calls beyond the scripted queue repeat the
/// configured default outcome, so a test that doesn't care about the
/// exact sequence can just set a default and move on.
pub(crate) struct MockConnector {
    outcomes: RefCell<VecDeque<MockOutcome>>,
    default: MockOutcome,
    delay: Option<Duration>,
    next_conn_id: Cell<u64>,
    connects_started: Cell<usize>,
}

impl MockConnector {
    pub fn new(default: MockOutcome) -> Self {
        Self {
            outcomes: RefCell::new(VecDeque::new()),
            default,
            delay: None,
            next_conn_id: Cell::new(0),
            connects_started: Cell::new(0),
        }
    }

    /// Every connect attempt succeeds immediately with capacity 1, weight 1.
    pub fn immediate() -> Self {
        Self::new(MockOutcome::Connect { max_capacity: 1, weight: 1 })
    }

    /// Every connect attempt succeeds immediately with the given
    /// multiplexing capacity and pool weight.
    pub fn with_capacity(max_capacity: usize, weight: usize) -> Self {
        Self::new(MockOutcome::Connect { max_capacity, weight })
    }

    /// Every connect attempt fails immediately with `cause`.
    pub fn failing(cause: &'static str) -> Self {
        Self::new(MockOutcome::Fail(cause))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one outcome ahead of the default, consumed on the next call.
    pub fn push(&self, outcome: MockOutcome) {
        self.outcomes.borrow_mut().push_back(outcome);
    }

    pub fn connects_started(&self) -> usize {
        self.connects_started.get()
    }
}

impl Connector for MockConnector {
    type Conn = u64;
    type Context = LocalContext;
    type Error = MockError;

    fn connect(
        &self,
        _ctx: &Self::Context,
        _listener: ConnectorListener<Self>,
    ) -> impl std::future::Future<Output = Result<Connected<Self::Conn>, Self::Error>> + 'static
    where
        Self: Sized,
    {
        self.connects_started.set(self.connects_started.get() + 1);
        let outcome = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        // Assigned now, synchronously, rather than inside the returned
        // future: the future outlives this `&self` borrow, but the
        // counter does not need to.
        let conn_id = match &outcome {
            MockOutcome::Connect { .. } => {
                let id = self.next_conn_id.get();
                self.next_conn_id.set(id + 1);
                Some(id)
            }
            MockOutcome::Fail(_) => None,
        };
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match outcome {
                MockOutcome::Connect { max_capacity, weight } => Ok(Connected {
                    connection: conn_id.expect("id assigned for a Connect outcome"),
                    max_capacity,
                    weight,
                }),
                MockOutcome::Fail(cause) => Err(MockError(cause)),
            }
        }
    }
}
