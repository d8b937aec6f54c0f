//! Single-flight coordination of access token refreshes.
//!
//! The coordinator is a state machine guarded by an async mutex. The lock is
//! only held to read or flip the phase and push waiters, never across network
//! I/O. Only the caller that moved `Idle -> Refreshing` settles the refresh.

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use super::errors::RefreshError;

/// New access token, or the failure every waiter observes.
pub type RefreshOutcome = Result<String, RefreshError>;

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Refreshing {
        stale: Option<String>,
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

/// Outcome of the last refresh and the token it replaced. A 401 for a request
/// that was sent with that token arrived late and must not start a new refresh.
/// After a failure, a request without any token is late as well.
#[derive(Debug)]
struct Settled {
    stale: Option<String>,
    outcome: RefreshOutcome,
}

impl Settled {
    fn covers(&self, sent_token: Option<&str>) -> bool {
        match sent_token {
            Some(sent) => self.stale.as_deref() == Some(sent),
            None => self.outcome.is_err(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    phase: Phase,
    last: Option<Settled>,
}

/// What a caller holding a 401 has to do next.
#[derive(Debug)]
pub enum Ticket {
    /// The caller moved the coordinator to `Refreshing` and must run the
    /// refresh, then call [`RefreshCoordinator::settle`].
    Start(oneshot::Receiver<RefreshOutcome>),
    /// A refresh is in flight; wait for its outcome.
    Wait(oneshot::Receiver<RefreshOutcome>),
    /// The refresh for the token this request carried already finished.
    Settled(RefreshOutcome),
}

impl Ticket {
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start(_))
    }

    pub async fn outcome(self) -> RefreshOutcome {
        match self {
            Self::Start(rx) | Self::Wait(rx) => rx.await.unwrap_or(Err(RefreshError::Abandoned)),
            Self::Settled(outcome) => outcome,
        }
    }
}

#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<State>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a 401 for a request that was sent with `sent_token`.
    pub async fn join(&self, sent_token: Option<&str>) -> Ticket {
        let mut state = self.state.lock().await;

        if let Phase::Refreshing { waiters, .. } = &mut state.phase {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            debug!("Refresh in flight, queued request ({} waiting)", waiters.len());
            return Ticket::Wait(rx);
        }

        if let Some(last) = state.last.as_ref().filter(|last| last.covers(sent_token)) {
            debug!("Refresh for this request already settled, reusing outcome");
            return Ticket::Settled(last.outcome.clone());
        }

        let (tx, rx) = oneshot::channel();
        state.phase = Phase::Refreshing {
            stale: sent_token.map(ToString::to_string),
            waiters: vec![tx],
        };
        debug!("Starting refresh");
        Ticket::Start(rx)
    }

    /// Resolve every waiter with `outcome` and return to `Idle`.
    /// Returns the number of waiters notified.
    pub async fn settle(&self, outcome: RefreshOutcome) -> usize {
        let mut state = self.state.lock().await;

        let Phase::Refreshing { stale, waiters } = std::mem::take(&mut state.phase) else {
            warn!("Refresh settled while idle");
            return 0;
        };

        let notified = waiters.len();
        for waiter in waiters {
            // receivers dropped by cancelled callers are fine
            let _ = waiter.send(outcome.clone());
        }

        state.last = Some(Settled { stale, outcome });
        notified
    }

    pub async fn is_refreshing(&self) -> bool {
        matches!(self.state.lock().await.phase, Phase::Refreshing { .. })
    }
}
