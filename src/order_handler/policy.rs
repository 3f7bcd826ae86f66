//! Delivery policies for the completion leg.
//!
//! Both default to the plain at-least-once device: one publish attempt,
//! and every redelivered order is completed again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::watch;

/// How many times to try publishing a completion, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. `1` disables retry.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Doubling backoff starting at `initial_backoff`, capped at `max_backoff`.
    pub fn exponential(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the `failed_attempt`-th failure (1-based).
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// What to do when an order with an already-seen token is delivered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Complete it again. At-least-once delivery means the dispatcher may see
    /// the same token twice.
    #[default]
    Republish,
    /// Remember the last `capacity` tokens and skip the publish for repeats.
    Suppress { capacity: usize },
}

impl DuplicatePolicy {
    pub(crate) fn ledger(&self) -> Option<TokenLedger> {
        match *self {
            DuplicatePolicy::Republish => None,
            DuplicatePolicy::Suppress { capacity } => Some(TokenLedger::new(capacity)),
        }
    }
}

/// Result of [`TokenLedger::claim`].
#[derive(Debug)]
pub enum Claim<'a> {
    /// The caller owns the token and must process the order.
    Granted(ClaimGuard<'a>),
    /// A completion for this token has already been published.
    Completed,
    /// Another delivery of the token is still being processed. The receiver's
    /// `changed()` returns once that delivery either completes or gives up;
    /// claim again then.
    InFlight(watch::Receiver<()>),
}

/// Ownership of a granted token.
///
/// [`ClaimGuard::complete`] marks the token done. Dropping the guard without
/// completing releases the token so a redelivery can process it.
#[derive(Debug)]
pub struct ClaimGuard<'a> {
    ledger: &'a TokenLedger,
    token: String,
    completed: bool,
}

impl ClaimGuard<'_> {
    pub fn complete(mut self) {
        self.completed = true;
        self.ledger.mark_completed(&self.token);
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.ledger.release(&self.token);
        }
    }
}

#[derive(Debug)]
enum TokenState {
    // Waiters hold receivers; dropping the sender wakes them.
    InFlight(watch::Sender<()>),
    Completed,
}

/// Bounded FIFO map of tokens that are in flight or already completed.
#[derive(Debug)]
pub struct TokenLedger {
    capacity: usize,
    inner: Mutex<LedgerInner>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    states: HashMap<String, TokenState>,
    order: VecDeque<String>,
}

impl TokenLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    pub fn claim(&self, token: &str) -> Claim<'_> {
        let mut inner = self.inner.lock();
        match inner.states.get(token) {
            Some(TokenState::Completed) => return Claim::Completed,
            Some(TokenState::InFlight(sender)) => return Claim::InFlight(sender.subscribe()),
            None => {}
        }

        let (sender, _) = watch::channel(());
        inner.states.insert(token.to_string(), TokenState::InFlight(sender));
        inner.order.push_back(token.to_string());
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.states.remove(&evicted);
            }
        }

        Claim::Granted(ClaimGuard {
            ledger: self,
            token: token.to_string(),
            completed: false,
        })
    }

    fn mark_completed(&self, token: &str) {
        if let Some(state) = self.inner.lock().states.get_mut(token) {
            *state = TokenState::Completed;
        }
    }

    /// Forgets `token` so a later redelivery is processed again.
    fn release(&self, token: &str) {
        let mut inner = self.inner.lock();
        if inner.states.remove(token).is_some() {
            inner.order.retain(|t| t != token);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_default_policy_is_single_attempt() {
        assert_eq!(RetryPolicy::default().attempts(), 1);
        let zero = RetryPolicy { max_attempts: 0, ..RetryPolicy::none() };
        assert_eq!(zero.attempts(), 1);
        assert!(DuplicatePolicy::default().ledger().is_none());
    }

    fn granted(claim: Claim<'_>) -> ClaimGuard<'_> {
        match claim {
            Claim::Granted(guard) => guard,
            other => panic!("expected a grant, got {other:?}"),
        }
    }

    #[test]
    fn test_ledger_evicts_oldest() {
        let ledger = TokenLedger::new(2);
        granted(ledger.claim("a")).complete();
        assert!(matches!(ledger.claim("a"), Claim::Completed));
        granted(ledger.claim("b")).complete();
        granted(ledger.claim("c")).complete();
        assert_eq!(ledger.len(), 2);
        // "a" fell out of the window
        granted(ledger.claim("a")).complete();
    }

    #[test]
    fn test_dropped_claim_releases_token() {
        let ledger = TokenLedger::new(8);
        let guard = granted(ledger.claim("t"));
        drop(guard);
        assert!(ledger.is_empty());
        granted(ledger.claim("t")).complete();
    }

    #[tokio::test]
    async fn test_in_flight_claim_waits_for_owner() {
        let ledger = TokenLedger::new(8);
        let guard = granted(ledger.claim("t"));

        let mut waiter = match ledger.claim("t") {
            Claim::InFlight(rx) => rx,
            other => panic!("expected in flight, got {other:?}"),
        };
        drop(guard);
        assert!(waiter.changed().await.is_err());
        granted(ledger.claim("t")).complete();

        let guard = granted(ledger.claim("u"));
        let mut waiter = match ledger.claim("u") {
            Claim::InFlight(rx) => rx,
            other => panic!("expected in flight, got {other:?}"),
        };
        guard.complete();
        assert!(waiter.changed().await.is_err());
        assert!(matches!(ledger.claim("u"), Claim::Completed));
    }
}
