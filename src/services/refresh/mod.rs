use crate::domain::token::AccessToken;
use crate::error::RefreshFailure;
use crate::services::notifier::FailureNotifier;
use crate::storage::token_store::TokenStore;
use futures::FutureExt;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::Instrument;

pub mod provider;

use provider::TokenRefresher;

type RefreshOutcome = Result<AccessToken, RefreshFailure>;

#[derive(Clone, Debug)]
struct Metrics {
    attempts_total: Counter<u64>,
    outcomes_total: Counter<u64>,
    joined_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("pantry-client");
        Self {
            attempts_total: meter
                .u64_counter("token_refresh_attempts_total")
                .with_description("Total refresh calls issued to the API")
                .build(),
            outcomes_total: meter
                .u64_counter("token_refresh_outcomes_total")
                .with_description("Settled refresh calls by outcome")
                .build(),
            joined_total: meter
                .u64_counter("token_refresh_joined_total")
                .with_description("Callers that waited on an already in-flight refresh")
                .build(),
        }
    }
}

/// Whether a successful refresh should be announced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Silent,
    Announced,
}

/// A caller waiting for the in-flight refresh to settle.
#[derive(Debug)]
struct PendingRequest {
    tx: oneshot::Sender<RefreshOutcome>,
}

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: bool,
    /// Set when any caller of the in-flight refresh asked for a confirmation.
    announce: bool,
    queue: Vec<PendingRequest>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<RefreshState>,
    refresher: Arc<dyn TokenRefresher>,
    token_store: TokenStore,
    notifier: FailureNotifier,
    metrics: Metrics,
}

/// Guarantees at most one refresh call in flight and fans its outcome out to
/// every caller that arrived while it was running.
#[derive(Clone, Debug)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(refresher: Arc<dyn TokenRefresher>, token_store: TokenStore, notifier: FailureNotifier) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::default()),
                refresher,
                token_store,
                notifier,
                metrics: Metrics::new(),
            }),
        }
    }

    /// Waits for a fresh access token, starting a refresh only if none is running.
    ///
    /// # Errors
    /// Returns the shared `RefreshFailure` of the refresh this call joined.
    pub async fn refresh(&self, mode: RefreshMode) -> Result<AccessToken, RefreshFailure> {
        let (tx, rx) = oneshot::channel();

        let leader = {
            let mut state = self.inner.lock_state();
            state.queue.push(PendingRequest { tx });
            state.announce |= mode == RefreshMode::Announced;
            !std::mem::replace(&mut state.in_flight, true)
        };

        if leader {
            // The refresh runs on its own task so a caller dropping its future
            // cannot strand the queue.
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run().await }.instrument(tracing::info_span!("token_refresh")));
        } else {
            tracing::debug!("Joining in-flight token refresh");
            self.inner.metrics.joined_total.add(1, &[]);
        }

        rx.await.unwrap_or(Err(RefreshFailure::Abandoned))
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_state().in_flight
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.inner.lock_state().queue.len()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self) {
        self.metrics.attempts_total.add(1, &[]);

        let outcome = AssertUnwindSafe(self.refresher.refresh())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::error!("Token refresher panicked");
                Err(RefreshFailure::Abandoned)
            });

        match &outcome {
            Ok(token) => {
                tracing::info!("Access token refreshed");
                self.metrics.outcomes_total.add(1, &[KeyValue::new("outcome", "success")]);
                self.token_store.save(token.clone()).await;
            }
            Err(failure) => {
                tracing::warn!(error = %failure, "Access token refresh failed");
                self.metrics.outcomes_total.add(1, &[KeyValue::new("outcome", "failure")]);
                self.notifier.refresh_failed(failure).await;
            }
        }

        let (waiters, announce) = {
            let mut state = self.lock_state();
            state.in_flight = false;
            (std::mem::take(&mut state.queue), std::mem::take(&mut state.announce))
        };

        if outcome.is_ok() {
            self.notifier.refresh_succeeded(!announce);
        }

        tracing::debug!(waiters = waiters.len(), "Settling refresh waiters");
        for waiter in waiters {
            // A receiver may be gone if its caller was cancelled.
            let _ = waiter.tx.send(outcome.clone());
        }
    }
}
