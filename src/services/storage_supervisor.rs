use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Exponential delay doubling up to a ceiling.
#[derive(Debug, Clone)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: INITIAL_DELAY,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_DELAY);
        delay
    }

    fn reset(&mut self) {
        self.next = INITIAL_DELAY;
    }
}

/// Keep a session store installed in the shared state, entering degraded mode
/// while it is unreachable.
///
/// `backend` only labels log events.
pub async fn run<F, Fut>(state: SharedState, backend: &'static str, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::new();

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                let delay = backoff.next_delay();
                warn!(
                    backend,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "session store connection attempt failed"
                );
                sleep(delay).await;
                continue;
            }
        };

        state.set_session_store(store.clone()).await;
        info!(backend, "session store connected; leaving degraded mode");
        backoff.reset();

        watch_health(&state, store.as_ref(), backend).await;

        warn!(
            backend,
            "exhausted session store reconnect attempts; reconnecting from scratch"
        );
        state.clear_session_store().await;
        sleep(backoff.next_delay()).await;
    }
}

/// Poll the store until it fails and cannot be revived in place.
async fn watch_health(state: &SharedState, store: &dyn SessionStore, backend: &'static str) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!(backend, "session store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(backend, error = %err, "session store health check failed; entering degraded mode");
                state.update_degraded(true).await;
                if !reconnect(store, backend).await {
                    return;
                }
                state.update_degraded(false).await;
            }
        }
    }
}

async fn reconnect(store: &dyn SessionStore, backend: &'static str) -> bool {
    let mut backoff = Backoff::new();
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(backend, attempt, "session store reconnected");
                return true;
            }
            Err(err) => {
                warn!(backend, attempt, error = %err, "session store reconnect attempt failed");
                sleep(backoff.next_delay()).await;
            }
        }
    }
    false
}
