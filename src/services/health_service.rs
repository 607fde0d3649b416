use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the session store once and report it with the degraded flag.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let reachable = match state.session_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "session store health probe failed");
                false
            }
        },
        None => {
            warn!("no session store installed (degraded mode)");
            false
        }
    };

    HealthResponse::new(state.is_degraded().await, reachable)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dao::session_store::memory::MemorySessionStore, dto::health::HealthStatus,
        state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new();
        let report = health_status(&state).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.store_reachable);

        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let report = health_status(&state).await;
        assert_eq!(report.status, HealthStatus::Ok);
        assert!(report.store_reachable);
    }
}
