use serde::Serialize;
use utoipa::ToSchema;

/// Coarse availability reported by `/healthcheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Store installed and reachable.
    Ok,
    /// Actions will be refused until the store is back.
    Degraded,
}

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall availability.
    pub status: HealthStatus,
    /// Whether the session store answered the probe made for this request.
    pub store_reachable: bool,
}

impl HealthResponse {
    /// Build the payload from the degraded flag and the probe outcome.
    pub fn new(degraded: bool, store_reachable: bool) -> Self {
        let status = if degraded || !store_reachable {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };
        Self {
            status,
            store_reachable,
        }
    }
}
