use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the installed store and report whether the service can answer data requests.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let Some(installed) = state.store().await else {
        warn!("storage unavailable (degraded mode)");
        return HealthResponse::degraded();
    };

    if let Err(err) = installed.store.health_check().await {
        warn!(backend = installed.backend, error = %err, "storage health check failed");
        return HealthResponse::degraded();
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok(installed.backend)
    }
}
