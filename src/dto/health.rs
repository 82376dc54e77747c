use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Backend currently serving the catalog ("memory" or "mongodb"), absent while degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl HealthResponse {
    /// The puzzle store is reachable.
    pub fn ok(storage: &str) -> Self {
        Self {
            status: "ok".to_string(),
            storage: Some(storage.to_string()),
        }
    }

    /// The puzzle store is unreachable or not yet connected.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
            storage: None,
        }
    }
}
