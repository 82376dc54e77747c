/// Atomic recording of puzzle attempts.
pub mod attempt_recorder;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Puzzle selection with journal recycling.
pub mod matchmaking;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Rating, puzzle and history operations exposed over HTTP.
pub mod user_service;

#[cfg(test)]
pub(crate) mod test_support;
