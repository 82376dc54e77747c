use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod solutions;
pub mod users;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(users::router())
        .merge(solutions::router())
        .merge(docs::router())
        .with_state(state)
}
