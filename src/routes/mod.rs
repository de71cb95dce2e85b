use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Liveness and storage health.
pub mod health;
/// Setup and live control for moderators.
pub mod moderator;
/// Contestant actions.
pub mod play;
/// Read models for guest displays.
pub mod public;
/// Change streams.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(public::router())
        .merge(moderator::router(state.clone()))
        .merge(play::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
