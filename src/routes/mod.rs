pub mod public;
pub mod trips;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .nest("/trips", trips::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
