use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::api_routes;
use crate::pool::Backend;

use super::AppState;

pub fn create_app<B: Backend>(state: AppState<B>) -> Router {
    Router::new()
        .merge(api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
