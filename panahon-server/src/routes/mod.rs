pub mod v1;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the full application router, mounted under the configured base path.
pub fn create_app(state: AppState) -> Router {
    let api = v1::create_v1_router(&state);
    let base_path = state.config.server.api_base_path.as_str();

    let router = if base_path == "/" {
        Router::new().merge(api)
    } else {
        Router::new().nest(base_path, api)
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
