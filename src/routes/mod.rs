use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

mod cache;
mod evaluate;
mod flags;
mod health;
mod middleware_auth;

pub use health::health;

use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    let read_router = Router::new()
        .route("/flags", get(flags::routes::list))
        .route("/flags/{name}", get(flags::routes::get))
        .route("/evaluate", post(evaluate::routes::evaluate_all))
        .route("/evaluate/{name}", get(evaluate::routes::evaluate_one))
        .route("/cache/status", get(cache::status));

    let write_router = Router::new()
        .route("/flags", post(flags::routes::create))
        .route(
            "/flags/{name}",
            put(flags::routes::update).delete(flags::routes::delete),
        )
        .route("/flags/{name}/toggle", post(flags::routes::toggle))
        .route("/cache/invalidate", post(cache::invalidate))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_auth::require_api_key,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(read_router)
        .merge(write_router)
        .with_state(state)
}

async fn root() -> &'static str {
    "Feature flag evaluation service"
}
