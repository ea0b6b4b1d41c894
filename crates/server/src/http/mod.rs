use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{DeploymentImpl, routes};

mod auth;

pub fn router(deployment: DeploymentImpl) -> Router {
    let protected_routes = Router::new()
        .merge(routes::auth::router())
        .merge(routes::sessions::router(&deployment))
        .merge(routes::chat::router())
        .merge(routes::functions::router())
        .layer(from_fn_with_state(deployment.clone(), auth::require_auth));

    let api_routes = Router::new()
        .route("/", get(routes::health::api_info))
        .merge(routes::auth::public_router(&deployment))
        .merge(protected_routes);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(deployment)
}
