//! HTTP API for the remote store.
//!
//! All data routes live under `/api/v1/owners/{owner}`; `/api/v1/health` is
//! always open.

mod handlers;
mod middleware;

pub use middleware::{RateLimiter, SecurityConfig, DEFAULT_RATE_LIMIT};

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::Database;

/// Router with security disabled, for local use and tests.
pub fn create_router(db: Database) -> Router {
    create_router_with_config(db, SecurityConfig::disabled())
}

pub fn create_router_with_config(db: Database, config: SecurityConfig) -> Router {
    let mut owner_routes = Router::new()
        .route(
            "/snapshot",
            get(handlers::get_snapshot).put(handlers::replace_snapshot),
        )
        .route(
            "/days/{date}",
            get(handlers::get_day)
                .put(handlers::put_day)
                .post(handlers::create_day),
        )
        .route("/entries", post(handlers::create_entry))
        .route("/entries/{id}", delete(handlers::delete_entry))
        .route("/notes", put(handlers::upsert_note))
        .route_layer(from_fn_with_state(
            config.clone(),
            middleware::auth_middleware,
        ));

    if let Some(limiter) = config.rate_limiter.clone() {
        owner_routes =
            owner_routes.route_layer(from_fn_with_state(limiter, middleware::rate_limit_middleware));
    }

    let api = Router::new()
        .nest("/owners/{owner}", owner_routes)
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config)),
        )
        .with_state(db)
}

fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", o);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}
