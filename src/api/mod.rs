pub mod auth;
mod error;
mod middleware;
mod users;
mod validation;

pub use error::ApiError;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public auth routes. optional_auth only annotates the request when a
    // valid token happens to be present; it never rejects.
    let auth_public = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/register-public", post(auth::register_public))
        .route("/verify-email", get(auth::verify_email))
        .route("/registration-enabled", get(auth::registration_enabled))
        .layer(from_fn_with_state(state.clone(), middleware::optional_auth));

    let auth_protected = Router::new()
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route(
            "/register",
            post(auth::register).layer(from_fn(middleware::require_admin)),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/role", put(users::update_role))
        .route("/:id/name", put(users::update_name))
        .route("/:id", delete(users::delete_user))
        .layer(from_fn(middleware::require_admin))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_public.merge(auth_protected))
        .nest("/api/users", user_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
