//! Web layer - HTML pages and routing
//!
//! This module contains the browser-facing half of the Paddock fleet system:
//! - Login/logout and the forced password change flow
//! - Dashboard with per-vehicle service summary and due expiries
//! - Vehicle pages (CRUD, photos, registration document)
//! - Maintenance records and expiries on the vehicle detail page
//! - Admin account management
//! - Uploaded file serving

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod middleware;
pub mod templates;
pub mod uploads;
pub mod vehicles;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};

pub use middleware::{AppState, AuthenticatedUser, WebError};
pub use templates::build_templates;
pub use uploads::ensure_upload_dirs;

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .route("/admin/users", get(admin::users_page).post(admin::user_create))
        .route("/admin/users/new", get(admin::user_new_page))
        .route("/admin/users/{id}", post(admin::user_update))
        .route("/admin/users/{id}/edit", get(admin::user_edit_page))
        .route("/admin/users/{id}/delete", post(admin::user_delete))
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need a valid session)
    let protected_routes = Router::new()
        .route("/", get(dashboard::dashboard))
        .route("/password", get(auth::password_page).post(auth::password_submit))
        .route("/logout", post(auth::logout))
        .route("/profile/image", post(auth::profile_image_submit))
        .route("/vehicles", post(vehicles::vehicle_create))
        .route("/vehicles/new", get(vehicles::vehicle_new_page))
        .route(
            "/vehicles/{id}",
            get(vehicles::vehicle_detail).post(vehicles::vehicle_update),
        )
        .route("/vehicles/{id}/edit", get(vehicles::vehicle_edit_page))
        .route("/vehicles/{id}/delete", post(vehicles::vehicle_delete))
        .route("/vehicles/{id}/maintenance", post(vehicles::maintenance_create))
        .route("/vehicles/{id}/expiries", post(vehicles::expiry_create))
        .route("/maintenance/{id}/delete", post(vehicles::maintenance_delete))
        .route("/expiries/{id}/delete", post(vehicles::expiry_delete))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // A vehicle submission can carry several photos plus the document, so
    // the request cap is a multiple of the per-file limit
    let body_limit = (state.config.uploads.max_file_size as usize).saturating_mul(4);

    Router::new()
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .nest_service("/uploads", ServeDir::new(&state.config.uploads.path))
        .merge(admin_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
