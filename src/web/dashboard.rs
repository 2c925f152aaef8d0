//! Dashboard handler

use axum::{extract::State, response::Html};
use chrono::Utc;
use tera::Context;

use super::middleware::{AppState, AuthenticatedUser, WebError};
use super::templates::render;

/// GET / - visible vehicles with their latest service, plus the expiries
/// that are overdue or due within the warning window
pub async fn dashboard(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    let vehicles = state.vehicle_service.list_vehicles(&user).await?;

    let mut rows = Vec::with_capacity(vehicles.len());
    for vehicle in vehicles {
        let latest = state
            .maintenance_service
            .latest_record(&user, vehicle.id)
            .await?;
        rows.push(serde_json::json!({ "vehicle": vehicle, "latest": latest }));
    }

    let today = Utc::now().date_naive();
    let attention = state.expiry_service.attention_report(&user, today).await?;

    let mut context = Context::new();
    context.insert("current_user", &user);
    context.insert("rows", &rows);
    context.insert("attention", &attention);
    render(&state.templates, "dashboard.html", &context)
}
