//! Vehicle pages: CRUD, service history and expiries
//!
//! The create and edit forms are multipart (photos and the registration
//! document ride along with the text fields). Validation failures re-render
//! the form with an error banner and the values the user typed; the inline
//! maintenance and expiry forms re-render the detail page instead.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tera::Context;

use crate::models::{
    Checklist, CreateExpiryInput, CreateMaintenanceInput, CreateVehicleInput, ExpiryFilter,
    UpdateVehicleInput, User, Vehicle,
};
use crate::services::VehicleServiceError;

use super::middleware::{AppState, AuthenticatedUser, WebError};
use super::templates::render;
use super::uploads::{store_file, DOCUMENTS_DIR, PHOTOS_DIR};

/// Text fields and buffered files from a vehicle form submission
#[derive(Debug, Default)]
struct VehicleFormData {
    owner_id: Option<i64>,
    plate: String,
    make: String,
    model: String,
    year: String,
    odometer: String,
    photos: Vec<(String, Bytes)>,
    document: Option<(String, Bytes)>,
}

impl VehicleFormData {
    /// The text fields as template values, for re-rendering on error
    fn form_values(&self, fallback_owner: i64) -> serde_json::Value {
        serde_json::json!({
            "owner_id": self.owner_id.unwrap_or(fallback_owner),
            "plate": self.plate,
            "make": self.make,
            "model": self.model,
            "year": self.year,
            "odometer": self.odometer,
        })
    }

    /// Prefilled values for the edit form
    fn from_vehicle(vehicle: &Vehicle) -> serde_json::Value {
        serde_json::json!({
            "owner_id": vehicle.owner_id,
            "plate": vehicle.plate,
            "make": vehicle.make,
            "model": vehicle.model,
            "year": vehicle.year.map(|y| y.to_string()).unwrap_or_default(),
            "odometer": vehicle.odometer.to_string(),
        })
    }
}

/// Read a whole vehicle form, buffering file parts
///
/// Only stream-level failures error out here; field validation happens
/// afterwards so the form can be re-rendered.
async fn collect_vehicle_form(multipart: &mut Multipart) -> Result<VehicleFormData, WebError> {
    let mut form = VehicleFormData::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read multipart: {}", e))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "owner_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read field: {}", e))?;
                form.owner_id = text.trim().parse().ok();
            }
            "plate" | "make" | "model" | "year" | "odometer" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read field: {}", e))?;
                let text = text.trim().to_string();
                match name.as_str() {
                    "plate" => form.plate = text,
                    "make" => form.make = text,
                    "model" => form.model = text,
                    "year" => form.year = text,
                    _ => form.odometer = text,
                }
            }
            "photos" | "document" => {
                // Browsers send one empty part when no file was chosen
                if field.file_name().map_or(true, |f| f.is_empty()) {
                    continue;
                }
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read upload: {}", e))?;
                if name == "photos" {
                    form.photos.push((content_type, data));
                } else {
                    form.document = Some((content_type, data));
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Validate the buffered files and numeric fields; `Err` carries the
/// message for the error banner.
fn validate_vehicle_form(
    state: &AppState,
    form: &VehicleFormData,
) -> Result<(Option<i32>, i64), String> {
    let uploads = &state.config.uploads;
    for (content_type, data) in &form.photos {
        if !uploads.is_image_allowed(content_type) {
            return Err(format!("Unsupported photo type: {}", content_type));
        }
        if data.len() as u64 > uploads.max_file_size {
            return Err(format!(
                "Photo too large (maximum {} MB)",
                uploads.max_file_size / 1024 / 1024
            ));
        }
    }
    if let Some((content_type, data)) = &form.document {
        if !uploads.is_document_allowed(content_type) {
            return Err(format!("Unsupported document type: {}", content_type));
        }
        if data.len() as u64 > uploads.max_file_size {
            return Err(format!(
                "Document too large (maximum {} MB)",
                uploads.max_file_size / 1024 / 1024
            ));
        }
    }

    let year = if form.year.is_empty() {
        None
    } else {
        Some(
            form.year
                .parse::<i32>()
                .map_err(|_| "Year must be a number".to_string())?,
        )
    };
    let odometer = form
        .odometer
        .parse::<i64>()
        .map_err(|_| "Odometer must be a number".to_string())?;

    Ok((year, odometer))
}

/// Store the buffered files and attach them to the vehicle
async fn attach_files(
    state: &AppState,
    user: &User,
    vehicle_id: i64,
    form: &VehicleFormData,
) -> Result<(), WebError> {
    if !form.photos.is_empty() {
        let mut filenames = Vec::with_capacity(form.photos.len());
        for (content_type, data) in &form.photos {
            filenames.push(store_file(&state.config.uploads, PHOTOS_DIR, content_type, data).await?);
        }
        state
            .vehicle_service
            .add_photos(user, vehicle_id, filenames)
            .await?;
    }

    if let Some((content_type, data)) = &form.document {
        let filename =
            store_file(&state.config.uploads, DOCUMENTS_DIR, content_type, data).await?;
        state
            .vehicle_service
            .set_document(user, vehicle_id, Some(filename))
            .await?;
    }

    Ok(())
}

async fn render_new_form(
    state: &AppState,
    user: &User,
    form_values: serde_json::Value,
    error: Option<&str>,
) -> Result<Html<String>, WebError> {
    let owners = if user.is_admin() {
        Some(state.user_service.list_users().await?)
    } else {
        None
    };

    let mut context = Context::new();
    context.insert("current_user", user);
    context.insert("owners", &owners);
    context.insert("form", &form_values);
    context.insert("error", &error);
    render(&state.templates, "vehicle_new.html", &context)
}

/// GET /vehicles/new
pub async fn vehicle_new_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    let empty = VehicleFormData::default().form_values(user.id);
    render_new_form(&state, &user, empty, None).await
}

/// POST /vehicles
pub async fn vehicle_create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Response, WebError> {
    let form = collect_vehicle_form(&mut multipart).await?;

    let (year, odometer) = match validate_vehicle_form(&state, &form) {
        Ok(parsed) => parsed,
        Err(message) => {
            let values = form.form_values(user.id);
            return Ok(render_new_form(&state, &user, values, Some(&message))
                .await?
                .into_response());
        }
    };

    // Members always register vehicles for themselves
    let owner_id = if user.is_admin() {
        form.owner_id.unwrap_or(user.id)
    } else {
        user.id
    };

    let input = CreateVehicleInput {
        owner_id,
        plate: form.plate.clone(),
        make: form.make.clone(),
        model: form.model.clone(),
        year,
        odometer,
    };

    match state.vehicle_service.create_vehicle(&user, input).await {
        Ok(vehicle) => {
            attach_files(&state, &user, vehicle.id, &form).await?;
            tracing::info!(plate = %vehicle.plate, "Vehicle registered");
            Ok(Redirect::to(&format!("/vehicles/{}", vehicle.id)).into_response())
        }
        Err(
            e @ (VehicleServiceError::ValidationError(_) | VehicleServiceError::PlateExists(_)),
        ) => {
            let message = match e {
                VehicleServiceError::ValidationError(m) => m,
                VehicleServiceError::PlateExists(plate) => {
                    format!("A vehicle with plate {} already exists", plate)
                }
                _ => unreachable!(),
            };
            let values = form.form_values(user.id);
            Ok(render_new_form(&state, &user, values, Some(&message))
                .await?
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    expiries: Option<String>,
}

async fn render_detail(
    state: &AppState,
    user: &User,
    vehicle_id: i64,
    filter: ExpiryFilter,
    error: Option<&str>,
) -> Result<Html<String>, WebError> {
    let vehicle = state.vehicle_service.get_vehicle(user, vehicle_id).await?;
    let today = Utc::now().date_naive();

    let expiries = state
        .expiry_service
        .list_expiries(user, vehicle_id, filter, today)
        .await?;
    let expiry_rows: Vec<serde_json::Value> = expiries
        .iter()
        .map(|e| {
            serde_json::json!({
                "id": e.id,
                "kind": e.kind,
                "due_on": e.due_on,
                "status": e.status_on(today),
            })
        })
        .collect();

    let records = state
        .maintenance_service
        .list_records(user, vehicle_id)
        .await?;
    let record_rows: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            let done: Vec<serde_json::Value> = r
                .checklist
                .items()
                .iter()
                .filter(|(_, item)| item.done)
                .map(|(label, item)| {
                    serde_json::json!({
                        "label": label,
                        "code": item.code,
                        "brand": item.brand,
                    })
                })
                .collect();
            serde_json::json!({
                "id": r.id,
                "performed_on": r.performed_on,
                "odometer": r.odometer,
                "notes": r.notes,
                "oil_grade": r.checklist.oil_grade,
                "done": done,
            })
        })
        .collect();

    let checklist_fields: Vec<serde_json::Value> = Checklist::FIELDS
        .iter()
        .map(|(key, label)| serde_json::json!({ "key": key, "label": label }))
        .collect();

    let mut context = Context::new();
    context.insert("current_user", user);
    context.insert("vehicle", &vehicle);
    context.insert("expiries", &expiry_rows);
    context.insert("filter", &filter.to_string());
    context.insert("records", &record_rows);
    context.insert("checklist_fields", &checklist_fields);
    context.insert("error", &error);
    render(&state.templates, "vehicle_detail.html", &context)
}

/// GET /vehicles/{id}
pub async fn vehicle_detail(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<DetailQuery>,
) -> Result<Html<String>, WebError> {
    let filter = query
        .expiries
        .as_deref()
        .map(|s| ExpiryFilter::from_str(s).unwrap_or_default())
        .unwrap_or_default();
    render_detail(&state, &user, id, filter, None).await
}

async fn render_edit_form(
    state: &AppState,
    user: &User,
    vehicle: &Vehicle,
    form_values: serde_json::Value,
    error: Option<&str>,
) -> Result<Html<String>, WebError> {
    let mut context = Context::new();
    context.insert("current_user", user);
    context.insert("vehicle", vehicle);
    context.insert("form", &form_values);
    context.insert("error", &error);
    render(&state.templates, "vehicle_edit.html", &context)
}

/// GET /vehicles/{id}/edit
pub async fn vehicle_edit_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Html<String>, WebError> {
    let vehicle = state.vehicle_service.get_vehicle(&user, id).await?;
    let values = VehicleFormData::from_vehicle(&vehicle);
    render_edit_form(&state, &user, &vehicle, values, None).await
}

/// POST /vehicles/{id}
pub async fn vehicle_update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Response, WebError> {
    let vehicle = state.vehicle_service.get_vehicle(&user, id).await?;
    let form = collect_vehicle_form(&mut multipart).await?;

    let (year, odometer) = match validate_vehicle_form(&state, &form) {
        Ok(parsed) => parsed,
        Err(message) => {
            let values = form.form_values(vehicle.owner_id);
            return Ok(
                render_edit_form(&state, &user, &vehicle, values, Some(&message))
                    .await?
                    .into_response(),
            );
        }
    };

    let input = UpdateVehicleInput {
        plate: Some(form.plate.clone()),
        make: Some(form.make.clone()),
        model: Some(form.model.clone()),
        year: Some(year),
        odometer: Some(odometer),
    };

    match state.vehicle_service.update_vehicle(&user, id, input).await {
        Ok(updated) => {
            attach_files(&state, &user, updated.id, &form).await?;
            Ok(Redirect::to(&format!("/vehicles/{}", updated.id)).into_response())
        }
        Err(
            e @ (VehicleServiceError::ValidationError(_) | VehicleServiceError::PlateExists(_)),
        ) => {
            let message = match e {
                VehicleServiceError::ValidationError(m) => m,
                VehicleServiceError::PlateExists(plate) => {
                    format!("A vehicle with plate {} already exists", plate)
                }
                _ => unreachable!(),
            };
            let values = form.form_values(vehicle.owner_id);
            Ok(
                render_edit_form(&state, &user, &vehicle, values, Some(&message))
                    .await?
                    .into_response(),
            )
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /vehicles/{id}/delete
pub async fn vehicle_delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    state.vehicle_service.delete_vehicle(&user, id).await?;
    tracing::info!(vehicle_id = id, "Vehicle deleted");
    Ok(Redirect::to("/").into_response())
}

/// POST /vehicles/{id}/maintenance - add a service record
///
/// The checklist arrives as one checkbox plus two text inputs per part;
/// only ticked parts matter but codes and brands are kept either way.
pub async fn maintenance_create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, WebError> {
    let performed_on = match form
        .get("performed_on")
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    {
        Some(date) => date,
        None => {
            return Ok(
                render_detail(&state, &user, id, ExpiryFilter::All, Some("Invalid service date"))
                    .await?
                    .into_response(),
            )
        }
    };
    let odometer = match form.get("odometer").and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(km) => km,
        None => {
            return Ok(render_detail(
                &state,
                &user,
                id,
                ExpiryFilter::All,
                Some("Odometer must be a number"),
            )
            .await?
            .into_response())
        }
    };

    let mut checklist = Checklist::default();
    for (key, _) in Checklist::FIELDS {
        if let Some(item) = checklist.item_mut(key) {
            item.done = form.get(key).is_some_and(|v| !v.is_empty());
            if let Some(code) = form.get(&format!("code_{}", key)) {
                item.code = code.trim().to_string();
            }
            if let Some(brand) = form.get(&format!("brand_{}", key)) {
                item.brand = brand.trim().to_string();
            }
        }
    }
    checklist.oil_grade = form
        .get("oil_grade")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let notes = form
        .get("notes")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let input = CreateMaintenanceInput {
        performed_on,
        odometer,
        checklist,
        notes,
    };
    match state.maintenance_service.add_record(&user, id, input).await {
        Ok(_) => Ok(Redirect::to(&format!("/vehicles/{}", id)).into_response()),
        Err(crate::services::MaintenanceServiceError::ValidationError(message)) => Ok(
            render_detail(&state, &user, id, ExpiryFilter::All, Some(&message))
                .await?
                .into_response(),
        ),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    vehicle_id: Option<i64>,
}

/// POST /maintenance/{id}/delete
pub async fn maintenance_delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Form(form): Form<DeleteForm>,
) -> Result<Response, WebError> {
    state.maintenance_service.delete_record(&user, id).await?;
    let target = match form.vehicle_id {
        Some(vehicle_id) => format!("/vehicles/{}", vehicle_id),
        None => "/".to_string(),
    };
    Ok(Redirect::to(&target).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ExpiryForm {
    kind: String,
    due_on: String,
}

/// POST /vehicles/{id}/expiries - add an expiry
pub async fn expiry_create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Form(form): Form<ExpiryForm>,
) -> Result<Response, WebError> {
    let due_on = match NaiveDate::parse_from_str(form.due_on.trim(), "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            return Ok(
                render_detail(&state, &user, id, ExpiryFilter::All, Some("Invalid due date"))
                    .await?
                    .into_response(),
            )
        }
    };

    let input = CreateExpiryInput {
        kind: form.kind,
        due_on,
    };
    match state.expiry_service.add_expiry(&user, id, input).await {
        Ok(_) => Ok(Redirect::to(&format!("/vehicles/{}", id)).into_response()),
        Err(crate::services::ExpiryServiceError::ValidationError(message)) => Ok(
            render_detail(&state, &user, id, ExpiryFilter::All, Some(&message))
                .await?
                .into_response(),
        ),
        Err(e) => Err(e.into()),
    }
}

/// POST /expiries/{id}/delete
pub async fn expiry_delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Form(form): Form<DeleteForm>,
) -> Result<Response, WebError> {
    state.expiry_service.delete_expiry(&user, id).await?;
    let target = match form.vehicle_id {
        Some(vehicle_id) => format!("/vehicles/{}", vehicle_id),
        None => "/".to_string(),
    };
    Ok(Redirect::to(&target).into_response())
}
