//! Admin pages: account management
//!
//! Everything here sits behind the admin route layer; handlers still pass
//! the acting user down so the service can enforce the superadmin rules.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use std::str::FromStr;
use tera::Context;

use crate::models::{CreateUserInput, UpdateUserInput, User, UserRole};
use crate::services::UserServiceError;

use super::middleware::{AppState, AuthenticatedUser, WebError};
use super::templates::render;
use super::uploads::{store_file, PROFILES_DIR};

/// Text fields and a buffered profile image from a user form submission
#[derive(Debug, Default)]
struct UserFormData {
    username: String,
    password: String,
    role: String,
    force_change: bool,
    profile_image: Option<(String, Bytes)>,
}

async fn collect_user_form(multipart: &mut Multipart) -> Result<UserFormData, WebError> {
    let mut form = UserFormData::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read multipart: {}", e))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "username" | "password" | "role" | "force_change" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read field: {}", e))?;
                match name.as_str() {
                    "username" => form.username = text.trim().to_string(),
                    "password" => form.password = text,
                    "role" => form.role = text.trim().to_lowercase(),
                    // Unchecked boxes are simply absent from the submission
                    _ => form.force_change = !text.is_empty(),
                }
            }
            "profile_img" => {
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
                form.profile_image = Some((content_type, data));
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Check the buffered profile image against the upload policy
fn validate_profile_image(state: &AppState, form: &UserFormData) -> Result<(), String> {
    if let Some((content_type, data)) = &form.profile_image {
        if !state.config.uploads.is_image_allowed(content_type) {
            return Err(format!("Unsupported image type: {}", content_type));
        }
        if data.len() as u64 > state.config.uploads.max_file_size {
            return Err(format!(
                "Image too large (maximum {} MB)",
                state.config.uploads.max_file_size / 1024 / 1024
            ));
        }
    }
    Ok(())
}

/// GET /admin/users
pub async fn users_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    let users = state.user_service.list_users().await?;

    let mut context = Context::new();
    context.insert("current_user", &user);
    context.insert("users", &users);
    render(&state.templates, "users.html", &context)
}

async fn render_new_form(
    state: &AppState,
    user: &User,
    form: &UserFormData,
    error: Option<&str>,
) -> Result<Html<String>, WebError> {
    let values = serde_json::json!({
        "username": form.username,
        "role": if form.role.is_empty() { "member" } else { &form.role },
    });

    let mut context = Context::new();
    context.insert("current_user", user);
    context.insert("form", &values);
    context.insert("error", &error);
    render(&state.templates, "user_new.html", &context)
}

/// GET /admin/users/new
pub async fn user_new_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    render_new_form(&state, &user, &UserFormData::default(), None).await
}

/// POST /admin/users
pub async fn user_create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Response, WebError> {
    let form = collect_user_form(&mut multipart).await?;

    if let Err(message) = validate_profile_image(&state, &form) {
        return Ok(render_new_form(&state, &user, &form, Some(&message))
            .await?
            .into_response());
    }
    let role = match UserRole::from_str(&form.role) {
        Ok(role) => role,
        Err(_) => {
            return Ok(render_new_form(&state, &user, &form, Some("Invalid role"))
                .await?
                .into_response())
        }
    };

    let input = CreateUserInput {
        username: form.username.clone(),
        password: form.password.clone(),
        role: Some(role),
    };

    match state.user_service.create_user(input).await {
        Ok(created) => {
            if let Some((content_type, data)) = &form.profile_image {
                let filename =
                    store_file(&state.config.uploads, PROFILES_DIR, content_type, data).await?;
                state
                    .user_service
                    .update_user(
                        &user,
                        created.id,
                        UpdateUserInput {
                            profile_image: Some(filename),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            tracing::info!(username = %created.username, role = %created.role, "User created");
            Ok(Redirect::to("/admin/users").into_response())
        }
        Err(
            e @ (UserServiceError::ValidationError(_) | UserServiceError::UserExists(_)),
        ) => {
            let message = e.to_string();
            Ok(render_new_form(&state, &user, &form, Some(&message))
                .await?
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn render_edit_form(
    state: &AppState,
    actor: &User,
    target: &User,
    error: Option<&str>,
) -> Result<Html<String>, WebError> {
    let mut context = Context::new();
    context.insert("current_user", actor);
    context.insert("user", target);
    context.insert("error", &error);
    render(&state.templates, "user_edit.html", &context)
}

/// GET /admin/users/{id}/edit
pub async fn user_edit_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Html<String>, WebError> {
    let target = state
        .user_service
        .get_by_id(id)
        .await?
        .ok_or(WebError::NotFound)?;
    render_edit_form(&state, &user, &target, None).await
}

/// POST /admin/users/{id}
pub async fn user_update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Response, WebError> {
    let target = state
        .user_service
        .get_by_id(id)
        .await?
        .ok_or(WebError::NotFound)?;
    let form = collect_user_form(&mut multipart).await?;

    if let Err(message) = validate_profile_image(&state, &form) {
        return Ok(render_edit_form(&state, &user, &target, Some(&message))
            .await?
            .into_response());
    }

    // The superadmin form carries no role field; leave the role untouched
    let role = if target.is_superadmin() {
        None
    } else {
        UserRole::from_str(&form.role).ok()
    };

    let profile_image = match &form.profile_image {
        Some((content_type, data)) => {
            Some(store_file(&state.config.uploads, PROFILES_DIR, content_type, data).await?)
        }
        None => None,
    };

    let input = UpdateUserInput {
        username: Some(form.username.clone()),
        password: if form.password.is_empty() {
            None
        } else {
            Some(form.password.clone())
        },
        role,
        must_change_password: Some(form.force_change),
        profile_image,
    };

    match state.user_service.update_user(&user, id, input).await {
        Ok(updated) => {
            tracing::info!(username = %updated.username, "User updated");
            Ok(Redirect::to("/admin/users").into_response())
        }
        Err(
            e @ (UserServiceError::ValidationError(_) | UserServiceError::UserExists(_)),
        ) => {
            let message = e.to_string();
            Ok(render_edit_form(&state, &user, &target, Some(&message))
                .await?
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /admin/users/{id}/delete
pub async fn user_delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Response, WebError> {
    state.user_service.delete_user(&user, id).await?;
    tracing::info!(user_id = id, "User deleted");
    Ok(Redirect::to("/admin/users").into_response())
}
