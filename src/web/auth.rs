//! Login, logout, password change and profile image handlers

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use tera::Context;

use crate::models::{UpdateUserInput, User};
use crate::services::{LoginInput, UserServiceError};

use super::middleware::{
    clear_session_cookie, session_cookie, token_from_headers, AppState, AuthenticatedUser,
    WebError,
};
use super::templates::render;
use super::uploads::{store_file, PROFILES_DIR};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub password: String,
}

fn login_context(error: Option<&str>) -> Context {
    let mut context = Context::new();
    context.insert("current_user", &Option::<User>::None);
    context.insert("error", &error);
    context
}

/// GET /login
pub async fn login_page(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    render(&state.templates, "login.html", &login_context(None))
}

/// POST /login
///
/// On success sets the signed session cookie; a user still under a forced
/// password change lands on the password form instead of the dashboard.
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    let input = LoginInput::new(form.username.trim(), form.password);
    match state.user_service.login(input).await {
        Ok((session, user)) => {
            let cookie = session_cookie(
                &state.config.session.secret,
                &session.id,
                state.config.session.ttl_days,
            )?;
            let target = if user.must_change_password {
                "/password"
            } else {
                "/"
            };
            tracing::info!(username = %user.username, "User logged in");
            Ok(([(header::SET_COOKIE, cookie)], Redirect::to(target)).into_response())
        }
        Err(UserServiceError::AuthenticationError(message)) => {
            tracing::debug!(username = %form.username, "Login rejected");
            let context = login_context(Some(&message));
            Ok(render(&state.templates, "login.html", &context)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    if let Some(token) = token_from_headers(&headers, &state.config.session.secret) {
        state.user_service.logout(&token).await?;
    }
    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        Redirect::to("/login"),
    )
        .into_response())
}

fn password_context(user: &User, error: Option<&str>) -> Context {
    let mut context = Context::new();
    context.insert("current_user", user);
    context.insert("forced", &user.must_change_password);
    context.insert("error", &error);
    context
}

/// GET /password
pub async fn password_page(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Html<String>, WebError> {
    render(&state.templates, "password.html", &password_context(&user, None))
}

/// POST /password
///
/// A successful change drops every session the user had, so a fresh one
/// is minted here to keep the current browser signed in.
pub async fn password_submit(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<PasswordForm>,
) -> Result<Response, WebError> {
    match state
        .user_service
        .change_password(user.id, form.password.trim())
        .await
    {
        Ok(updated) => {
            tracing::info!(username = %updated.username, "Password changed");
            let (session, _) = state
                .user_service
                .login(LoginInput::new(
                    updated.username.as_str(),
                    form.password.trim(),
                ))
                .await?;
            let cookie = session_cookie(
                &state.config.session.secret,
                &session.id,
                state.config.session.ttl_days,
            )?;
            Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
        }
        Err(UserServiceError::ValidationError(message)) => {
            let context = password_context(&user, Some(&message));
            Ok(render(&state.templates, "password.html", &context)?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /profile/image - replace the caller's own avatar
pub async fn profile_image_submit(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Response, WebError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read multipart: {}", e))?
    {
        if field.name() != Some("profile_img") {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !state.config.uploads.is_image_allowed(&content_type) {
            return Err(WebError::Validation(format!(
                "Unsupported image type: {}",
                content_type
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read upload: {}", e))?;
        if data.len() as u64 > state.config.uploads.max_file_size {
            return Err(WebError::Validation(format!(
                "File too large (maximum {} MB)",
                state.config.uploads.max_file_size / 1024 / 1024
            )));
        }
        let filename =
            store_file(&state.config.uploads, PROFILES_DIR, &content_type, &data).await?;

        let input = UpdateUserInput {
            profile_image: Some(filename),
            ..Default::default()
        };
        state.user_service.update_user(&user, user.id, input).await?;
        return Ok(Redirect::to("/").into_response());
    }

    Err(WebError::Validation("No image provided".to_string()))
}
