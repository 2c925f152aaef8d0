//! Web layer shared state, session cookies and auth middleware
//!
//! The session cookie carries the raw session token plus an HMAC-SHA256
//! signature: `session={token}.{hex signature}`. A request with a tampered
//! cookie is rejected before any database lookup. Authentication failures
//! on page routes redirect the browser to the login form instead of
//! returning a bare status code.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tera::Tera;

use crate::config::Config;
use crate::models::User;
use crate::services::{
    ExpiryService, ExpiryServiceError, MaintenanceService, MaintenanceServiceError, UserService,
    UserServiceError, VehicleService, VehicleServiceError,
};

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub templates: Arc<Tera>,
    pub user_service: Arc<UserService>,
    pub vehicle_service: Arc<VehicleService>,
    pub maintenance_service: Arc<MaintenanceService>,
    pub expiry_service: Arc<ExpiryService>,
}

/// Authenticated user extracted from request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(WebError::Unauthorized)
    }
}

/// Error type for web handlers
///
/// `Unauthorized` turns into a redirect to the login form; everything else
/// renders a plain error page with the matching status code.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Page not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::Unauthorized => Redirect::to("/login").into_response(),
            WebError::Forbidden(message) => {
                error_page(StatusCode::FORBIDDEN, "Access denied", &message)
            }
            WebError::NotFound => error_page(
                StatusCode::NOT_FOUND,
                "Not found",
                "The page you asked for does not exist.",
            ),
            WebError::Validation(message) => {
                error_page(StatusCode::BAD_REQUEST, "Invalid request", &message)
            }
            WebError::Internal(e) => {
                tracing::error!("Internal error while handling request: {:#}", e);
                error_page(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong",
                    "An internal error occurred. Please try again later.",
                )
            }
        }
    }
}

impl From<UserServiceError> for WebError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(_) => WebError::Unauthorized,
            UserServiceError::NotFound => WebError::NotFound,
            UserServiceError::Forbidden(message) => WebError::Forbidden(message),
            UserServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Validation(other.to_string()),
        }
    }
}

impl From<VehicleServiceError> for WebError {
    fn from(err: VehicleServiceError) -> Self {
        match err {
            VehicleServiceError::NotFound => WebError::NotFound,
            VehicleServiceError::Forbidden(message) => WebError::Forbidden(message),
            VehicleServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Validation(other.to_string()),
        }
    }
}

impl From<MaintenanceServiceError> for WebError {
    fn from(err: MaintenanceServiceError) -> Self {
        match err {
            MaintenanceServiceError::NotFound => WebError::NotFound,
            MaintenanceServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Validation(other.to_string()),
        }
    }
}

impl From<ExpiryServiceError> for WebError {
    fn from(err: ExpiryServiceError) -> Self {
        match err {
            ExpiryServiceError::NotFound => WebError::NotFound,
            ExpiryServiceError::InternalError(e) => WebError::Internal(e),
            other => WebError::Validation(other.to_string()),
        }
    }
}

/// Render a minimal standalone error page
///
/// Used from `WebError::into_response`, which has no access to the template
/// engine, so the markup lives here.
fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head><meta charset=\"utf-8\"><title>{title}</title>\n\
         <style>body{{font-family:system-ui,sans-serif;background:#f4f5f7;color:#1f2933;\
         display:flex;align-items:center;justify-content:center;min-height:100vh;margin:0}}\
         .card{{background:#fff;border-radius:8px;padding:2rem 3rem;box-shadow:0 1px 4px rgba(0,0,0,.1);\
         text-align:center}}a{{color:#2563eb}}</style></head>\n\
         <body><div class=\"card\"><h1>{title}</h1><p>{message}</p>\
         <p><a href=\"/\">Back to the dashboard</a></p></div></body>\n\
         </html>\n",
        title = escape_html(title),
        message = escape_html(message),
    );
    (status, Html(body)).into_response()
}

/// Escape text for inclusion in HTML
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Compute the hex HMAC-SHA256 signature of a session token
fn hmac_hex(secret: &str, token: &str) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to initialize HMAC: {}", e))?;
    mac.update(token.as_bytes());
    let result = mac.finalize().into_bytes();
    Ok(result.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Produce the signed cookie value `{token}.{hex signature}`
pub fn signed_cookie_value(secret: &str, token: &str) -> anyhow::Result<String> {
    Ok(format!("{}.{}", token, hmac_hex(secret, token)?))
}

/// Verify a signed cookie value and return the raw session token
///
/// Returns `None` when the value is malformed or the signature does not
/// match. Comparison goes through `Mac::verify_slice`, which is constant
/// time.
pub fn verify_cookie_value(secret: &str, value: &str) -> Option<String> {
    let (token, sig_hex) = value.rsplit_once('.')?;
    if token.is_empty() {
        return None;
    }
    let sig = decode_hex(sig_hex)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(token.as_bytes());
    mac.verify_slice(&sig).ok()?;
    Some(token.to_string())
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if !s.is_ascii() || s.len() % 2 != 0 || s.is_empty() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Build the Set-Cookie header value for a fresh session
pub fn session_cookie(secret: &str, token: &str, ttl_days: i64) -> anyhow::Result<String> {
    Ok(format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        signed_cookie_value(secret, token)?,
        ttl_days * 86_400,
    ))
}

/// Build the Set-Cookie header value that clears the session cookie
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Extract and verify the session token from a Cookie header
pub fn token_from_headers(headers: &axum::http::HeaderMap, secret: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?;
    let cookie_str = cookie_header.to_str().ok()?;
    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie.strip_prefix("session=") {
            return verify_cookie_value(secret, value);
        }
    }
    None
}

fn extract_session_token(request: &Request, secret: &str) -> Option<String> {
    token_from_headers(request.headers(), secret)
}

/// Paths an account flagged for a password change may still reach
fn password_change_allowed(path: &str) -> bool {
    path == "/password" || path == "/logout"
}

/// Authentication middleware
///
/// Redirects to the login form when no valid session cookie is present.
/// Accounts flagged with `must_change_password` are pinned to the password
/// form until they set a new password.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let token = match extract_session_token(&request, &state.config.session.secret) {
        Some(token) => token,
        None => return Ok(Redirect::to("/login").into_response()),
    };

    let user = match state.user_service.validate_session(&token).await? {
        Some(user) => user,
        None => {
            // Stale cookie: clear it so the browser stops sending it
            let headers = [(header::SET_COOKIE, clear_session_cookie())];
            return Ok((headers, Redirect::to("/login")).into_response());
        }
    };

    if user.must_change_password && !password_change_allowed(request.uri().path()) {
        return Ok(Redirect::to("/password").into_response());
    }

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware
///
/// Runs after `require_auth`; rejects users without an admin role.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, WebError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or(WebError::Unauthorized)?;

    if !user.0.is_admin() {
        return Err(WebError::Forbidden(
            "Administrator privileges required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
