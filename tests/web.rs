//! End-to-end tests for the web UI
//!
//! Each test boots the full router over an in-memory database and drives
//! it through HTTP: login, the forced password change, role checks and
//! the vehicle pages.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::multipart::MultipartForm;
use axum_test::{TestServer, TestServerConfig};
use serde_json::json;
use sqlx::SqlitePool;

use paddock::config::Config;
use paddock::db::repositories::{
    SqlxExpiryRepository, SqlxMaintenanceRepository, SqlxSessionRepository, SqlxUserRepository,
    SqlxVehicleRepository, UserRepository,
};
use paddock::db::{create_test_pool, migrations::run_migrations};
use paddock::models::{User, UserRole};
use paddock::services::{
    hash_password, ExpiryService, MaintenanceService, UserService, VehicleService,
};
use paddock::web::{build_router, build_templates, AppState};

async fn test_state() -> (AppState, SqlitePool) {
    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();

    let mut config = Config::default();
    config.session.secret = "integration-secret".to_string();

    let user_repo = Arc::new(SqlxUserRepository::new(pool.clone()));
    let session_repo = Arc::new(SqlxSessionRepository::new(pool.clone()));
    let vehicle_repo = Arc::new(SqlxVehicleRepository::new(pool.clone()));
    let maintenance_repo = Arc::new(SqlxMaintenanceRepository::new(pool.clone()));
    let expiry_repo = Arc::new(SqlxExpiryRepository::new(pool.clone()));

    let state = AppState {
        config: Arc::new(config),
        templates: Arc::new(build_templates().unwrap()),
        user_service: Arc::new(UserService::new(user_repo, session_repo)),
        vehicle_service: Arc::new(VehicleService::new(vehicle_repo.clone())),
        maintenance_service: Arc::new(MaintenanceService::new(
            maintenance_repo,
            vehicle_repo.clone(),
        )),
        expiry_service: Arc::new(ExpiryService::new(expiry_repo, vehicle_repo)),
    };
    (state, pool)
}

fn server(state: AppState) -> TestServer {
    let config = TestServerConfig {
        save_cookies: true,
        ..TestServerConfig::default()
    };
    TestServer::new_with_config(build_router(state), config).unwrap()
}

async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    role: UserRole,
    must_change: bool,
) -> User {
    let repo = SqlxUserRepository::new(pool.clone());
    let mut user = User::new(
        username.to_string(),
        hash_password(password).unwrap(),
        role,
    );
    user.must_change_password = must_change;
    repo.create(&user).await.unwrap()
}

async fn login(server: &TestServer, username: &str, password: &str) -> String {
    let response = server
        .post("/login")
        .form(&json!({ "username": username, "password": password }))
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    response.header("location").to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_anonymous_visitor_is_redirected_to_login() {
    let (state, _pool) = test_state().await;
    let server = server(state);

    let response = server.get("/").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/login");

    let response = server.get("/vehicles/1").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/login");
}

#[tokio::test]
async fn test_login_page_renders_form() {
    let (state, _pool) = test_state().await;
    let server = server(state);

    let response = server.get("/login").await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("name=\"username\""));
    assert!(body.contains("name=\"password\""));
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "anna", "correct-horse", UserRole::Member, false).await;
    let server = server(state);

    let response = server
        .post("/login")
        .form(&json!({ "username": "anna", "password": "wrong" }))
        .await;

    // Re-rendered form, not a redirect
    response.assert_status_ok();
    assert!(response.text().contains("Invalid username or password"));
}

#[tokio::test]
async fn test_login_opens_dashboard() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "anna", "correct-horse", UserRole::Member, false).await;
    let server = server(state);

    let target = login(&server, "anna", "correct-horse").await;
    assert_eq!(target, "/");

    let response = server.get("/").await;
    response.assert_status_ok();
    assert!(response.text().contains("anna"));
}

#[tokio::test]
async fn test_forced_password_change_pins_user_to_password_form() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "fresh", "temporary1", UserRole::Member, true).await;
    let server = server(state);

    // Login succeeds but lands on the password form
    let target = login(&server, "fresh", "temporary1").await;
    assert_eq!(target, "/password");

    // Every other page bounces back there
    let response = server.get("/").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/password");

    // Changing the password releases the account
    let response = server
        .post("/password")
        .form(&json!({ "password": "a-real-password" }))
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/");

    let response = server.get("/").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_password_change_rejects_short_password() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "fresh", "temporary1", UserRole::Member, true).await;
    let server = server(state);
    login(&server, "fresh", "temporary1").await;

    let response = server
        .post("/password")
        .form(&json!({ "password": "abc" }))
        .await;

    response.assert_status_ok();
    assert!(response.text().contains("at least"));
}

#[tokio::test]
async fn test_member_cannot_open_user_admin() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "anna", "correct-horse", UserRole::Member, false).await;
    let server = server(state);
    login(&server, "anna", "correct-horse").await;

    let response = server.get("/admin/users").await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_can_open_user_admin() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "boss", "correct-horse", UserRole::Admin, false).await;
    let server = server(state);
    login(&server, "boss", "correct-horse").await;

    let response = server.get("/admin/users").await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("Users"));
    assert!(body.contains("boss"));
}

#[tokio::test]
async fn test_vehicle_create_and_detail() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "anna", "correct-horse", UserRole::Member, false).await;
    let server = server(state);
    login(&server, "anna", "correct-horse").await;

    let form = MultipartForm::new()
        .add_text("plate", "ab123cd")
        .add_text("make", "Fiat")
        .add_text("model", "Panda")
        .add_text("year", "2018")
        .add_text("odometer", "42000");
    let response = server.post("/vehicles").multipart(form).await;
    response.assert_status(StatusCode::SEE_OTHER);
    let location = response.header("location").to_str().unwrap().to_string();
    assert!(location.starts_with("/vehicles/"), "got {}", location);

    let response = server.get(&location).await;
    response.assert_status_ok();
    let body = response.text();
    // Plates are stored normalized
    assert!(body.contains("AB123CD"));
    assert!(body.contains("Fiat"));
    assert!(body.contains("Panda"));
}

#[tokio::test]
async fn test_vehicle_create_with_invalid_year_rerenders_form() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "anna", "correct-horse", UserRole::Member, false).await;
    let server = server(state);
    login(&server, "anna", "correct-horse").await;

    let form = MultipartForm::new()
        .add_text("plate", "ab123cd")
        .add_text("make", "Fiat")
        .add_text("model", "Panda")
        .add_text("year", "soon")
        .add_text("odometer", "42000");
    let response = server.post("/vehicles").multipart(form).await;

    response.assert_status_ok();
    let body = response.text();
    // The text fields survive the round trip
    assert!(body.contains("Fiat"));
    assert!(body.contains("Panda"));
}

#[tokio::test]
async fn test_member_cannot_see_another_members_vehicle() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "anna", "correct-horse", UserRole::Member, false).await;
    insert_user(&pool, "bruno", "correct-horse", UserRole::Member, false).await;
    let server = server(state);

    login(&server, "anna", "correct-horse").await;
    let form = MultipartForm::new()
        .add_text("plate", "ab123cd")
        .add_text("make", "Fiat")
        .add_text("model", "Panda")
        .add_text("year", "2018")
        .add_text("odometer", "42000");
    let response = server.post("/vehicles").multipart(form).await;
    let location = response.header("location").to_str().unwrap().to_string();
    server.post("/logout").await;

    login(&server, "bruno", "correct-horse").await;
    let response = server.get(&location).await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let (state, pool) = test_state().await;
    insert_user(&pool, "anna", "correct-horse", UserRole::Member, false).await;
    let server = server(state);
    login(&server, "anna", "correct-horse").await;

    let response = server.post("/logout").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/login");

    let response = server.get("/").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/login");
}
