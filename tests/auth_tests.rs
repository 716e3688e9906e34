use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use capela::api::AppState;
use capela::config::Config;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // One connection so every query sees the same in-memory database.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.server.secure_cookies = false;

    let state = capela::api::create_app_state_from_config(config)
        .await
        .expect("Failed to create app state");
    let app = capela::api::router(state.clone()).await;
    (app, state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json_with_cookie(uri: &str, cookie: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header(header::COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("expected a session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register_user(app: &Router, username: &str, email: &str) -> (String, Value) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/register",
            json!({
                "name": "João Silva",
                "username": username,
                "email": email,
                "password": "senha123",
                "confirmPassword": "senha123",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = session_cookie(&response);
    let body = body_json(response).await;
    (cookie, body)
}

#[tokio::test]
async fn test_register_creates_member_and_logs_in() {
    let (app, _state) = spawn_app().await;

    let (cookie, body) = register_user(&app, "joao", "joao@example.com").await;

    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["username"], json!("joao"));
    assert_eq!(body["data"]["role"], json!("member"));
    assert!(body["data"].get("password").is_none());
    assert!(body["data"].get("passwordHash").is_none());

    // The returned cookie is already a live session.
    let response = app
        .clone()
        .oneshot(get_with_cookie("/api/user", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], json!("joao"));
}

#[tokio::test]
async fn test_register_rejects_duplicate_username_case_insensitively() {
    let (app, _state) = spawn_app().await;

    register_user(&app, "joao", "joao@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/register",
            json!({
                "name": "Outro João",
                "username": "JOAO",
                "email": "outro@example.com",
                "password": "senha123",
                "confirmPassword": "senha123",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/register",
            json!({
                "name": "Outro João",
                "username": "outro",
                "email": "JOAO@example.com",
                "password": "senha123",
                "confirmPassword": "senha123",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_reports_field_errors() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/register",
            json!({
                "name": "João Silva",
                "username": "joao",
                "email": "joao@example.com",
                "password": "senha123",
                "confirmPassword": "senha124",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"confirmPassword"));
}

#[tokio::test]
async fn test_login_failure_does_not_reveal_which_part_was_wrong() {
    let (app, _state) = spawn_app().await;

    register_user(&app, "joao", "joao@example.com").await;

    let wrong_password = app
        .clone()
        .oneshot(post_json(
            "/api/login",
            json!({"username": "joao", "password": "errada99"}),
        ))
        .await
        .unwrap();
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = body_json(wrong_password).await;

    let unknown_user = app
        .clone()
        .oneshot(post_json(
            "/api/login",
            json!({"username": "ninguem", "password": "errada99"}),
        ))
        .await
        .unwrap();
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    let unknown_user = body_json(unknown_user).await;

    // Same message either way, so usernames cannot be enumerated.
    assert_eq!(wrong_password["error"], unknown_user["error"]);
}

#[tokio::test]
async fn test_login_succeeds_with_correct_credentials() {
    let (app, _state) = spawn_app().await;

    register_user(&app, "joao", "joao@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/login",
            json!({"username": "joao", "password": "senha123"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], json!("joao"));

    let response = app
        .clone()
        .oneshot(get_with_cookie("/api/user", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_current_user_requires_session() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/user").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let (app, _state) = spawn_app().await;

    let (cookie, _) = register_user(&app, "joao", "joao@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json_with_cookie("/api/logout", &cookie, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_with_cookie("/api/user", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password_rejects_wrong_current_password() {
    let (app, _state) = spawn_app().await;

    let (cookie, _) = register_user(&app, "joao", "joao@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json_with_cookie(
            "/api/change-password",
            &cookie,
            json!({
                "currentPassword": "errada99",
                "newPassword": "novaSenha1",
                "confirmNewPassword": "novaSenha1",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The old password still works.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/login",
            json!({"username": "joao", "password": "senha123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_happy_path() {
    let (app, _state) = spawn_app().await;

    let (cookie, _) = register_user(&app, "joao", "joao@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json_with_cookie(
            "/api/change-password",
            &cookie,
            json!({
                "currentPassword": "senha123",
                "newPassword": "novaSenha1",
                "confirmNewPassword": "novaSenha1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let old = app
        .clone()
        .oneshot(post_json(
            "/api/login",
            json!({"username": "joao", "password": "senha123"}),
        ))
        .await
        .unwrap();
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = app
        .clone()
        .oneshot(post_json(
            "/api/login",
            json!({"username": "joao", "password": "novaSenha1"}),
        ))
        .await
        .unwrap();
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_requires_auth() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/change-password",
            json!({
                "currentPassword": "senha123",
                "newPassword": "novaSenha1",
                "confirmNewPassword": "novaSenha1",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forgot_password_unknown_email_is_404() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/forgot-password",
            json!({"email": "ninguem@example.com"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forgot_password_known_email_succeeds() {
    let (app, _state) = spawn_app().await;

    register_user(&app, "joao", "joao@example.com").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/forgot-password",
            json!({"email": "joao@example.com"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    // The token travels by mail, never in the response body.
    assert!(body["data"]["message"].is_string());
    assert!(body["data"].get("token").is_none());
}

#[tokio::test]
async fn test_reset_password_redeems_token_once() {
    let (app, state) = spawn_app().await;

    let (_, body) = register_user(&app, "joao", "joao@example.com").await;
    let user_id = body["data"]["id"].as_i64().unwrap() as i32;

    let token = "a".repeat(64);
    let expiry = (chrono::Utc::now() + chrono::Duration::minutes(60)).to_rfc3339();
    assert!(
        state
            .store
            .set_reset_token(user_id, &token, &expiry)
            .await
            .unwrap()
    );

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/reset-password",
            json!({
                "token": token,
                "newPassword": "novaSenha1",
                "confirmNewPassword": "novaSenha1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/login",
            json!({"username": "joao", "password": "novaSenha1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second redemption of the same token fails.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/reset-password",
            json!({
                "token": token,
                "newPassword": "outraSenha2",
                "confirmNewPassword": "outraSenha2",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_password_rejects_expired_token() {
    let (app, state) = spawn_app().await;

    let (_, body) = register_user(&app, "joao", "joao@example.com").await;
    let user_id = body["data"]["id"].as_i64().unwrap() as i32;

    let token = "b".repeat(64);
    let expiry = (chrono::Utc::now() - chrono::Duration::minutes(5)).to_rfc3339();
    assert!(
        state
            .store
            .set_reset_token(user_id, &token, &expiry)
            .await
            .unwrap()
    );

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/reset-password",
            json!({
                "token": token,
                "newPassword": "novaSenha1",
                "confirmNewPassword": "novaSenha1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The expired attempt changed nothing.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/login",
            json!({"username": "joao", "password": "senha123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_reset_password_rejects_unknown_token() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/reset-password",
            json!({
                "token": "c".repeat(64),
                "newPassword": "novaSenha1",
                "confirmNewPassword": "novaSenha1",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
