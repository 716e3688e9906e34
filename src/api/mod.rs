pub mod auth;
pub mod error;
pub mod types;
pub mod users;
pub mod validation;

pub use error::ApiError;
pub use types::{ApiResponse, MessageResponse, UserStats};

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, LogMailer, Mailer, SeaOrmAuthService};

/// Shared application state, handed to every handler as `Arc<AppState>`.
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub store: Store,
    pub auth_service: Arc<dyn AuthService>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub const fn store(&self) -> &Store {
        &self.store
    }

    pub fn auth(&self) -> &dyn AuthService {
        self.auth_service.as_ref()
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }
}

/// Wire up the store, auth service and mailer from a loaded config.
pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let auth_service = Arc::new(SeaOrmAuthService::new(
        store.clone(),
        config.security.clone(),
    ));
    let mailer = Arc::new(LogMailer::new(config.mail.from_address.clone()));

    Ok(Arc::new(AppState {
        config: Arc::new(RwLock::new(config)),
        store,
        auth_service,
        mailer,
    }))
}

/// Build the full API router, including the session and CORS layers.
pub async fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, secure_cookies, session_ttl_days) = {
        let config = state.config.read().await;
        (
            config.server.cors_allowed_origins.clone(),
            config.server.secure_cookies,
            config.server.session_ttl_days,
        )
    };

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(
            session_ttl_days,
        )));

    let cors = if cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let admin_routes = Router::new()
        .route("/admin/users", get(users::list_users))
        .route(
            "/admin/users/{id}",
            get(users::get_user).put(users::update_user),
        )
        .route("/admin/stats", get(users::get_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let member_routes = Router::new()
        .route("/change-password", post(auth::change_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let public_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/user", get(auth::current_user))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password));

    let api_routes = public_routes.merge(member_routes).merge(admin_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
