pub mod auth_service;
pub mod auth_service_impl;
pub mod mailer;

pub use auth_service::{AuthError, AuthService, PasswordReset, Principal, Registration, Role};
pub use auth_service_impl::SeaOrmAuthService;
pub use mailer::{LogMailer, Mailer};
