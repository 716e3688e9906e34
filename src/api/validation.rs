//! Request-shape validation, applied at the endpoint boundary before any
//! store or hash work happens. Failures surface as a field-level error list.

use super::error::{ApiError, FieldError};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_NAME_LEN: usize = 3;

pub fn validate_login(username: &str, password: &str) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    if username.trim().is_empty() {
        errors.push(FieldError::new("username", "Username is required"));
    }
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }

    finish(errors)
}

pub fn validate_registration(
    name: &str,
    username: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    if name.trim().chars().count() < MIN_NAME_LEN {
        errors.push(FieldError::new(
            "name",
            format!("Name must be at least {MIN_NAME_LEN} characters"),
        ));
    }
    if username.trim().chars().count() < MIN_USERNAME_LEN {
        errors.push(FieldError::new(
            "username",
            format!("Username must be at least {MIN_USERNAME_LEN} characters"),
        ));
    }
    if !is_valid_email(email) {
        errors.push(FieldError::new("email", "Invalid email address"));
    }
    errors.extend(password_errors(password, confirm_password, "password", "confirmPassword"));

    finish(errors)
}

pub fn validate_change_password(
    current_password: &str,
    new_password: &str,
    confirm_new_password: &str,
) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    if current_password.is_empty() {
        errors.push(FieldError::new(
            "currentPassword",
            "Current password is required",
        ));
    }
    errors.extend(password_errors(
        new_password,
        confirm_new_password,
        "newPassword",
        "confirmNewPassword",
    ));

    finish(errors)
}

pub fn validate_reset_password(
    token: &str,
    new_password: &str,
    confirm_new_password: &str,
) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    if token.trim().is_empty() {
        errors.push(FieldError::new("token", "Token is required"));
    }
    errors.extend(password_errors(
        new_password,
        confirm_new_password,
        "newPassword",
        "confirmNewPassword",
    ));

    finish(errors)
}

fn password_errors(
    password: &str,
    confirmation: &str,
    password_field: &str,
    confirmation_field: &str,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            password_field,
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if password != confirmation {
        errors.push(FieldError::new(confirmation_field, "Passwords do not match"));
    }

    errors
}

/// Structural check only: one `@`, non-empty local part, dotted domain, no
/// whitespace. Deliverability is not this layer's problem.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn finish(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::FieldErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_login() {
        assert!(validate_login("joao", "senha123").is_ok());
        assert!(validate_login("", "senha123").is_err());
        assert!(validate_login("joao", "").is_err());
        assert!(validate_login("   ", "senha123").is_err());
    }

    #[test]
    fn test_validate_registration() {
        assert!(
            validate_registration("João Silva", "joao", "joao@example.com", "senha123", "senha123")
                .is_ok()
        );
        // Too-short username
        assert!(
            validate_registration("João Silva", "jo", "joao@example.com", "senha123", "senha123")
                .is_err()
        );
        // Password confirmation mismatch
        assert!(
            validate_registration("João Silva", "joao", "joao@example.com", "senha123", "senha124")
                .is_err()
        );
        // Password too short
        assert!(
            validate_registration("João Silva", "joao", "joao@example.com", "abc", "abc").is_err()
        );
    }

    #[test]
    fn test_registration_collects_all_field_errors() {
        let err = validate_registration("x", "y", "bad-email", "ab", "cd").unwrap_err();
        match err {
            ApiError::FieldErrors(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"name"));
                assert!(fields.contains(&"username"));
                assert!(fields.contains(&"email"));
                assert!(fields.contains(&"password"));
                assert!(fields.contains(&"confirmPassword"));
            }
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("joao@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("joao"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("joao@example"));
        assert!(!is_valid_email("joao@.com"));
        assert!(!is_valid_email("jo ao@example.com"));
    }

    #[test]
    fn test_validate_reset_password() {
        assert!(validate_reset_password("tok", "senha123", "senha123").is_ok());
        assert!(validate_reset_password("", "senha123", "senha123").is_err());
        assert!(validate_reset_password("tok", "senha123", "outra").is_err());
    }
}
