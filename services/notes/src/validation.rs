//! Input validation for account forms

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{FieldError, ValidationError};

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::single("email", "Email cannot be blank"));
    }

    if email.len() > 254 {
        return Err(ValidationError::single(
            "email",
            "Email must be at most 254 characters long",
        ));
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err(ValidationError::single("email", "Email is not valid"));
    }

    Ok(())
}

/// Validate a password
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::single("password", "Password cannot be blank"));
    }

    if password.len() < 8 {
        return Err(ValidationError::single(
            "password",
            "Password must be at least 8 characters long",
        ));
    }

    if password.len() > 128 {
        return Err(ValidationError::single(
            "password",
            "Password must be at most 128 characters long",
        ));
    }

    Ok(())
}

/// Validate a signup or password-change pair
pub fn validate_password_pair(password: &str, confirm: &str) -> Result<(), ValidationError> {
    validate_password(password)?;
    if password != confirm {
        return Err(ValidationError::single("password_confirm", "Passwords must match"));
    }
    Ok(())
}

/// Validate login form input, collecting every field failure
pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    if let Err(err) = validate_email(email) {
        errors.extend(err.errors);
    }
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password cannot be blank"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(errors))
    }
}
