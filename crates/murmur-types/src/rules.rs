//! Validation rules shared by request payloads.

use std::borrow::Cow;

use validator::ValidationError;

use crate::api::RegisterRequest;

const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

/// At least 3 characters once surrounding whitespace is dropped.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < 3 {
        return Err(invalid("name_too_short", "Name is invalid. Required: at least 3 characters"));
    }
    Ok(())
}

/// At least one capital letter and one special character. Length is checked
/// separately.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let has_capital = password.chars().any(|c| c.is_ascii_uppercase());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));
    if !has_capital || !has_special {
        return Err(invalid(
            "password_too_weak",
            "Password must include at least one capital letter and one special character",
        ));
    }
    Ok(())
}

pub fn validate_passwords_match(req: &RegisterRequest) -> Result<(), ValidationError> {
    if req.password != req.confirm_password {
        return Err(invalid("password_mismatch", "Passwords do not match"));
    }
    Ok(())
}
