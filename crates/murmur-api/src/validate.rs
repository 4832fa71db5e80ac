use validator::Validate;

use murmur_types::api::RegisterRequest;

use crate::error::ApiError;

pub const MAX_BODY_CHARS: usize = 2000;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Field rules live on the request type; this maps their failures into [`ApiError`].
pub fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    req.validate()?;
    Ok(())
}

/// Trim, bound the length and neutralise markup so a body can be rendered as HTML.
pub fn sanitize_body(body: &str) -> Result<String, ApiError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("Message must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_BODY_CHARS {
        return Err(ApiError::Validation(format!(
            "Message must be at most {} characters",
            MAX_BODY_CHARS
        )));
    }

    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(name: &str, email: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn registration_failures_become_validation_errors() {
        assert!(validate_registration(&register("Ada Lovelace", "a@x.com", "Secret!1", "Secret!1")).is_ok());

        match validate_registration(&register("Ada", "a@b..c", "Secret!1", "Secret!2")) {
            Err(ApiError::Validation(msg)) => {
                assert!(msg.contains("Email is invalid"), "{}", msg);
            }
            other => panic!("expected a validation error, got {:?}", other),
        }

        match validate_registration(&register("Ada", "a@x.com", "Secret!1", "Secret!2")) {
            Err(ApiError::Validation(msg)) => assert_eq!(msg, "Passwords do not match"),
            other => panic!("expected a validation error, got {:?}", other),
        }

        assert!(matches!(
            validate_registration(&register("", "", "", "")),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn bodies_are_escaped_and_bounded() {
        assert_eq!(
            sanitize_body("  <script>alert('x')</script> ").unwrap(),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
        );
        assert_eq!(sanitize_body("line one\nline two").unwrap(), "line one\nline two");
        assert!(sanitize_body("   ").is_err());
        assert!(sanitize_body(&"x".repeat(MAX_BODY_CHARS + 1)).is_err());
    }
}
