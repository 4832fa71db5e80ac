use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::UserProfile;

// -- JWT Claims --

/// Which secret signed a token and what it may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Verification,
}

/// JWT claims shared across murmur-api (REST middleware, session manager) and
/// murmur-gateway (websocket identify). `jti` keeps two tokens minted in the
/// same second distinct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: TokenKind,
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

// -- Envelope --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failed,
}

/// Every HTTP response body: `{status, message, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            message: message.into(),
            data: None,
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "crate::rules::validate_passwords_match"))]
pub struct RegisterRequest {
    #[validate(custom(function = "crate::rules::validate_name"))]
    pub name: String,
    #[validate(email(message = "Email is invalid or does not meet the required format"))]
    pub email: String,
    #[validate(
        length(min = 6, max = 20, message = "Password must be 6 to 20 characters long"),
        custom(function = "crate::rules::validate_password_strength")
    )]
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewTokenRequest {
    pub token: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub message: String,
    /// Client-chosen id; resending with the same id never duplicates the message.
    #[serde(default)]
    pub id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_envelope_has_no_data_field() {
        let json = serde_json::to_value(Envelope::failed("Invalid refresh token")).unwrap();
        assert_eq!(json, serde_json::json!({
            "status": "FAILED",
            "message": "Invalid refresh token",
        }));
    }

    #[test]
    fn success_envelope_carries_data() {
        let pair = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
        };
        let json = serde_json::to_value(Envelope::success("Token renewed", pair)).unwrap();
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["data"]["refresh_token"], "r");
    }

    #[test]
    fn send_request_id_is_optional() {
        let req: SendMessageRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.id.is_none());

        let bad = serde_json::from_str::<SendMessageRequest>(r#"{"message":"hi","extra":1}"#);
        assert!(bad.is_err());
    }

    fn register(name: &str, email: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[test]
    fn register_request_rules() {
        assert!(register("Ada Lovelace", "a@x.com", "Secret!1", "Secret!1").validate().is_ok());
        assert!(register("Ad", "a@x.com", "Secret!1", "Secret!1").validate().is_err());
        assert!(register("Ada", "a@b..c", "Secret!1", "Secret!1").validate().is_err());
        assert!(register("Ada", "a b@x.com", "Secret!1", "Secret!1").validate().is_err());
        assert!(register("Ada", "a@x.com", "S!a", "S!a").validate().is_err());
        assert!(register("Ada", "a@x.com", "Secret!1Secret!1Secret!1", "Secret!1Secret!1Secret!1").validate().is_err());

        let errors = register("Ada", "a@x.com", "Secret!1", "Secret!2").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("__all__"));
    }
}
