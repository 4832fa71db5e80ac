use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use murmur_gateway::IdentityVerifier;
use murmur_types::api::{Claims, TokenKind, TokenPair};

use crate::error::ApiError;

/// Signing secrets. Access and verification tokens share the access secret.
#[derive(Clone, Default)]
pub struct TokenSecrets {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
    pub verification: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: Duration::minutes(15),
            refresh: Duration::days(7),
            verification: Duration::hours(1),
        }
    }
}

/// Stateless issuance and verification of signed claims.
#[derive(Clone)]
pub struct TokenService {
    secrets: TokenSecrets,
    ttls: TokenTtls,
}

impl TokenService {
    pub fn new(secrets: TokenSecrets, ttls: TokenTtls) -> Self {
        Self { secrets, ttls }
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.issue(user_id, TokenKind::Access)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.issue(user_id, TokenKind::Refresh)
    }

    pub fn issue_verification_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.issue(user_id, TokenKind::Verification)
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id)?,
            refresh_token: self.issue_refresh_token(user_id)?,
        })
    }

    /// Check signature, expiry and that the token was minted as `kind`.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, ApiError> {
        let secret = self.secret(kind)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => ApiError::TokenExpired,
            _ => ApiError::InvalidToken,
        })?;

        if data.claims.kind != kind {
            return Err(ApiError::InvalidToken);
        }
        Ok(data.claims)
    }

    fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<String, ApiError> {
        let secret = self.secret(kind)?;
        let ttl = match kind {
            TokenKind::Access => self.ttls.access,
            TokenKind::Refresh => self.ttls.refresh,
            TokenKind::Verification => self.ttls.verification,
        };

        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            kind,
            jti: Uuid::new_v4(),
            iat: now.timestamp().max(0) as usize,
            exp: (now + ttl).timestamp().max(0) as usize,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(e.into()))
    }

    fn secret(&self, kind: TokenKind) -> Result<&str, ApiError> {
        let (secret, name) = match kind {
            TokenKind::Access | TokenKind::Verification => (&self.secrets.access, "access"),
            TokenKind::Refresh => (&self.secrets.refresh, "refresh"),
        };
        secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Config(format!("{} token secret is not set", name)))
    }
}

impl IdentityVerifier for TokenService {
    fn verify_access(&self, token: &str) -> Option<Uuid> {
        self.verify(token, TokenKind::Access).ok().map(|claims| claims.sub)
    }
}
