use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use murmur_db::UserStore;
use murmur_types::api::{TokenKind, TokenPair};
use murmur_types::models::User;

use crate::blocking::run_store;
use crate::error::ApiError;
use crate::notify::{Job, JobQueue};
use crate::password::PasswordHashing;
use crate::tokens::TokenService;
use crate::validate::normalize_email;

/// Authentication, token issuance, refresh rotation and email verification.
///
/// Every state change that must not race (refresh rotation, verification)
/// is a single compare-and-set at the store.
pub struct SessionManager {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    hasher: Arc<dyn PasswordHashing>,
    jobs: Arc<dyn JobQueue>,
    store_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        hasher: Arc<dyn PasswordHashing>,
        jobs: Arc<dyn JobQueue>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            jobs,
            store_timeout,
        }
    }

    /// Create an unverified user and schedule the verification email.
    /// Input shape is validated by the caller.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        let email = normalize_email(email);

        let lookup = email.clone();
        if run_store(&self.users, self.store_timeout, move |s| s.user_by_email(&lookup))
            .await?
            .is_some()
        {
            return Err(ApiError::DuplicateEmail);
        }

        let hasher = self.hasher.clone();
        let plain = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| ApiError::Internal(e.into()))??;

        let id = Uuid::new_v4();
        let verification_token = self.tokens.issue_verification_token(id)?;
        let user = User {
            id,
            name: name.trim().to_string(),
            email,
            password_hash,
            email_verified: false,
            verification_token: Some(verification_token.clone()),
            refresh_token: None,
            is_login: false,
            created_at: Utc::now(),
        };

        let record = user.clone();
        match run_store(&self.users, self.store_timeout, move |s| s.insert_user(&record)).await {
            Ok(()) => {}
            // Lost a race with a concurrent registration of the same email
            Err(ApiError::Conflict(_)) => return Err(ApiError::DuplicateEmail),
            Err(e) => return Err(e),
        }

        if let Err(e) = self.jobs.schedule(Job::VerificationEmail {
            email: user.email.clone(),
            token: verification_token,
        }) {
            warn!("Could not schedule verification email for {}: {}", user.id, e);
        }

        info!("Registered user {}", user.id);
        Ok(user)
    }

    /// `Ok(None)` means the password did not match; an unknown email is
    /// [`ApiError::UserNotFound`].
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, ApiError> {
        let email = normalize_email(email);
        let user = run_store(&self.users, self.store_timeout, move |s| s.user_by_email(&email))
            .await?
            .ok_or(ApiError::UserNotFound)?;

        let hasher = self.hasher.clone();
        let plain = password.to_owned();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
            .await
            .map_err(|e| ApiError::Internal(e.into()))??;

        Ok(matches.then_some(user))
    }

    /// Authenticate, then issue an access/refresh pair and store the refresh token.
    /// Unknown email and wrong password are reported identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), ApiError> {
        let mut user = match self.authenticate(email, password).await {
            Ok(Some(user)) => user,
            Ok(None) | Err(ApiError::UserNotFound) => return Err(ApiError::BadCredentials),
            Err(e) => return Err(e),
        };

        let pair = self.tokens.issue_pair(user.id)?;

        let id = user.id;
        let refresh = pair.refresh_token.clone();
        let updated = run_store(&self.users, self.store_timeout, move |s| {
            s.set_session(id, Some(&refresh), true)
        })
        .await?;
        if !updated {
            return Err(ApiError::UserNotFound);
        }

        user.refresh_token = Some(pair.refresh_token.clone());
        user.is_login = true;
        info!("User {} logged in", user.id);
        Ok((user, pair))
    }

    /// Consume a pending verification token. Works at most once per token.
    pub async fn verify_email(&self, token: &str) -> Result<(), ApiError> {
        let claims = match self.tokens.verify(token, TokenKind::Verification) {
            Ok(claims) => claims,
            Err(ApiError::Config(msg)) => return Err(ApiError::Config(msg)),
            Err(_) => return Err(ApiError::InvalidOrExpiredToken),
        };

        let token = token.to_owned();
        let consumed = run_store(&self.users, self.store_timeout, move |s| {
            s.consume_verification_token(claims.sub, &token)
        })
        .await?;
        if !consumed {
            return Err(ApiError::InvalidOrExpiredToken);
        }

        info!("User {} verified their email", claims.sub);
        Ok(())
    }

    /// Rotate a refresh token. Only the currently stored token is accepted, and
    /// of two concurrent renewals with the same token only one succeeds.
    pub async fn renew(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let claims = match self.tokens.verify(refresh_token, TokenKind::Refresh) {
            Ok(claims) => claims,
            Err(ApiError::Config(msg)) => return Err(ApiError::Config(msg)),
            Err(_) => return Err(ApiError::InvalidRefreshToken),
        };

        let user_id = claims.sub;
        let user = run_store(&self.users, self.store_timeout, move |s| s.user_by_id(user_id))
            .await?
            .ok_or(ApiError::InvalidRefreshToken)?;
        if user.refresh_token.as_deref() != Some(refresh_token) {
            warn!("Stale refresh token presented for user {}", user_id);
            return Err(ApiError::InvalidRefreshToken);
        }

        let pair = self.tokens.issue_pair(user_id)?;

        let expected = refresh_token.to_owned();
        let new = pair.refresh_token.clone();
        let swapped = run_store(&self.users, self.store_timeout, move |s| {
            s.swap_refresh_token(user_id, &expected, &new)
        })
        .await?;
        if !swapped {
            warn!("Concurrent refresh for user {} lost the race", user_id);
            return Err(ApiError::InvalidRefreshToken);
        }

        Ok(pair)
    }

    /// Drop the stored refresh token so no previously issued one can be renewed.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), ApiError> {
        let cleared =
            run_store(&self.users, self.store_timeout, move |s| s.set_session(user_id, None, false))
                .await?;
        if !cleared {
            return Err(ApiError::UserNotFound);
        }

        info!("User {} logged out", user_id);
        Ok(())
    }

    /// Resolve a bearer access token to its user id.
    pub fn authorize(&self, access_token: &str) -> Result<Uuid, ApiError> {
        self.tokens
            .verify(access_token, TokenKind::Access)
            .map(|claims| claims.sub)
    }
}
