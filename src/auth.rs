use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

use crate::{
    config::AppConfig,
    error::AppError,
    models::{Document, IssueTokenRequest},
    repository::RepositoryState,
};

/// Fixed lifetime of every identity token.
pub const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Claims
///
/// Payload of an identity token. `email` is the subject; whatever else the
/// caller submitted to `POST /jwt` rides along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The subject's email address. The admin gate looks users up by it.
    pub email: String,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
    /// Expiration Time (exp), seconds since the epoch. Exclusive.
    pub exp: usize,
    #[serde(flatten)]
    pub extra: Document,
}

/// TokenCodec
///
/// Signs and verifies identity tokens (HS256). Built once at startup from
/// the configured secret and shared read-only across requests.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

pub type TokenState = Arc<TokenCodec>;

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Expiry is exact: no clock skew allowance.
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: TOKEN_TTL,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// issue
    ///
    /// Signs the caller's claim payload with a fresh one-hour expiry.
    /// The email is only checked for shape; ownership is not verified here.
    pub fn issue(&self, request: IssueTokenRequest) -> Result<String, AppError> {
        self.issue_at(request, unix_now())
    }

    /// Same as `issue`, with an explicit issuance time (seconds since the epoch).
    pub fn issue_at(&self, request: IssueTokenRequest, issued_at: i64) -> Result<String, AppError> {
        let email = request.email.trim();
        if !looks_like_email(email) {
            return Err(AppError::BadRequest(
                "claim must contain a valid email".to_string(),
            ));
        }

        let mut extra = request.extra;
        // Server-owned registered claims.
        extra.remove("iat");
        extra.remove("exp");

        let iat = issued_at.max(0) as usize;
        let claims = Claims {
            email: email.to_string(),
            iat,
            exp: iat + self.ttl.as_secs() as usize,
            extra,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// verify
    ///
    /// Checks signature and expiry. Pure: no store access.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!("token rejected: {:?}", e.kind());
                AppError::Unauthenticated
            })?;

        let claims = token_data.claims;
        // The library accepts `exp == now`; a token is only valid strictly before `exp`.
        if (claims.exp as i64) <= unix_now() {
            return Err(AppError::Unauthenticated);
        }
        Ok(claims)
    }
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthenticated)?;

    // The scheme is case-insensitive.
    let (scheme, token) = value.split_once(' ').ok_or(AppError::Unauthenticated)?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(AppError::Unauthenticated);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::Unauthenticated);
    }
    Ok(token)
}

/// AuthUser
///
/// An authenticated caller: the verified claims of its bearer token.
/// The auth middleware stores it in the request extensions, so handlers
/// behind it get the already-verified value without decoding twice.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
    pub claims: Claims,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(parts)?;
        let claims = TokenState::from_ref(state).verify(token)?;

        let user = AuthUser {
            email: claims.email.clone(),
            claims,
        };
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// AdminUser
///
/// An authenticated caller whose stored user record has `role == "admin"`.
///
/// Extraction authenticates first (401 on failure), then reads the user
/// record by email exactly once. The read is not cached, so a demotion takes
/// effect on the next request. It is bounded by `AppConfig::role_lookup_timeout`;
/// a slow or failing store yields `Unavailable` rather than a hung request.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub email: String,
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    TokenState: FromRef<S>,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        let repo = RepositoryState::from_ref(state);
        let timeout = AppConfig::from_ref(state).role_lookup_timeout;

        let record = tokio::time::timeout(timeout, repo.find_user_by_email(&user.email))
            .await
            .map_err(|_| {
                tracing::warn!(email = %user.email, "role lookup timed out after {:?}", timeout);
                AppError::Unavailable
            })?
            .map_err(|e| {
                tracing::error!(email = %user.email, "role lookup failed: {e}");
                AppError::Unavailable
            })?;

        match record {
            Some(record) if record.is_admin() => Ok(AdminUser { email: user.email }),
            _ => {
                tracing::info!(email = %user.email, "admin access denied");
                Err(AppError::Forbidden)
            }
        }
    }
}

/// ensure_self
///
/// Self-scoped routes: the caller may only look at its own records. This is
/// an identity comparison, not a role check; admins get no exemption.
pub fn ensure_self(user: &AuthUser, target_email: &str) -> Result<(), AppError> {
    if user.email != target_email {
        return Err(AppError::IdentityMismatch);
    }
    Ok(())
}
