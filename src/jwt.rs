//! JWT token signing and verification.
//!
//! Dual-secret scheme: access tokens and refresh tokens carry the same
//! claim shape but are signed with independent secrets, so one can never
//! be replayed as the other. Every token gets a fresh `jti` (UUID v4)
//! which doubles as the blacklist key on revocation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token (15 minutes by default)
    Access,
    /// Long-lived refresh token (2 weeks by default), rotated on use
    Refresh,
}

/// Claims carried by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: String,
    /// Username, carried so downstream logging never needs a user lookup
    pub username: String,
    /// JWT ID (unique per token, blacklist key)
    pub jti: String,
    /// Audience (logical service scope, e.g. "admin" or "client")
    pub aud: String,
    /// Issuing authority label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp, seconds)
    pub iat: u64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: u64,
}

impl Claims {
    /// Remaining validity in milliseconds relative to `now` (Unix seconds).
    /// Negative when the token has already expired.
    pub fn remaining_ttl_ms(&self, now_secs: u64) -> i64 {
        (self.exp as i64 - now_secs as i64) * 1000
    }
}

/// Default access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Default refresh token duration: 2 weeks
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

/// A freshly signed token together with its bookkeeping data.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// The compact JWT string
    pub token: String,
    /// JWT ID
    pub jti: String,
    /// Issued at (Unix seconds)
    pub issued_at: u64,
    /// Expiration (Unix seconds)
    pub expires_at: u64,
}

/// Signs and verifies access/refresh tokens.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    audience: String,
    issuer: Option<String>,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenCodec {
    /// Create a codec with the given secrets and default TTLs.
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        audience: &str,
        issuer: Option<&str>,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            audience: audience.to_string(),
            issuer: issuer.map(str::to_string),
            access_ttl_secs: ACCESS_TOKEN_DURATION_SECS,
            refresh_ttl_secs: REFRESH_TOKEN_DURATION_SECS,
        }
    }

    /// Override token durations (mainly for tests and short-lived deployments).
    pub fn with_ttls(mut self, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        self.access_ttl_secs = access_ttl_secs;
        self.refresh_ttl_secs = refresh_ttl_secs;
        self
    }

    /// The audience this codec stamps and enforces.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    fn now_secs() -> Result<u64, JwtError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)
            .map(|d| d.as_secs())
    }

    fn sign(
        &self,
        sub: &str,
        username: &str,
        token_type: TokenType,
    ) -> Result<SignedToken, JwtError> {
        let now = Self::now_secs()?;
        let (key, ttl) = match token_type {
            TokenType::Access => (&self.access_encoding, self.access_ttl_secs),
            TokenType::Refresh => (&self.refresh_encoding, self.refresh_ttl_secs),
        };
        let jti = uuid::Uuid::new_v4().to_string();
        let exp = now + ttl;

        let claims = Claims {
            sub: sub.to_string(),
            username: username.to_string(),
            jti: jti.clone(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            token_type,
            iat: now,
            exp,
        };

        let token =
            jsonwebtoken::encode(&Header::default(), &claims, key).map_err(JwtError::Encoding)?;

        Ok(SignedToken {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
        })
    }

    /// Sign a short-lived access token.
    pub fn sign_access(&self, sub: &str, username: &str) -> Result<SignedToken, JwtError> {
        self.sign(sub, username, TokenType::Access)
    }

    /// Sign a long-lived refresh token.
    pub fn sign_refresh(&self, sub: &str, username: &str) -> Result<SignedToken, JwtError> {
        self.sign(sub, username, TokenType::Refresh)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[&self.audience]);
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }
        validation
    }

    fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let key = match expected {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };
        let token_data = jsonwebtoken::decode::<Claims>(token, key, &self.validation())
            .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify(token, TokenType::Access)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify(token, TokenType::Refresh)
    }

    /// Decode a token with the expiry check disabled.
    ///
    /// The signature, audience and token type are still verified. Used at
    /// logout to compute the remaining blacklist TTL from the token's own
    /// `exp` claim, where an already-expired token is fine (TTL comes out
    /// non-positive and no blacklist entry is created).
    pub fn decode_expiry(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let key = match expected {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };
        let mut validation = self.validation();
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<Claims>(token, key, &validation)
            .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token (bad signature, expired, wrong audience, ...)
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
