//! Session token lifecycle: issue, refresh (rotate-on-use), logout.
//!
//! Composes the token codec with the blacklist store. Every verification
//! failure collapses into a single opaque `Unauthorized`, so callers can
//! never distinguish a bad signature from an expired, rotated or
//! wrong-audience token.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::blacklist::BlacklistStore;
use crate::jwt::{Claims, JwtError, TokenCodec, TokenType};

/// An access/refresh token pair issued together. The two tokens share
/// subject and audience but have independent `jti`s and expiries.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Session-layer errors.
#[derive(Debug)]
pub enum SessionError {
    /// Any token verification failure: bad signature, expired, wrong
    /// type, wrong audience, or blacklisted. Deliberately undifferentiated.
    Unauthorized,
    /// Blacklist store I/O failure.
    Storage(sqlx::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Unauthorized => write!(f, "Unauthorized"),
            SessionError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<sqlx::Error> for SessionError {
    fn from(e: sqlx::Error) -> Self {
        SessionError::Storage(e)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Orchestrates token issuance, refresh and revocation.
#[derive(Clone)]
pub struct SessionService {
    codec: Arc<TokenCodec>,
    blacklist: BlacklistStore,
}

impl SessionService {
    pub fn new(codec: Arc<TokenCodec>, blacklist: BlacklistStore) -> Self {
        Self { codec, blacklist }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Issue a fresh access/refresh pair. Pure over secrets and clock;
    /// no store side effects.
    pub fn issue_pair(&self, sub: &str, username: &str) -> Result<TokenPair, SessionError> {
        let access = self.codec.sign_access(sub, username).map_err(signing_err)?;
        let refresh = self.codec.sign_refresh(sub, username).map_err(signing_err)?;
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Verify an access token, including the blacklist check (a token
    /// passed to `logout` is rejected here even while still time-valid).
    pub async fn verify_access(&self, token: &str) -> Result<Claims, SessionError> {
        let claims = self.codec.verify_access(token).map_err(|e| {
            debug!(error = %e, "access token verification failed");
            SessionError::Unauthorized
        })?;

        if self.blacklist.is_blacklisted(&claims.jti).await? {
            debug!(jti = %claims.jti, "access token is blacklisted");
            return Err(SessionError::Unauthorized);
        }

        Ok(claims)
    }

    /// Exchange a refresh token for a new pair, consuming it.
    ///
    /// The consumed `jti` is blacklisted for the token's remaining
    /// lifetime before the new pair is issued, so a rotated refresh token
    /// fails on reuse. The blacklist check and the insert are separate
    /// operations: two simultaneous refreshes with the same token can
    /// both pass the check before either insert lands. Known limitation
    /// of the lookup-then-insert pattern; not atomic.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let claims = self.codec.verify_refresh(refresh_token).map_err(|e| {
            debug!(error = %e, "refresh token verification failed");
            SessionError::Unauthorized
        })?;

        if self.blacklist.is_blacklisted(&claims.jti).await? {
            debug!(jti = %claims.jti, "refresh token already rotated");
            return Err(SessionError::Unauthorized);
        }

        let ttl_ms = claims.remaining_ttl_ms(now_secs());
        self.blacklist.add(&claims.jti, ttl_ms).await?;

        self.issue_pair(&claims.sub, &claims.username)
    }

    /// Revoke the given tokens by blacklisting their `jti`s for their
    /// remaining lifetimes.
    ///
    /// Decodes with the expiry check disabled: an expired token yields a
    /// non-positive TTL and is skipped rather than erroring, so logout is
    /// idempotent and always succeeds for stale or malformed tokens.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), SessionError> {
        let now = now_secs();

        if let Some(token) = access_token {
            self.revoke(token, TokenType::Access, now).await?;
        }
        if let Some(token) = refresh_token {
            self.revoke(token, TokenType::Refresh, now).await?;
        }

        Ok(())
    }

    async fn revoke(
        &self,
        token: &str,
        token_type: TokenType,
        now: u64,
    ) -> Result<(), SessionError> {
        match self.codec.decode_expiry(token, token_type) {
            Ok(claims) => {
                let ttl_ms = claims.remaining_ttl_ms(now);
                self.blacklist.add(&claims.jti, ttl_ms).await?;
                Ok(())
            }
            Err(e) => {
                // A token that does not even decode cannot be presented
                // successfully anywhere; nothing to revoke.
                debug!(error = %e, "skipping revocation of undecodable token");
                Ok(())
            }
        }
    }
}

fn signing_err(e: JwtError) -> SessionError {
    debug!(error = %e, "token signing failed");
    SessionError::Unauthorized
}
