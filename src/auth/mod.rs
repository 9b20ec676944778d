//! Access-token authentication for API routes.
//!
//! Routes opt in by taking the `ApiAuth` extractor. Verification covers
//! signature, expiry, audience, token type and the revocation blacklist;
//! the resolved identity is recorded on the active request context so
//! the audit record carries it.

mod extractors;

pub use extractors::{ApiAuth, AuthenticatedUser, HasAuthState, bearer_token};
