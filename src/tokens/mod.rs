//! Password reset tokens.

use std::fmt::Debug;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use crate::clock::Clock;

pub mod store;

pub use store::TokenStore;

/// Number of random bytes behind every token.
pub const TOKEN_BYTES: usize = 32;

/// Default lifetime of a freshly issued token.
pub fn default_ttl() -> Duration {
    Duration::minutes(15)
}

/// Generate a new reset token.
///
/// The token is [`TOKEN_BYTES`] bytes from the operating system's secure
/// random source, encoded as unpadded URL-safe base64 so that it survives being
/// embedded in a query string untouched.
///
/// # Returns
///
/// A 43 character token, or an error if the random source is unavailable.
pub fn generate_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("Failed to read from the system random source.")?;

    Ok(base64::encode_config(bytes, base64::URL_SAFE_NO_PAD))
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum TokenError {
    #[error("reset token already exists")]
    DuplicateToken,

    #[error("reset token not found")]
    NotFound,

    /// The store holds its maximum number of live tokens and none of them have
    /// expired.
    #[error("token store is at capacity ({capacity} tokens)")]
    CapacityExceeded { capacity: usize },
}

/// An issued password reset.
///
/// The username and email are copied from the directory when the token is
/// issued and are never looked up again.
#[derive(Clone, Eq, PartialEq)]
pub struct ResetToken {
    token: String,
    username: String,
    email: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used: bool,
    requires_approval: bool,
}

impl ResetToken {
    /// Create a new, unused reset token.
    ///
    /// # Arguments
    ///
    /// * `token` - The secret that identifies the reset.
    /// * `username` - The directory username the token resets.
    /// * `email` - The address the token was sent to.
    /// * `created_at` - Issuance time, taken from the caller's [`Clock`].
    /// * `ttl` - How long after `created_at` the token stays valid.
    pub fn issue(
        token: String,
        username: String,
        email: String,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            token,
            username,
            email,
            created_at,
            expires_at: created_at + ttl,
            used: false,
            requires_approval: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Reserved for an admin-approved reset flow. Always `false`.
    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    /// Determine if the token has expired according to `clock`.
    ///
    /// A token is still valid at the exact instant of its expiry time.
    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        self.is_expired_at(clock.now())
    }

    pub(crate) fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub(crate) fn mark_used(&mut self) {
        self.used = true;
    }
}

impl Debug for ResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The token is a bearer secret, keep it out of logs.
        f.debug_struct("ResetToken")
            .field("token", &"*".repeat(8))
            .field("username", &self.username)
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("used", &self.used)
            .field("requires_approval", &self.requires_approval)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use crate::clock::ManualClock;

    use super::*;

    fn start() -> DateTime<Utc> {
        "2024-01-01T12:00:00Z".parse().expect("valid timestamp")
    }

    fn token_for(clock: &ManualClock) -> ResetToken {
        ResetToken::issue(
            "secret-token".to_owned(),
            "jdoe".to_owned(),
            "jdoe@example.com".to_owned(),
            clock.now(),
            default_ttl(),
        )
    }

    #[test]
    fn generated_token_shape() {
        let token = generate_token().expect("random source available");

        assert_eq!(43, token.len());
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "token {:?} is not URL-safe",
            token
        );

        let decoded = base64::decode_config(&token, base64::URL_SAFE_NO_PAD)
            .expect("token should decode");
        assert_eq!(TOKEN_BYTES, decoded.len());
    }

    #[test]
    fn generated_tokens_do_not_repeat() {
        let tokens = (0..100_000)
            .map(|_| generate_token().expect("random source available"))
            .collect::<HashSet<_>>();

        assert_eq!(100_000, tokens.len());
    }

    #[test]
    fn issue_sets_expiry_from_ttl() {
        let clock = ManualClock::new(start());
        let token = token_for(&clock);

        assert_eq!(start(), token.created_at());
        assert_eq!(start() + Duration::minutes(15), token.expires_at());
        assert!(!token.is_used());
        assert!(!token.requires_approval());
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let clock = ManualClock::new(start());
        let token = token_for(&clock);

        clock.set(token.expires_at());
        assert!(!token.is_expired(&clock), "valid at the expiry instant");

        clock.advance(Duration::nanoseconds(1));
        assert!(token.is_expired(&clock), "expired one nanosecond later");
    }

    #[test]
    fn debug_does_not_contain_token() {
        let clock = ManualClock::new(start());
        let token = token_for(&clock);

        let debug_output = format!("{:?}", token);

        assert!(!debug_output.contains("secret-token"));
        assert!(debug_output.contains("jdoe@example.com"));
    }
}
