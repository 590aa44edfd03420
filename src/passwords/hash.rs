use std::convert::TryFrom;

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::SaltString;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use super::Password;

/// An argon2 hash of a password, in PHC string format.
///
/// Only constructible from a password or a string that parses as a PHC hash,
/// so a stored `Hash` can always be verified against.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash(String);

impl Hash {
    /// Hash a password with a fresh random salt.
    pub fn new(password: &Password) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), salt.as_ref())?
            .to_string();

        Ok(Self(password_hash))
    }

    /// Hash a password on the blocking thread pool, keeping argon2 off the
    /// async workers.
    pub async fn compute(password: Password) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::new(&password))
            .await
            .context("Password hashing task failed.")?
    }

    /// Parse a previously stored hash.
    pub fn parse(hash: &str) -> Result<Self> {
        Ok(Self(PasswordHash::new(hash)?.to_string()))
    }

    /// Determine if `raw_password` is the password this hash was made from.
    pub fn verify(&self, raw_password: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(&self.0)?;

        match Argon2::default().verify_password(raw_password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(other) => Err(other.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Hash {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Hash> for String {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}
