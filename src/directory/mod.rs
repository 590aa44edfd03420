//! The user directory: who owns an email address, and where passwords live.

mod json;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::passwords::Password;

pub use json::{DirectoryUser, JsonDirectory};

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No directory entry matches the lookup.
    #[error("no matching directory entry")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Find the username that owns an email address.
    ///
    /// # Arguments
    ///
    /// * `mail` - The address to look up.
    ///
    /// # Returns
    ///
    /// The username, [`DirectoryError::NotFound`] if no user has that
    /// address, or [`DirectoryError::Other`] if the directory couldn't be
    /// queried.
    async fn find_user_by_mail(&self, mail: &str) -> Result<String, DirectoryError>;

    /// Replace a user's password.
    async fn set_password(&self, username: &str, password: &Password)
        -> Result<(), DirectoryError>;
}

pub type DynDirectory = Arc<dyn Directory>;
