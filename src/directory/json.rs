use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    email::Email,
    passwords::{Hash, Password},
};

use super::{Directory, DirectoryError};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DirectoryUser {
    pub username: String,
    pub mail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<Hash>,
}

/// A directory kept in a JSON file.
///
/// The file holds an array of [`DirectoryUser`] entries. Password changes are
/// written back to the file before they are reported as successful.
pub struct JsonDirectory {
    path: Option<PathBuf>,
    users: RwLock<Vec<DirectoryUser>>,
}

impl JsonDirectory {
    /// Load a directory from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read directory file {}.", path.display()))?;
        let users: Vec<DirectoryUser> = serde_json::from_slice(&contents)
            .with_context(|| format!("Failed to parse directory file {}.", path.display()))?;

        info!(users = users.len(), path = %path.display(), "Loaded directory.");

        Ok(Self {
            path: Some(path.to_owned()),
            users: RwLock::new(users),
        })
    }

    /// Create a directory that only lives in memory.
    pub fn in_memory(users: Vec<DirectoryUser>) -> Self {
        Self {
            path: None,
            users: RwLock::new(users),
        }
    }

    /// Determine if `raw_password` is the current password of `username`.
    pub async fn password_matches(
        &self,
        username: &str,
        raw_password: &str,
    ) -> Result<bool, DirectoryError> {
        let users = self.users.read().await;
        let user = users
            .iter()
            .find(|user| user.username == username)
            .ok_or(DirectoryError::NotFound)?;

        match &user.password_hash {
            Some(hash) => Ok(hash.verify(raw_password)?),
            None => Ok(false),
        }
    }

    async fn persist(&self, users: &[DirectoryUser]) -> anyhow::Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let contents =
            serde_json::to_vec_pretty(users).context("Failed to serialize directory.")?;

        // Write a sibling file and rename it over the original so a crash
        // mid-write can't truncate the directory.
        let mut temp_path = path.clone().into_os_string();
        temp_path.push(".tmp");

        tokio::fs::write(&temp_path, contents)
            .await
            .context("Failed to write directory file.")?;
        tokio::fs::rename(&temp_path, path)
            .await
            .context("Failed to replace directory file.")?;

        Ok(())
    }
}

fn same_mailbox(stored: &str, requested: &Email) -> bool {
    match Email::parse(stored) {
        Ok(stored) => stored.normalized_address() == requested.normalized_address(),
        Err(_) => false,
    }
}

#[async_trait]
impl Directory for JsonDirectory {
    async fn find_user_by_mail(&self, mail: &str) -> Result<String, DirectoryError> {
        let requested = Email::parse(mail).map_err(|_| DirectoryError::NotFound)?;

        self.users
            .read()
            .await
            .iter()
            .find(|user| same_mailbox(&user.mail, &requested))
            .map(|user| user.username.clone())
            .ok_or(DirectoryError::NotFound)
    }

    async fn set_password(
        &self,
        username: &str,
        password: &Password,
    ) -> Result<(), DirectoryError> {
        let hash = Hash::compute(password.clone()).await?;

        let mut users = self.users.write().await;
        let mut updated = users.clone();
        let user = updated
            .iter_mut()
            .find(|user| user.username == username)
            .ok_or(DirectoryError::NotFound)?;
        user.password_hash = Some(hash);

        self.persist(&updated).await?;
        *users = updated;

        debug!(%username, "Changed directory password.");

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn users() -> Vec<DirectoryUser> {
        vec![
            DirectoryUser {
                username: "jdoe".to_owned(),
                mail: "JDoe@Example.com".to_owned(),
                password_hash: None,
            },
            DirectoryUser {
                username: "asmith".to_owned(),
                mail: "asmith@example.com".to_owned(),
                password_hash: None,
            },
        ]
    }

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "password-recovery-{}-{}.json",
            name,
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn find_user_by_mail_ignores_domain_case() {
        let directory = JsonDirectory::in_memory(users());

        let username = directory
            .find_user_by_mail("JDoe@EXAMPLE.COM")
            .await
            .expect("user should exist");

        assert_eq!("jdoe", username);
    }

    #[tokio::test]
    async fn find_user_by_mail_unknown() {
        let directory = JsonDirectory::in_memory(users());

        let result = directory.find_user_by_mail("nobody@example.com").await;

        assert!(matches!(result, Err(DirectoryError::NotFound)));
    }

    #[tokio::test]
    async fn find_user_by_mail_malformed() {
        let directory = JsonDirectory::in_memory(users());

        let result = directory.find_user_by_mail("not-an-address").await;

        assert!(matches!(result, Err(DirectoryError::NotFound)));
    }

    #[tokio::test]
    async fn set_password_updates_hash() {
        let directory = JsonDirectory::in_memory(users());

        directory
            .set_password("asmith", &Password::unvalidated("new-password".to_owned()))
            .await
            .expect("password should change");

        assert!(directory
            .password_matches("asmith", "new-password")
            .await
            .expect("user exists"));
        assert!(!directory
            .password_matches("jdoe", "new-password")
            .await
            .expect("user exists"));
    }

    #[tokio::test]
    async fn set_password_unknown_user() {
        let directory = JsonDirectory::in_memory(users());

        let result = directory
            .set_password("nobody", &Password::unvalidated("new-password".to_owned()))
            .await;

        assert!(matches!(result, Err(DirectoryError::NotFound)));
    }

    #[tokio::test]
    async fn set_password_is_written_to_file() {
        let path = temp_file("persist");
        tokio::fs::write(&path, serde_json::to_vec(&users()).expect("serializable"))
            .await
            .expect("temp file should be writable");

        let directory = JsonDirectory::load(&path).await.expect("directory should load");
        directory
            .set_password("jdoe", &Password::unvalidated("new-password".to_owned()))
            .await
            .expect("password should change");

        let reloaded = JsonDirectory::load(&path).await.expect("directory should load");
        let matches = reloaded
            .password_matches("jdoe", "new-password")
            .await
            .expect("user exists");
        let _ = tokio::fs::remove_file(&path).await;

        assert!(matches);
    }

    #[tokio::test]
    async fn load_missing_file() {
        let result = JsonDirectory::load(temp_file("does-not-exist")).await;

        assert!(result.is_err());
    }
}
