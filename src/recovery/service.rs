use std::{collections::HashSet, sync::Arc};

use anyhow::Context;
use chrono::Duration;
use parking_lot::Mutex;
use semval::context::Context as ValidationContext;
use tera::Tera;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    clock::DynClock,
    directory::{DirectoryError, DynDirectory},
    email::{clients::DynEmailClient, templates, Email, EmailInvalidity},
    passwords::{validate_new_password, PasswordInvalidity, PasswordPolicy},
    rate_limit::DynRateLimiter,
    tokens::{self, generate_token, ResetToken, TokenError, TokenStore},
};

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The operation is rate limited for the client or the address.
    #[error("operation is rate limited")]
    RateLimited,

    #[error("invalid email address: {0}")]
    InvalidEmail(#[from] EmailInvalidity),

    /// The token is unknown, expired, or already used.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("new password does not meet the password policy: {0:?}")]
    InvalidPassword(ValidationContext<PasswordInvalidity>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The two gates a reset request passes through.
///
/// The IP limiter is always consulted first, and the identifier limiter only
/// if the IP limiter allowed the request.
#[derive(Clone)]
pub struct RecoveryLimiters {
    pub ip: DynRateLimiter,
    pub identifier: DynRateLimiter,
}

#[derive(Clone, Debug)]
pub struct RecoveryOptions {
    /// Page users are sent to, the token is added as a `token` query
    /// parameter.
    pub reset_url: String,
    pub token_ttl: Duration,
    pub password_policy: PasswordPolicy,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            reset_url: "http://localhost:8000/reset-password".to_owned(),
            token_ttl: tokens::default_ttl(),
            password_policy: PasswordPolicy::default(),
        }
    }
}

/// A service object providing self-service password recovery.
#[derive(Clone)]
pub struct RecoveryService {
    clock: DynClock,
    completions: Arc<Mutex<HashSet<String>>>,
    directory: DynDirectory,
    email_client: DynEmailClient,
    limiters: RecoveryLimiters,
    options: RecoveryOptions,
    templates: Arc<Tera>,
    token_store: Arc<TokenStore>,
}

impl RecoveryService {
    /// Create a new recovery service.
    ///
    /// # Arguments
    ///
    /// * `clock` - The time source for token issuance and expiry.
    /// * `directory` - The directory used to resolve addresses and change
    ///   passwords.
    /// * `email_client` - The client used to send reset emails.
    /// * `limiters` - The rate limiters guarding reset requests.
    /// * `templates` - The templating engine used to compose email content.
    /// * `token_store` - Where issued tokens are kept.
    /// * `options` - Reset link, token lifetime and password policy.
    ///
    /// # Returns
    ///
    /// A new [`RecoveryService`] instance.
    pub fn new(
        clock: DynClock,
        directory: DynDirectory,
        email_client: DynEmailClient,
        limiters: RecoveryLimiters,
        templates: Tera,
        token_store: Arc<TokenStore>,
        options: RecoveryOptions,
    ) -> Self {
        Self {
            clock,
            completions: Arc::default(),
            directory,
            email_client,
            limiters,
            options,
            templates: Arc::new(templates),
            token_store,
        }
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.token_store
    }

    /// Request a password reset for an email address.
    ///
    /// If the address belongs to a directory user, a reset token is issued
    /// and emailed to it. Whether or not that happened is never reported back
    /// to the caller, to avoid leaking which addresses have accounts. Failures
    /// after the directory lookup are logged instead of returned for the same
    /// reason.
    ///
    /// # Arguments
    ///
    /// * `client_ip` - The address the request came from. Used for rate
    ///   limiting.
    /// * `email` - The address the user entered.
    ///
    /// # Returns
    ///
    /// [`RecoveryError::RateLimited`] if either limiter rejects the request,
    /// [`RecoveryError::InvalidEmail`] if the address is malformed, and
    /// [`Ok`] otherwise.
    pub async fn request_reset(&self, client_ip: &str, email: &str) -> Result<(), RecoveryError> {
        if !self.limiters.ip.allow_request(client_ip) {
            debug!(%client_ip, "Reset request rejected by the IP limiter.");

            return Err(RecoveryError::RateLimited);
        }

        let email = Email::parse(email)?;

        if !self.limiters.identifier.allow_request(&email.rate_limit_key()) {
            debug!("Reset request rejected by the address limiter.");

            return Err(RecoveryError::RateLimited);
        }

        let username = match self
            .directory
            .find_user_by_mail(email.normalized_address())
            .await
        {
            Ok(username) => username,
            Err(DirectoryError::NotFound) => {
                info!("Password reset requested for an address with no account.");

                return Ok(());
            }
            Err(DirectoryError::Other(error)) => {
                error!(?error, "Failed to look up reset address in the directory.");

                return Ok(());
            }
        };

        if let Err(error) = self.issue(&email, &username) {
            error!(?error, %username, "Failed to issue password reset.");
        }

        Ok(())
    }

    /// Store a new token for `username` and hand its email off for delivery.
    ///
    /// Delivery runs in a background task, so a request for a known address
    /// returns as quickly as one for an unknown address.
    fn issue(&self, email: &Email, username: &str) -> anyhow::Result<()> {
        let token = generate_token()?;
        let reset = ResetToken::issue(
            token.clone(),
            username.to_owned(),
            email.provided_address().to_owned(),
            self.clock.now(),
            self.options.token_ttl,
        );

        match self.token_store.store(reset) {
            Ok(()) => (),
            Err(error @ TokenError::CapacityExceeded { .. }) => {
                return Err(error).context(
                    "Reset token store is full of live tokens. It may be under attack, or \
                     expired tokens are not being cleaned up.",
                );
            }
            Err(error) => return Err(error).context("Failed to store reset token."),
        }

        tokio::spawn(deliver_reset(
            ResetDelivery {
                reset_link: templates::reset_link(&self.options.reset_url, &token),
                to: email.provided_address().to_owned(),
                token,
                ttl_minutes: self.options.token_ttl.num_minutes(),
                username: username.to_owned(),
            },
            self.email_client.clone(),
            self.templates.clone(),
            self.token_store.clone(),
        ));

        Ok(())
    }

    /// Determine if a token can still be used to reset a password.
    ///
    /// # Returns
    ///
    /// [`RecoveryError::InvalidToken`] if the token is unknown, expired, or
    /// already used.
    pub fn check_token(&self, token: &str) -> Result<(), RecoveryError> {
        self.usable_token(token).map(|_| ())
    }

    /// Reset a password using a token.
    ///
    /// The new password is checked against the password policy using the
    /// username captured when the token was issued. A token completes at most
    /// one reset.
    ///
    /// # Arguments
    ///
    /// * `token` - The token from the reset link.
    /// * `new_password` - The password the user chose.
    pub async fn complete_reset(&self, token: &str, new_password: &str) -> Result<(), RecoveryError> {
        let reset = self.usable_token(token)?;

        let password = validate_new_password(
            new_password,
            reset.username(),
            &self.options.password_policy,
        )
        .map_err(RecoveryError::InvalidPassword)?;

        // Only one completion per token may be in flight. Completions of
        // other tokens are not held up.
        let _claim = CompletionClaim::acquire(&self.completions, token)
            .ok_or(RecoveryError::InvalidToken)?;

        // A completion that finished before the claim has marked it used.
        self.usable_token(token)?;

        self.directory
            .set_password(reset.username(), &password)
            .await
            .context("Failed to change password in the directory.")?;

        if let Err(error) = self.token_store.mark_used(token) {
            warn!(%error, username = %reset.username(), "Reset token vanished before it was marked used.");
        }

        info!(username = %reset.username(), "Reset user's password.");

        Ok(())
    }

    fn usable_token(&self, token: &str) -> Result<ResetToken, RecoveryError> {
        let reset = self
            .token_store
            .get(token)
            .map_err(|_| RecoveryError::InvalidToken)?;

        if reset.is_used() || reset.is_expired(&*self.clock) {
            return Err(RecoveryError::InvalidToken);
        }

        Ok(reset)
    }
}

struct ResetDelivery {
    reset_link: String,
    to: String,
    token: String,
    ttl_minutes: i64,
    username: String,
}

async fn deliver_reset(
    delivery: ResetDelivery,
    email_client: DynEmailClient,
    tera: Arc<Tera>,
    token_store: Arc<TokenStore>,
) {
    let message = match templates::render_reset(
        &tera,
        &delivery.to,
        &delivery.username,
        &delivery.reset_link,
        delivery.ttl_minutes,
    ) {
        Ok(message) => message,
        Err(error) => {
            // The token can never reach its owner.
            token_store.delete(&delivery.token);
            error!(?error, username = %delivery.username, "Failed to render password reset email.");

            return;
        }
    };

    // A failed send keeps the token, the user may still receive a retried
    // delivery.
    match email_client.send(&message).await {
        Ok(()) => info!(username = %delivery.username, "Sent password reset email."),
        Err(error) => {
            error!(?error, username = %delivery.username, "Failed to send password reset email.")
        }
    }
}

/// A token with a completion in progress. Released on drop.
struct CompletionClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    token: String,
}

impl<'a> CompletionClaim<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, token: &str) -> Option<Self> {
        if !in_flight.lock().insert(token.to_owned()) {
            return None;
        }

        Some(Self {
            in_flight,
            token: token.to_owned(),
        })
    }
}

impl Drop for CompletionClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.token);
    }
}
