use semval::context::Context as ValidationContext;
use serde::{Deserialize, Serialize};

use crate::{email::EmailInvalidity, http_err::INVALID_TOKEN_MESSAGE, passwords::PasswordInvalidity};

#[derive(Deserialize, Serialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Response to every accepted reset request, whether or not the address has
/// an account.
#[derive(Debug, Deserialize, Serialize)]
pub struct PasswordResetRequestAccepted {
    pub message: String,
}

impl Default for PasswordResetRequestAccepted {
    fn default() -> Self {
        Self {
            message: "If an account exists for that address, a password reset link has been \
                      sent to it."
                .to_owned(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PasswordResetRequestError {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub email: Vec<String>,
}

impl From<EmailInvalidity> for PasswordResetRequestError {
    fn from(invalidity: EmailInvalidity) -> Self {
        let message = match invalidity {
            EmailInvalidity::MissingDomain => "Email is missing a domain.",
            EmailInvalidity::MissingSeparator => "Email is missing an '@' symbol.",
        };

        Self {
            email: vec![message.to_owned()],
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct PasswordReset {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PasswordResetError {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_password: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub token: Vec<String>,
}

impl PasswordResetError {
    /// The same error for unknown, expired and used tokens.
    pub fn invalid_token() -> Self {
        Self {
            new_password: vec![],
            token: vec![INVALID_TOKEN_MESSAGE.to_owned()],
        }
    }
}

impl From<ValidationContext<PasswordInvalidity>> for PasswordResetError {
    fn from(validation: ValidationContext<PasswordInvalidity>) -> Self {
        let mut response = Self::default();

        for invalidity in validation.into_iter() {
            let message = match invalidity {
                PasswordInvalidity::MaxLength(max) => {
                    format!("Passwords may not contain more than {} characters.", max)
                }
                PasswordInvalidity::MinLength(min) => {
                    format!("Passwords must contain at least {} characters.", min)
                }
                PasswordInvalidity::MissingUppercase => {
                    "Passwords must contain an uppercase letter.".to_owned()
                }
                PasswordInvalidity::MissingLowercase => {
                    "Passwords must contain a lowercase letter.".to_owned()
                }
                PasswordInvalidity::MissingDigit => "Passwords must contain a digit.".to_owned(),
                PasswordInvalidity::ContainsUsername => {
                    "Passwords may not contain your username.".to_owned()
                }
            };

            response.new_password.push(message);
        }

        response
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Health {
    pub status: String,
    pub tokens: usize,
    pub full: bool,
}
