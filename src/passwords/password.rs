use std::fmt::Debug;

use semval::{context::Context as ValidationContext, prelude::*};

pub const DEFAULT_MAX_PASSWORD_LENGTH: usize = 512;
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// A user's new password, after it has passed the password policy.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    /// Construct an unvalidated password.
    ///
    /// Prefer [`validate_new_password`] for anything a user typed in.
    ///
    /// # Arguments
    ///
    /// * `password` - The password to store.
    pub fn unvalidated(password: String) -> Self {
        Self(password)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't include the raw password in debug output.
        f.debug_tuple("Password").field(&"*".repeat(8)).finish()
    }
}

/// Rules a new password has to follow.
#[derive(Clone, Debug)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    /// Reject passwords that contain the account's username.
    pub forbid_username: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_PASSWORD_LENGTH,
            max_length: DEFAULT_MAX_PASSWORD_LENGTH,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            forbid_username: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PasswordInvalidity {
    /// The provided value exceeds the maximum allowable length for a password.
    /// The max length is contained as a value.
    MaxLength(usize),
    /// The provided value is smaller than the minimum allowable length for a
    /// password. The min length is contained as a value.
    MinLength(usize),
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    /// The password contains the username of the account being reset.
    ContainsUsername,
}

struct NewPassword<'a> {
    password: &'a str,
    username: &'a str,
    policy: &'a PasswordPolicy,
}

impl NewPassword<'_> {
    fn contains_username(&self) -> bool {
        let username = self.username.trim().to_lowercase();

        !username.is_empty() && self.password.to_lowercase().contains(&username)
    }
}

impl Validate for NewPassword<'_> {
    type Invalidity = PasswordInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        let length = self.password.chars().count();
        let policy = self.policy;

        ValidationContext::new()
            .invalidate_if(
                length < policy.min_length,
                PasswordInvalidity::MinLength(policy.min_length),
            )
            .invalidate_if(
                length > policy.max_length,
                PasswordInvalidity::MaxLength(policy.max_length),
            )
            .invalidate_if(
                policy.require_uppercase && !self.password.chars().any(char::is_uppercase),
                PasswordInvalidity::MissingUppercase,
            )
            .invalidate_if(
                policy.require_lowercase && !self.password.chars().any(char::is_lowercase),
                PasswordInvalidity::MissingLowercase,
            )
            .invalidate_if(
                policy.require_digit && !self.password.chars().any(|c| c.is_ascii_digit()),
                PasswordInvalidity::MissingDigit,
            )
            .invalidate_if(
                policy.forbid_username && self.contains_username(),
                PasswordInvalidity::ContainsUsername,
            )
            .into()
    }
}

/// Check a new password against a policy.
///
/// # Arguments
///
/// * `password` - The password the user wants.
/// * `username` - The username of the account being changed.
/// * `policy` - The rules to apply.
///
/// # Returns
///
/// The accepted [`Password`], or a validation context listing every rule the
/// password breaks.
pub fn validate_new_password(
    password: &str,
    username: &str,
    policy: &PasswordPolicy,
) -> Result<Password, ValidationContext<PasswordInvalidity>> {
    NewPassword {
        password,
        username,
        policy,
    }
    .validate()?;

    Ok(Password(password.to_owned()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn invalidities(password: &str, username: &str, policy: &PasswordPolicy) -> Vec<PasswordInvalidity> {
        validate_new_password(password, username, policy)
            .expect_err("Password should be invalid")
            .into_iter()
            .collect()
    }

    #[test]
    fn debug_does_not_contain_value() {
        let raw_password = "some-very-unique-string";
        let password = validate_new_password(raw_password, "jdoe", &PasswordPolicy::default())
            .expect("Password should be valid");

        let debug_output = format!("{:?}", password);

        assert!(
            !debug_output.contains(raw_password),
            "The raw password {:?} should not be contained in the debug output {:?}.",
            raw_password,
            password
        );
    }

    #[test]
    fn validate_valid() {
        let password = validate_new_password("password", "jdoe", &PasswordPolicy::default())
            .expect("Password should be valid");

        assert_eq!(b"password", password.as_bytes());
    }

    #[test]
    fn validate_too_short() {
        let errors = invalidities(&"a".repeat(7), "jdoe", &PasswordPolicy::default());

        assert_eq!(vec![PasswordInvalidity::MinLength(8)], errors);
    }

    #[test]
    fn validate_too_long() {
        let errors = invalidities(&"a".repeat(513), "jdoe", &PasswordPolicy::default());

        assert_eq!(vec![PasswordInvalidity::MaxLength(512)], errors);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // Eight characters, sixteen bytes.
        validate_new_password("éééééééé", "jdoe", &PasswordPolicy::default())
            .expect("Password should be valid");
    }

    #[test]
    fn validate_contains_username() {
        let errors = invalidities("xxJDoe-2024", "jdoe", &PasswordPolicy::default());

        assert_eq!(vec![PasswordInvalidity::ContainsUsername], errors);
    }

    #[test]
    fn username_check_can_be_disabled() {
        let policy = PasswordPolicy {
            forbid_username: false,
            ..Default::default()
        };

        validate_new_password("xxjdoe-2024", "jdoe", &policy).expect("Password should be valid");
    }

    #[test]
    fn validate_reports_every_broken_rule() {
        let policy = PasswordPolicy {
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            ..Default::default()
        };

        let errors = invalidities("abc", "jdoe", &policy);

        assert_eq!(
            vec![
                PasswordInvalidity::MinLength(8),
                PasswordInvalidity::MissingUppercase,
                PasswordInvalidity::MissingDigit,
            ],
            errors
        );
    }
}
