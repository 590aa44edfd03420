/// Dealing with user passwords.
mod hash;
mod password;

pub use hash::Hash;
pub use password::{
    validate_new_password, Password, PasswordInvalidity, PasswordPolicy,
    DEFAULT_MAX_PASSWORD_LENGTH, DEFAULT_MIN_PASSWORD_LENGTH,
};
