pub mod clients;
pub mod templates;

use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum EmailInvalidity {
    /// The address does not have a domain portion.
    #[error("email is missing a domain")]
    MissingDomain,

    /// The address is missing the `@` symbol separating the local and domain
    /// parts.
    #[error("email is missing an '@' symbol")]
    MissingSeparator,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Email {
    provided_address: String,
    normalized_address: String,
}

impl Email {
    /// Parse an email address from a string.
    ///
    /// # Arguments
    ///
    /// * `raw_email` - The email address to parse. Surrounding whitespace is
    ///   ignored.
    ///
    /// # Return Value
    ///
    /// Parsing returns a result with parsed email representation if the address
    /// was valid. An error means the address has no "@" symbol or nothing
    /// after the last one.
    pub fn parse(raw_email: &str) -> Result<Email, EmailInvalidity> {
        let raw_email = raw_email.trim();

        // Email addresses may have multiple "@" symbols, and the last one
        // delimits the local part from the domain.
        let (local_part, domain) = raw_email
            .rsplit_once('@')
            .ok_or(EmailInvalidity::MissingSeparator)?;

        if domain.is_empty() {
            return Err(EmailInvalidity::MissingDomain);
        }

        Ok(Email {
            provided_address: raw_email.to_owned(),
            // The only part of an email address that is case insensitive is
            // the domain.
            normalized_address: format!("{}@{}", local_part, domain.to_lowercase()),
        })
    }

    pub fn provided_address(&self) -> &str {
        &self.provided_address
    }

    pub fn normalized_address(&self) -> &str {
        &self.normalized_address
    }

    /// Key used to rate limit requests for this address.
    ///
    /// Most mail servers ignore case in the local part too, so the whole
    /// address is lowercased to stop case variations from getting a fresh
    /// limit.
    pub fn rate_limit_key(&self) -> String {
        self.normalized_address.to_lowercase()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_missing_at_symbol() {
        let parsed = Email::parse("missing-an-at-symbol");

        assert_eq!(Err(EmailInvalidity::MissingSeparator), parsed);
    }

    #[test]
    fn parse_missing_domain() {
        let parsed = Email::parse("someone@");

        assert_eq!(Err(EmailInvalidity::MissingDomain), parsed);
    }

    #[test]
    fn parse_valid_no_normalizing_required() {
        let parsed = Email::parse("someone@somewhere").expect("Parse failed");

        assert_eq!("someone@somewhere", parsed.provided_address());
        assert_eq!("someone@somewhere", parsed.normalized_address());
    }

    #[test]
    fn parse_valid_local_part_is_not_changed() {
        let parsed = Email::parse("TeSt@example.com").expect("Parse failed");

        assert_eq!("TeSt@example.com", parsed.provided_address());
        assert_eq!("TeSt@example.com", parsed.normalized_address());
    }

    #[test]
    fn parse_valid_normalize_domain() {
        let parsed = Email::parse("  test@ExAmPlE.com ").expect("Parse failed");

        assert_eq!("test@ExAmPlE.com", parsed.provided_address());
        assert_eq!("test@example.com", parsed.normalized_address());
    }

    #[test]
    fn rate_limit_key_ignores_case() {
        let first = Email::parse("JDoe@Example.com").expect("Parse failed");
        let second = Email::parse("jdoe@EXAMPLE.COM").expect("Parse failed");

        assert_eq!(first.rate_limit_key(), second.rate_limit_key());
    }
}
