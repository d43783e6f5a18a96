//! Identifier validation and quoting.
//!
//! Resource names come straight from desired-state objects and end up in the
//! identifier position of a command string. A [`QuotedIdent`] can only be built
//! through [`QuotedIdent::new`], so commands never see an unquoted name.

use std::fmt;

use super::DriverError;

/// PostgreSQL silently truncates identifiers longer than NAMEDATALEN - 1 bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated, double-quoted SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedIdent(String);

impl QuotedIdent {
    pub fn new(name: &str) -> Result<Self, DriverError> {
        let invalid = |reason| DriverError::InvalidIdentifier {
            name: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid("name is longer than 63 bytes"));
        }
        if name.contains('\0') {
            return Err(invalid("name contains a NUL character"));
        }

        Ok(Self(format!("\"{}\"", name.replace('"', "\"\""))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuotedIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_is_quoted() {
        assert_eq!(QuotedIdent::new("alice_role").unwrap().as_str(), "\"alice_role\"");
    }

    #[test]
    fn test_mixed_case_and_reserved_words_are_preserved() {
        assert_eq!(QuotedIdent::new("Alice").unwrap().as_str(), "\"Alice\"");
        assert_eq!(QuotedIdent::new("user").unwrap().as_str(), "\"user\"");
        assert_eq!(QuotedIdent::new("my role").unwrap().as_str(), "\"my role\"");
    }

    #[test]
    fn test_embedded_quote_cannot_escape_identifier() {
        let ident = QuotedIdent::new("alice\"; DROP ROLE admin; --").unwrap();
        assert_eq!(ident.as_str(), "\"alice\"\"; DROP ROLE admin; --\"");

        // Stripping the outer quotes must leave no lone quote behind.
        let inner = &ident.as_str()[1..ident.as_str().len() - 1];
        assert_eq!(inner.replace("\"\"", "").matches('"').count(), 0);
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            QuotedIdent::new(""),
            Err(DriverError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_rejects_nul() {
        assert!(QuotedIdent::new("ali\0ce").is_err());
    }

    #[test]
    fn test_length_limit_counts_bytes() {
        assert!(QuotedIdent::new(&"a".repeat(MAX_IDENTIFIER_LEN)).is_ok());
        assert!(QuotedIdent::new(&"a".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
        // 32 two-byte characters = 64 bytes
        assert!(QuotedIdent::new(&"é".repeat(32)).is_err());
    }
}
