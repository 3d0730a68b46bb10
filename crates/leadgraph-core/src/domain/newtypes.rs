//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the two kinds of string the Graph layer passes
//! around: opaque credentials and object identifiers.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// AccessToken
// ============================================================================

/// An opaque bearer credential issued by the sign-in collaborator.
///
/// The value is never parsed. `Debug` and `Display` both redact it so a token
/// cannot leak through a log line or an error message by accident; use
/// [`AccessToken::expose`] at the single point where it goes on the wire.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct AccessToken(String);

impl AccessToken {
    /// Create a new AccessToken
    ///
    /// # Errors
    /// Returns error if the token is empty or contains whitespace
    pub fn new(token: impl Into<String>) -> Result<Self, DomainError> {
        let token = token.into();
        if token.is_empty() {
            return Err(DomainError::InvalidToken(
                "Access token cannot be empty".to_string(),
            ));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidToken(
                "Access token contains whitespace".to_string(),
            ));
        }
        Ok(Self(token))
    }

    /// Returns the raw token value for placing on the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Last eight characters, enough to correlate sessions in diagnostics.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let start = chars.len().saturating_sub(8);
        chars[start..].iter().collect()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

impl Display for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl FromStr for AccessToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccessToken {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

// ============================================================================
// GraphId
// ============================================================================

/// Identifier of a Graph object (page, lead form, lead, user).
///
/// Graph ids are numeric strings, sometimes joined with underscores
/// (`"123_456"`). Path separators and query characters are rejected so an id
/// can be spliced into a resource path safely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GraphId(String);

impl GraphId {
    /// Create a new GraphId
    ///
    /// # Errors
    /// Returns error if the id is empty or contains characters outside
    /// `[A-Za-z0-9_-]`
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidGraphId(
                "Graph id cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::InvalidGraphId(format!(
                "Graph id contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for GraphId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GraphId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GraphId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<GraphId> for String {
    fn from(id: GraphId) -> Self {
        id.0
    }
}
