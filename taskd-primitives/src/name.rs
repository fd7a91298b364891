//! Agent name identifiers.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Unique, human-chosen identifier for an agent (the registry primary key).
///
/// Unlike a generated UUID, an [`AgentName`] is whatever the operator picked when
/// starting the agent (`alpha`, `build-worker-3`, ...); the registry treats it as
/// an opaque, case-sensitive string and never generates one itself.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentName(String);

impl AgentName {
    /// Validates and wraps a candidate agent name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyAgentName`] if the trimmed value is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::EmptyAgentName);
        }
        Ok(Self(name))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name, returning the owned `String`.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for AgentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl AsRef<str> for AgentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for AgentName {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_non_empty_name() {
        let name = AgentName::new("alpha").unwrap();
        assert_eq!(name.as_str(), "alpha");
    }

    #[test]
    fn rejects_empty_or_blank_name() {
        assert!(matches!(AgentName::new(""), Err(Error::EmptyAgentName)));
        assert!(matches!(AgentName::new("   "), Err(Error::EmptyAgentName)));
    }

    #[test]
    fn display_matches_source_string() {
        let name = AgentName::new("build-worker-3").unwrap();
        assert_eq!(name.to_string(), "build-worker-3");
    }
}
