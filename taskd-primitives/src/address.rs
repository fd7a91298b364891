//! Network addresses the Master dials to reach an agent.

use std::fmt::{self, Display, Formatter};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A `host:port` pair an agent asks the Master to use for call-backs, or the
/// Master uses to dial an agent for dispatch.
///
/// Stored as the original string rather than a resolved [`SocketAddr`] because
/// the agent's report-address may be a hostname that only resolves from the
/// Master's network vantage point, not the agent's own.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentAddress(String);

impl AgentAddress {
    /// Validates and wraps a candidate `host:port` address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the value has no `:port` suffix or
    /// the port is not a valid `u16`.
    pub fn new(address: impl Into<String>) -> Result<Self, Error> {
        let address = address.into();
        let (host, port) = address.rsplit_once(':').ok_or_else(|| Error::InvalidAddress {
            value: address.clone(),
            reason: "missing `:port` suffix".to_owned(),
        })?;
        if host.is_empty() {
            return Err(Error::InvalidAddress {
                value: address,
                reason: "empty host".to_owned(),
            });
        }
        port.parse::<u16>().map_err(|_| Error::InvalidAddress {
            value: address.clone(),
            reason: "port is not a valid u16".to_owned(),
        })?;
        Ok(Self(address))
    }

    /// Returns the address as `host:port`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolves the address to a concrete [`SocketAddr`], performing DNS
    /// resolution if `host` is not already an IP literal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if resolution fails or yields no
    /// candidates.
    pub fn resolve(&self) -> Result<SocketAddr, Error> {
        self.0
            .to_socket_addrs()
            .map_err(|err| Error::InvalidAddress {
                value: self.0.clone(),
                reason: err.to_string(),
            })?
            .next()
            .ok_or_else(|| Error::InvalidAddress {
                value: self.0.clone(),
                reason: "resolved to no addresses".to_owned(),
            })
    }
}

impl Display for AgentAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for AgentAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<SocketAddr> for AgentAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_host_and_port() {
        let addr = AgentAddress::new("10.0.0.1:50051").unwrap();
        assert_eq!(addr.as_str(), "10.0.0.1:50051");
    }

    #[test]
    fn rejects_missing_port() {
        assert!(AgentAddress::new("10.0.0.1").is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(AgentAddress::new("10.0.0.1:http").is_err());
    }

    #[test]
    fn resolves_ip_literal_without_dns() {
        let addr = AgentAddress::new("127.0.0.1:50051").unwrap();
        let resolved = addr.resolve().unwrap();
        assert_eq!(resolved.port(), 50051);
    }
}
