//! Remote cache node transport used by the sharded backend

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Port used when a node spec carries none
pub const DEFAULT_NODE_PORT: u16 = 11211;

/// One remote cache node.
///
/// Unlike [`CacheBackend`](crate::domain::cache::CacheBackend), transport
/// faults are returned so the sharded backend can re-route.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheNode: Send + Sync {
    /// `host:port` of the node, for log lines
    fn address(&self) -> String;

    /// Opens the connection if not done yet
    async fn connect(&self) -> Result<(), DomainError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), DomainError>;

    async fn delete(&self, key: &str) -> Result<bool, DomainError>;
}

/// Parsed `host[:port]` node spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(spec: &str, port: &str) -> Result<u16, DomainError> {
    port.parse::<u16>().map_err(|e| {
        DomainError::configuration(format!("Invalid port in node spec '{}': {}", spec, e))
    })
}

impl FromStr for NodeAddress {
    type Err = DomainError;

    /// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and a bare IPv6 literal
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        let (host, port) = if let Some(rest) = spec.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                DomainError::configuration(format!("Unclosed bracket in node spec '{}'", spec))
            })?;
            let port = match tail {
                "" => DEFAULT_NODE_PORT,
                tail => match tail.strip_prefix(':') {
                    Some(port) => parse_port(spec, port)?,
                    None => {
                        return Err(DomainError::configuration(format!(
                            "Unexpected text after host in node spec '{}'",
                            spec
                        )));
                    }
                },
            };
            (host, port)
        } else {
            match spec.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => (spec, DEFAULT_NODE_PORT),
                Some((host, port)) => (host, parse_port(spec, port)?),
                None => (spec, DEFAULT_NODE_PORT),
            }
        };

        if host.is_empty() {
            return Err(DomainError::configuration(format!(
                "Missing host in node spec '{}'",
                spec
            )));
        }

        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_port() {
        let address: NodeAddress = "cache-1:11311".parse().unwrap();
        assert_eq!(address, NodeAddress::new("cache-1", 11311));
        assert_eq!(address.to_string(), "cache-1:11311");
    }

    #[test]
    fn test_parse_defaults_port() {
        let address: NodeAddress = "cache-1".parse().unwrap();
        assert_eq!(address.port, DEFAULT_NODE_PORT);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("cache-1:abc".parse::<NodeAddress>().is_err());
        assert!(":11211".parse::<NodeAddress>().is_err());
        assert!("".parse::<NodeAddress>().is_err());
    }

    #[test]
    fn test_parse_ipv6() {
        let address: NodeAddress = "[::1]:11311".parse().unwrap();
        assert_eq!(address, NodeAddress::new("::1", 11311));
        assert_eq!(address.to_string(), "[::1]:11311");

        let address: NodeAddress = "[fe80::2]".parse().unwrap();
        assert_eq!(address, NodeAddress::new("fe80::2", DEFAULT_NODE_PORT));

        let address: NodeAddress = "fe80::2".parse().unwrap();
        assert_eq!(address, NodeAddress::new("fe80::2", DEFAULT_NODE_PORT));

        assert!("[::1".parse::<NodeAddress>().is_err());
        assert!("[::1]x".parse::<NodeAddress>().is_err());
        assert!("[]:11211".parse::<NodeAddress>().is_err());
    }
}
