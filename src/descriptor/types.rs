//! Hub descriptor and lock record types.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

/// Wire protocol revision advertised by hubs.
pub const PROTOCOL_VERSION: u32 = 1;

/// Lowest port a hub may publish.
pub const MIN_HUB_PORT: u16 = 1024;

/// Errors raised while validating or constructing a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("descriptor host is empty")]
    EmptyHost,

    #[error("descriptor host {0:?} is not an IP address or hostname")]
    InvalidHost(String),

    #[error("descriptor port {0} is outside {min}..=65535", min = MIN_HUB_PORT)]
    PortOutOfRange(u16),

    #[error("non-loopback hub {0} published without a token")]
    MissingToken(String),

    #[error("invalid remote hub address {0:?}")]
    InvalidRemote(String),
}

/// Published address and identity of the current hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubDescriptor {
    pub host: String,
    pub port: u16,
    /// Hub process id. `0` means unknown (remote override).
    pub pid: u32,
    #[serde(default)]
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_protocol")]
    pub protocol: u32,
}

fn default_protocol() -> u32 {
    PROTOCOL_VERSION
}

impl HubDescriptor {
    pub fn new(host: impl Into<String>, port: u16, pid: u32, token: Option<String>) -> Self {
        Self {
            host: host.into(),
            port,
            pid,
            token,
            created_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: PROTOCOL_VERSION,
        }
    }

    /// Build a descriptor from a `ws://host:port[/ws]` or `host:port` override.
    pub fn from_remote(address: &str, token: Option<String>) -> Result<Self, DescriptorError> {
        let invalid = || DescriptorError::InvalidRemote(address.to_string());
        let address = address.trim();
        if address.is_empty() {
            return Err(invalid());
        }

        let url = if address.contains("://") {
            Url::parse(address)
        } else {
            Url::parse(&format!("ws://{address}"))
        }
        .map_err(|_| invalid())?;

        if !matches!(url.scheme(), "ws" | "http") {
            return Err(invalid());
        }
        if !matches!(url.path(), "" | "/" | "/ws") {
            return Err(invalid());
        }

        let host = match url.host().ok_or_else(invalid)? {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };
        let port = url.port().ok_or_else(invalid)?;

        let descriptor = Self::new(host, port, 0, token);
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.host.is_empty() {
            return Err(DescriptorError::EmptyHost);
        }
        if self.host.parse::<IpAddr>().is_err() && !is_hostname(&self.host) {
            return Err(DescriptorError::InvalidHost(self.host.clone()));
        }
        if self.port < MIN_HUB_PORT {
            return Err(DescriptorError::PortOutOfRange(self.port));
        }
        if !self.is_loopback() && self.token.as_deref().map_or(true, str::is_empty) {
            return Err(DescriptorError::MissingToken(self.host.clone()));
        }
        Ok(())
    }

    pub fn is_loopback(&self) -> bool {
        is_loopback_host(&self.host)
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(addr)) => format!("[{addr}]:{}", self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.authority(), path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.authority())
    }
}

pub fn is_loopback_host(host: &str) -> bool {
    match host.parse::<IpAddr>() {
        Ok(addr) => addr.is_loopback(),
        Err(_) => host.eq_ignore_ascii_case("localhost"),
    }
}

fn is_hostname(host: &str) -> bool {
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Advisory content of the lock artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub nonce: u64,
    pub created_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn new(pid: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            pid,
            nonce: fastrand::u64(..),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_descriptor_needs_no_token() {
        let d = HubDescriptor::new("127.0.0.1", 17361, 42, None);
        assert!(d.validate().is_ok());
        assert_eq!(d.ws_url(), "ws://127.0.0.1:17361/ws");

        let remote = HubDescriptor::new("10.1.2.3", 17361, 42, None);
        assert_eq!(remote.validate(), Err(DescriptorError::MissingToken("10.1.2.3".into())));
    }

    #[test]
    fn rejects_bad_hosts_and_ports() {
        assert_eq!(HubDescriptor::new("", 17361, 1, None).validate(), Err(DescriptorError::EmptyHost));
        assert_eq!(
            HubDescriptor::new("localhost", 80, 1, None).validate(),
            Err(DescriptorError::PortOutOfRange(80))
        );
        assert!(matches!(
            HubDescriptor::new("bad host!", 17361, 1, Some("t".into())).validate(),
            Err(DescriptorError::InvalidHost(_))
        ));
    }

    #[test]
    fn parses_remote_overrides() {
        let d = HubDescriptor::from_remote("ws://127.0.0.1:9000/ws", None).unwrap();
        assert_eq!((d.host.as_str(), d.port, d.pid), ("127.0.0.1", 9000, 0));

        let d = HubDescriptor::from_remote("logs.internal:9100", Some("secret".into())).unwrap();
        assert_eq!(d.host, "logs.internal");
        assert_eq!(d.token.as_deref(), Some("secret"));

        let d = HubDescriptor::from_remote("[::1]:9000", None).unwrap();
        assert_eq!(d.authority(), "[::1]:9000");

        assert!(HubDescriptor::from_remote("logs.internal", Some("t".into())).is_err());
        assert!(HubDescriptor::from_remote("ftp://host:9000", None).is_err());
        assert!(HubDescriptor::from_remote("10.0.0.1:9000", None).is_err());
    }

    #[test]
    fn protocol_defaults_when_missing() {
        let raw = r#"{"host":"127.0.0.1","port":17361,"pid":7,"created_at":"2024-01-01T00:00:00Z"}"#;
        let d: HubDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(d.protocol, PROTOCOL_VERSION);
        assert!(d.token.is_none());
    }
}
