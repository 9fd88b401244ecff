//! The address/port pair a service will bind.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// An interface address and TCP port, validated on construction.
///
/// Fields are private so a chosen spec cannot be mutated; use
/// [`PortSpec::with_port`] to derive a sibling spec on the same interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    interface_address: String,
    port_number: u16,
}

impl PortSpec {
    /// Create a spec, rejecting port 0 and an empty address.
    pub fn new(interface_address: impl Into<String>, port_number: u16) -> Result<Self> {
        let interface_address = interface_address.into();
        let trimmed = interface_address.trim();
        if trimmed.is_empty() {
            return Err(Error::Config("interface address must not be empty".to_string()));
        }
        if port_number == 0 {
            return Err(Error::Config(
                "port must be in the range 1-65535".to_string(),
            ));
        }
        Ok(Self {
            interface_address: trimmed.to_string(),
            port_number,
        })
    }

    /// Same interface, different port.
    pub fn with_port(&self, port_number: u16) -> Result<Self> {
        Self::new(self.interface_address.clone(), port_number)
    }

    pub fn address(&self) -> &str {
        &self.interface_address
    }

    pub fn port(&self) -> u16 {
        self.port_number
    }

    /// The bare host for a child process: `[::1]` becomes `::1`.
    pub fn host(&self) -> &str {
        let addr = self.interface_address.as_str();
        addr.strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(addr)
    }

    /// `host:port` suitable for `ToSocketAddrs`; IPv6 literals get brackets.
    pub fn bind_target(&self) -> String {
        let addr = self.interface_address.as_str();
        if addr.contains(':') && !addr.starts_with('[') {
            format!("[{}]:{}", addr, self.port_number)
        } else {
            format!("{}:{}", addr, self.port_number)
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bind_target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_port_zero() {
        assert!(PortSpec::new("127.0.0.1", 0).is_err());
        assert!(PortSpec::new("127.0.0.1", 1).is_ok());
        assert!(PortSpec::new("127.0.0.1", 65535).is_ok());
    }

    #[test]
    fn test_rejects_empty_address() {
        assert!(PortSpec::new("   ", 8000).is_err());
    }

    #[test]
    fn test_bind_target_formats() {
        let v4 = PortSpec::new("127.0.0.1", 8000).unwrap();
        assert_eq!(v4.bind_target(), "127.0.0.1:8000");

        let v6 = PortSpec::new("::1", 8000).unwrap();
        assert_eq!(v6.bind_target(), "[::1]:8000");
        assert_eq!(v6.to_string(), "[::1]:8000");

        let bracketed = PortSpec::new("[::1]", 80).unwrap();
        assert_eq!(bracketed.bind_target(), "[::1]:80");
    }

    #[test]
    fn test_host_drops_brackets() {
        assert_eq!(PortSpec::new("[::1]", 80).unwrap().host(), "::1");
        assert_eq!(PortSpec::new("::1", 80).unwrap().host(), "::1");
        assert_eq!(PortSpec::new("127.0.0.1", 80).unwrap().host(), "127.0.0.1");
        assert_eq!(PortSpec::new("[::1]", 80).unwrap().address(), "[::1]");
    }

    #[test]
    fn test_with_port_keeps_interface() {
        let spec = PortSpec::new("0.0.0.0", 80).unwrap();
        let fallback = spec.with_port(8000).unwrap();
        assert_eq!(fallback.address(), "0.0.0.0");
        assert_eq!(fallback.port(), 8000);
        assert_eq!(spec.port(), 80);
    }
}
