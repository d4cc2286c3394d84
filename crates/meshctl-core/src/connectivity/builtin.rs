//! Built-in connectivity tests.

use async_trait::async_trait;
use std::net::IpAddr;
use tokio::net::{TcpStream, lookup_host};

use super::test::{Test, TestContext, TestFailure};

/// Split `host:port` (or `[v6]:port`) into its parts.
pub fn split_target(target: &str) -> Option<(&str, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    let port = port.parse().ok()?;
    Some((host, port))
}

/// Whether the host part of a target is a literal address.
pub fn is_ip_literal(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

/// Completes a TCP handshake with a `host:port` target.
pub struct TcpConnect {
    name: String,
    target: String,
}

impl TcpConnect {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            name: format!("tcp-connect/{}", target),
            target,
        }
    }
}

#[async_trait]
impl Test for TcpConnect {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "TCP handshake with the target"
    }

    async fn run(&self, _ctx: &TestContext) -> Result<(), TestFailure> {
        let stream = TcpStream::connect(&self.target)
            .await
            .map_err(|e| TestFailure::new(format!("connect to {}: {}", self.target, e)))?;
        tracing::debug!(target_addr = %self.target, peer = ?stream.peer_addr().ok(), "tcp connect succeeded");
        Ok(())
    }
}

/// Resolves a host name.
pub struct DnsLookup {
    name: String,
    host: String,
}

impl DnsLookup {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            name: format!("dns-lookup/{}", host),
            host,
        }
    }
}

#[async_trait]
impl Test for DnsLookup {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Resolve the target host name"
    }

    async fn run(&self, _ctx: &TestContext) -> Result<(), TestFailure> {
        let addrs: Vec<_> = lookup_host((self.host.as_str(), 0))
            .await
            .map_err(|e| TestFailure::new(format!("resolve {}: {}", self.host, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(TestFailure::new(format!("{} resolved to no addresses", self.host)));
        }
        tracing::debug!(host = %self.host, addresses = addrs.len(), "dns lookup succeeded");
        Ok(())
    }
}
