//! Probe proxy configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port the probe proxy listens on
pub const DEFAULT_LISTEN_PORT: u16 = 8585;

/// Where the supervised child serves its own probes
pub const DEFAULT_TARGET_BASE_URL: &str = "http://127.0.0.1:8888";

/// How long an operator override stays in effect
pub const DEFAULT_OVERRIDE_TTL: Duration = Duration::from_secs(30 * 60);

/// Deadline for a single upstream probe request
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe endpoints served by the proxy
pub const PROBE_ENDPOINTS: &[&str] = &["healthz", "isReady"];

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub target_base_url: String,
    pub override_ttl: Duration,
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_LISTEN_PORT)),
            target_base_url: DEFAULT_TARGET_BASE_URL.to_string(),
            override_ttl: DEFAULT_OVERRIDE_TTL,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    /// Upstream URL for a probe endpoint
    pub fn target_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.target_base_url.trim_end_matches('/'), endpoint)
    }
}
