//! Probe endpoint registry

use std::collections::HashMap;

use super::override_state::OverrideRecord;
use crate::config::{ProxyConfig, PROBE_ENDPOINTS};

/// A proxied probe endpoint and its override
#[derive(Debug)]
pub struct ProbeEndpoint {
    pub name: &'static str,
    /// Child probe URL this endpoint relays to
    pub target_url: String,
    pub record: OverrideRecord,
}

/// Endpoint name to override mapping, fixed at startup
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: HashMap<&'static str, ProbeEndpoint>,
}

impl EndpointRegistry {
    pub fn new(config: &ProxyConfig) -> Self {
        let endpoints = PROBE_ENDPOINTS
            .iter()
            .map(|&name| {
                let endpoint = ProbeEndpoint {
                    name,
                    target_url: config.target_url(name),
                    record: OverrideRecord::new(),
                };
                (name, endpoint)
            })
            .collect();

        Self { endpoints }
    }

    pub fn get(&self, name: &str) -> Option<&ProbeEndpoint> {
        self.endpoints.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProbeEndpoint> {
        self.endpoints.values()
    }
}
