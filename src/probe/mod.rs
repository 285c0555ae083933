//! Probe override proxy
//!
//! Fronts the child's liveness and readiness endpoints. Each probe is either
//! relayed to the child over loopback or answered directly from an
//! operator-installed override that lapses after a fixed TTL.
//!
//! ```text
//!   kubelet ──▶ :8585/healthz ──┬─ override set ──▶ 200 / 500
//!                               └─ passthrough ───▶ 127.0.0.1:8888/healthz
//!   operator ─▶ :8585/setOverride/healthz?mode=Failure
//! ```

mod handlers;
mod override_state;
mod registry;

pub use handlers::{forwarded_headers, SET_OVERRIDE_PREFIX};
pub use override_state::{
    format_duration, InvalidOverrideMode, OverrideMode, OverrideRecord, OverrideState,
};
pub use registry::{EndpointRegistry, ProbeEndpoint};

use axum::{http::HeaderMap, routing::any, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;

/// State shared by every request handler
#[derive(Clone)]
pub struct ProxyState {
    pub registry: Arc<EndpointRegistry>,
    pub client: reqwest::Client,
    pub override_ttl: Duration,
}

/// HTTP front for the child's probe endpoints
pub struct ProbeProxy {
    config: ProxyConfig,
    state: ProxyState,
}

impl ProbeProxy {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        // The child is on loopback; never route probes through an env proxy
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(ProxyError::Client)?;

        let state = ProxyState {
            registry: Arc::new(EndpointRegistry::new(&config)),
            client,
            override_ttl: config.override_ttl,
        };

        Ok(Self { config, state })
    }

    /// Registry backing this proxy's overrides
    pub fn registry(&self) -> Arc<EndpointRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Build the axum router
    pub fn router(&self) -> Router {
        let mut router: Router<ProxyState> = Router::new();

        for endpoint in self.state.registry.iter() {
            let name = endpoint.name;
            router = router.route(
                &format!("/{}", name),
                any(
                    move |axum::extract::State(state): axum::extract::State<ProxyState>,
                          headers: HeaderMap| async move {
                        handlers::probe(state, name, headers).await
                    },
                ),
            );
        }

        router
            .route("/setOverride/{endpoint}", any(handlers::set_override))
            .fallback(handlers::fallback)
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until the process exits
    pub async fn run(self) -> Result<(), ProxyError> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Bind { addr, source: e })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), ProxyError> {
        let addr = listener.local_addr().map_err(ProxyError::Serve)?;
        log::info!(
            "Serving probe proxies on {}, target_base_url={}",
            addr,
            self.config.target_base_url
        );

        axum::serve(listener, self.router())
            .await
            .map_err(ProxyError::Serve)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to bind probe proxy on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Probe proxy server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Failed to create health probe request to child process: {0}")]
    BuildRequest(#[source] reqwest::Error),

    #[error("Failed to send health probe request to child process: {0}")]
    Send(#[source] reqwest::Error),

    #[error("Failed to read health probe response from child process: {0}")]
    ReadBody(#[source] reqwest::Error),
}
