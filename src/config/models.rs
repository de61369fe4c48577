use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Gateway configuration. Values come from an optional YAML file with
/// environment variables layered on top; see [`crate::config::loader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Domain suffix tenant subdomains hang off of. Required.
    pub server_domain: String,
    /// Base URL of the resolution API.
    pub backend_url: Url,
    /// Backend proxied to when no tenant or no routes can be resolved.
    pub default_backend: Option<Url>,

    /// Route cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Route cache size cap.
    pub cache_max_entries: usize,

    /// TTL of a passive-failure record in seconds.
    pub passive_unhealthy_ttl_secs: u64,
    /// Consecutive failures after which a route is demoted.
    pub failure_threshold: u32,
    /// Upper bound on proxy attempts per request.
    pub failover_max_retries: usize,

    /// Attempts per resolution API version.
    pub backend_max_retries: u32,
    /// Delay between resolution attempts in milliseconds.
    pub backend_retry_delay_ms: u64,
    /// Per-attempt resolution request timeout in seconds.
    pub backend_timeout_secs: u64,

    /// Per-attempt backend connect (and TLS handshake) budget in seconds.
    pub proxy_connect_timeout_secs: u64,
    /// Request-body ceiling in bytes.
    pub max_body_bytes: u64,

    /// Where the CA bundle fetched at startup is written and read back.
    pub ca_bundle_path: PathBuf,

    pub http_addr: SocketAddr,
    pub https_addr: SocketAddr,
    /// PEM certificate/key for the wildcard listener. HTTPS is disabled
    /// unless both are set.
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_domain: String::new(),
            backend_url: Url::parse("http://localhost:8192")
                .expect("default backend url is valid"),
            default_backend: None,
            cache_ttl_secs: 60,
            cache_max_entries: 10_000,
            passive_unhealthy_ttl_secs: 60,
            failure_threshold: 3,
            failover_max_retries: 3,
            backend_max_retries: 3,
            backend_retry_delay_ms: 150,
            backend_timeout_secs: 5,
            proxy_connect_timeout_secs: 5,
            max_body_bytes: 20 * 1024 * 1024 * 1024,
            ca_bundle_path: PathBuf::from("/tmp/mesh-gateway-ca.pem"),
            http_addr: "0.0.0.0:80".parse().expect("default http addr is valid"),
            https_addr: "0.0.0.0:443".parse().expect("default https addr is valid"),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl GatewayConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn passive_unhealthy_ttl(&self) -> Duration {
        Duration::from_secs(self.passive_unhealthy_ttl_secs)
    }

    pub fn backend_retry_delay(&self) -> Duration {
        Duration::from_millis(self.backend_retry_delay_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn proxy_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_connect_timeout_secs)
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }
}
