/// Mesh Gateway - a multi-tenant wildcard-subdomain reverse proxy
///
/// This crate maps `*.SERVER_DOMAIN` traffic onto dynamically-registered
/// backends:
/// - Tenant extraction from the request host
/// - Resolution through a two-version backend API with an in-process cache
/// - Priority-ordered failover with passive health tracking
/// - Transparent WebSocket/streaming upgrade relay
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod ports;

// These modules are implementation details and should not be directly used
// by consumers
pub(crate) mod adapters;
pub(crate) mod core;

pub mod metrics;
pub mod tracing_setup;

// Re-export the specific types needed by the binary crate
pub use crate::adapters::ca::{bootstrap_ca_bundle, client_tls_config, load_root_store};
pub use crate::adapters::http_handler::GatewayHandler;
pub use crate::adapters::proxy_client::ProxyClient;
pub use crate::adapters::resolver::HttpResolver;
pub use crate::adapters::server::GatewayServer;
pub use crate::core::GatewayState;
