pub mod body;
pub mod ca;
pub mod http_handler;
pub mod proxy_client;
pub mod resolver;
pub mod server;

pub use http_handler::GatewayHandler;
pub use proxy_client::ProxyClient;
pub use resolver::HttpResolver;
pub use server::GatewayServer;
