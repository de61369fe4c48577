pub mod context;
pub mod health;
pub mod host;
pub mod route;
pub mod route_cache;
pub mod selector;
pub mod state;

pub use state::GatewayState;
