use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::GatewayConfig;
use crate::core::health::PassiveHealthStore;
use crate::core::route_cache::RouteCache;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Shared, immutable-after-startup gateway state threaded through the
/// handlers: configuration plus the two concurrent stores.
#[derive(Debug)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub route_cache: Arc<RouteCache>,
    pub passive_health: Arc<PassiveHealthStore>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        let route_cache = Arc::new(RouteCache::new(
            config.cache_ttl(),
            config.cache_max_entries,
        ));
        let passive_health = Arc::new(PassiveHealthStore::new(
            config.failure_threshold,
            config.passive_unhealthy_ttl(),
        ));
        Self {
            config,
            route_cache,
            passive_health,
        }
    }

    /// Periodically evicts expired cache and health entries so neither map
    /// accumulates tenants that stopped receiving traffic.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let cache_evicted = state.route_cache.sweep_expired();
                let health_evicted = state.passive_health.sweep_expired();
                if cache_evicted > 0 || health_evicted > 0 {
                    tracing::debug!(
                        cache_evicted,
                        health_evicted,
                        "swept expired gateway state"
                    );
                }
            }
        })
    }
}
