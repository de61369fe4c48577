use crate::core::health::PassiveHealthStore;
use crate::core::route::Route;

/// Forced-routing override taken from the `X-Mesh-Force` request header.
/// Each mode pins the failover sequence to the first route carrying the
/// corresponding source tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForceMode {
    #[default]
    None,
    Direct,
    Tunnel,
    Gateway,
}

impl ForceMode {
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("direct") => ForceMode::Direct,
            Some(v) if v.eq_ignore_ascii_case("tunnel") => ForceMode::Tunnel,
            Some(v) if v.eq_ignore_ascii_case("gateway") => ForceMode::Gateway,
            _ => ForceMode::None,
        }
    }

    fn wanted_tag(self) -> Option<&'static str> {
        match self {
            ForceMode::None => None,
            ForceMode::Direct => Some("agent"),
            ForceMode::Tunnel => Some("tunnel"),
            ForceMode::Gateway => Some("gateway"),
        }
    }
}

/// Build the ordered sequence of routes the proxy loop will attempt.
///
/// A force mode short-circuits to a single matching route; without one the
/// input is partitioned into passively-healthy and unhealthy pools, each
/// pool sorted ascending by priority (stable, so ties keep their input
/// order), and the unhealthy pool appended as last resort. Unhealthy routes
/// are demoted rather than dropped so a stale health signal cannot black
/// out a tenant.
pub fn failover_sequence(
    routes: &[Route],
    force: ForceMode,
    health: &PassiveHealthStore,
) -> Vec<Route> {
    if let Some(tag) = force.wanted_tag() {
        if let Some(route) = routes.iter().find(|r| r.source_tag() == tag) {
            return vec![route.clone()];
        }
        tracing::warn!(
            force = tag,
            "no route matches the forced source, falling back to priority order"
        );
    }

    let (mut healthy, mut unhealthy): (Vec<Route>, Vec<Route>) = routes
        .iter()
        .cloned()
        .partition(|route| !health.is_unhealthy(&route.health_key()));

    healthy.sort_by_key(|route| route.priority);
    unhealthy.sort_by_key(|route| route.priority);

    healthy.extend(unhealthy);
    healthy
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn route(ip: &str, priority: i64, source: &str) -> Route {
        serde_json::from_str(&format!(
            r#"{{"ip":"{ip}","priority":{priority},"source":"{source}"}}"#
        ))
        .unwrap()
    }

    fn health() -> PassiveHealthStore {
        PassiveHealthStore::new(3, Duration::from_secs(60))
    }

    #[test]
    fn test_priority_order_without_force() {
        let routes = vec![
            route("10.0.0.2", 2, "tunnel"),
            route("10.0.0.1", 1, "agent"),
            route("10.0.0.3", 3, "relay"),
        ];
        let seq = failover_sequence(&routes, ForceMode::None, &health());
        let ips: Vec<&str> = seq.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let routes = vec![
            route("10.0.0.1", 1, "agent"),
            route("10.0.0.2", 1, "tunnel"),
            route("10.0.0.3", 1, "relay"),
        ];
        let seq = failover_sequence(&routes, ForceMode::None, &health());
        let ips: Vec<&str> = seq.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_force_tunnel_pins_single_route() {
        let routes = vec![
            route("10.0.0.1", 1, "agent"),
            route("10.0.0.2", 2, "tunnel"),
        ];
        let seq = failover_sequence(&routes, ForceMode::Tunnel, &health());
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].ip, "10.0.0.2");
    }

    #[test]
    fn test_force_direct_ignores_health() {
        let routes = vec![
            route("10.0.0.1", 1, "agent"),
            route("10.0.0.2", 2, "tunnel"),
        ];
        let health = health();
        for _ in 0..3 {
            health.mark_failed("10.0.0.1:443");
        }
        let seq = failover_sequence(&routes, ForceMode::Direct, &health);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].ip, "10.0.0.1");
    }

    #[test]
    fn test_force_without_match_falls_through() {
        let routes = vec![
            route("10.0.0.2", 2, "tunnel"),
            route("10.0.0.1", 1, "tunnel"),
        ];
        let seq = failover_sequence(&routes, ForceMode::Direct, &health());
        let ips: Vec<&str> = seq.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_unhealthy_routes_are_demoted_not_dropped() {
        let routes = vec![
            route("10.0.0.1", 1, "agent"),
            route("10.0.0.2", 2, "tunnel"),
        ];
        let health = health();
        for _ in 0..3 {
            health.mark_failed("10.0.0.1:443");
        }
        let seq = failover_sequence(&routes, ForceMode::None, &health);
        let ips: Vec<&str> = seq.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn test_priorities_sorted_within_each_pool() {
        let routes = vec![
            route("10.0.0.4", 4, "agent"),
            route("10.0.0.1", 1, "agent"),
            route("10.0.0.3", 3, "agent"),
            route("10.0.0.2", 2, "agent"),
        ];
        let health = health();
        for _ in 0..3 {
            health.mark_failed("10.0.0.1:443");
        }
        for _ in 0..3 {
            health.mark_failed("10.0.0.3:443");
        }
        let seq = failover_sequence(&routes, ForceMode::None, &health);
        let ips: Vec<&str> = seq.iter().map(|r| r.ip.as_str()).collect();
        // Healthy pool first in priority order, then the unhealthy pool in
        // priority order.
        assert_eq!(ips, vec!["10.0.0.2", "10.0.0.4", "10.0.0.1", "10.0.0.3"]);
    }

    #[test]
    fn test_force_header_parsing() {
        assert_eq!(ForceMode::from_header(None), ForceMode::None);
        assert_eq!(ForceMode::from_header(Some("direct")), ForceMode::Direct);
        assert_eq!(ForceMode::from_header(Some(" Tunnel ")), ForceMode::Tunnel);
        assert_eq!(ForceMode::from_header(Some("gateway")), ForceMode::Gateway);
        assert_eq!(ForceMode::from_header(Some("bogus")), ForceMode::None);
        assert_eq!(ForceMode::from_header(Some("")), ForceMode::None);
    }
}
