use serde::{Deserialize, Serialize};

pub const DEFAULT_ROUTE_PORT: u16 = 443;
pub const DEFAULT_ROUTE_PRIORITY: i64 = 999;

/// Wire protocol spoken to a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Origin tag of a route. `agent` and `tunnel` carry semantics (protocol
/// derivation and force-routing); any other tag is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteSource {
    Agent,
    Tunnel,
    #[serde(untagged)]
    Other(String),
}

impl RouteSource {
    pub fn as_str(&self) -> &str {
        match self {
            RouteSource::Agent => "agent",
            RouteSource::Tunnel => "tunnel",
            RouteSource::Other(tag) => tag,
        }
    }
}

/// Health-check hint attached to a route by the resolution API. Recognized
/// for schema compatibility; the gateway tracks health passively and does
/// not probe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// One candidate backend for a tenant. Routes are immutable value objects;
/// selection and health tracking never mutate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(default)]
    pub source: Option<RouteSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,
}

fn default_port() -> u16 {
    DEFAULT_ROUTE_PORT
}

fn default_priority() -> i64 {
    DEFAULT_ROUTE_PRIORITY
}

impl Route {
    /// Protocol actually spoken on the wire. Tunnel routes terminate TLS at
    /// the tunnel endpoint, so they are always plain http regardless of the
    /// advertised scheme.
    pub fn wire_protocol(&self) -> Scheme {
        if matches!(self.source, Some(RouteSource::Tunnel)) {
            Scheme::Http
        } else {
            self.scheme
        }
    }

    /// The host part of a URL authority; IPv6 literals are bracketed.
    pub fn host_part(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]", self.ip)
        } else {
            self.ip.clone()
        }
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host_part(), self.port)
    }

    /// Key under which passive-health state for this backend is tracked.
    pub fn health_key(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn source_tag(&self) -> &str {
        self.source
            .as_ref()
            .map(RouteSource::as_str)
            .unwrap_or("unknown")
    }
}

/// Response of the v2 resolution API, also the internal representation a
/// cache hit or an upgraded v1 response is reshaped into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub server_domain: Option<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub routes_ttl: Option<u64>,
    #[serde(default)]
    pub last_seen_online: Option<String>,
}

impl Resolution {
    pub fn from_cached_routes(routes: Vec<Route>) -> Self {
        Resolution {
            routes,
            ..Default::default()
        }
    }
}

/// Response of the legacy v1 resolution API: a single backend address.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyResolution {
    pub host_ip: String,
    #[serde(default)]
    pub target_port: Option<u16>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub server_domain: Option<String>,
}

impl From<LegacyResolution> for Resolution {
    fn from(legacy: LegacyResolution) -> Self {
        Resolution {
            user_id: legacy.user_id,
            domain_name: legacy.domain_name,
            server_domain: legacy.server_domain,
            routes: vec![Route {
                ip: legacy.host_ip,
                port: legacy.target_port.unwrap_or(DEFAULT_ROUTE_PORT),
                priority: 1,
                scheme: Scheme::default(),
                source: None,
                health_check: None,
            }],
            routes_ttl: None,
            last_seen_online: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_field_defaults() {
        let route: Route = serde_json::from_str(r#"{"ip":"203.0.113.5"}"#)
            .expect("minimal route should deserialize");
        assert_eq!(route.port, 443);
        assert_eq!(route.priority, 999);
        assert_eq!(route.scheme, Scheme::Https);
        assert_eq!(route.source, None);
        assert_eq!(route.health_check, None);
    }

    #[test]
    fn test_route_source_tags() {
        let route: Route =
            serde_json::from_str(r#"{"ip":"203.0.113.5","source":"agent"}"#).unwrap();
        assert_eq!(route.source, Some(RouteSource::Agent));
        assert_eq!(route.source_tag(), "agent");

        let route: Route =
            serde_json::from_str(r#"{"ip":"203.0.113.5","source":"gateway"}"#).unwrap();
        assert_eq!(route.source, Some(RouteSource::Other("gateway".to_string())));
        assert_eq!(route.source_tag(), "gateway");
    }

    #[test]
    fn test_tunnel_routes_always_speak_http() {
        let tunnel: Route =
            serde_json::from_str(r#"{"ip":"203.0.113.5","scheme":"https","source":"tunnel"}"#)
                .unwrap();
        assert_eq!(tunnel.wire_protocol(), Scheme::Http);

        let agent: Route =
            serde_json::from_str(r#"{"ip":"203.0.113.5","scheme":"https","source":"agent"}"#)
                .unwrap();
        assert_eq!(agent.wire_protocol(), Scheme::Https);

        let untagged: Route = serde_json::from_str(r#"{"ip":"203.0.113.5"}"#).unwrap();
        assert_eq!(untagged.wire_protocol(), Scheme::Https);
    }

    #[test]
    fn test_ipv6_authority_is_bracketed() {
        let route: Route =
            serde_json::from_str(r#"{"ip":"2001:db8::1","port":8443}"#).unwrap();
        assert_eq!(route.authority(), "[2001:db8::1]:8443");
        assert_eq!(route.health_key(), "2001:db8::1:8443");

        let route: Route = serde_json::from_str(r#"{"ip":"203.0.113.5"}"#).unwrap();
        assert_eq!(route.authority(), "203.0.113.5:443");
    }

    #[test]
    fn test_legacy_resolution_upgrade() {
        let legacy: LegacyResolution =
            serde_json::from_str(r#"{"hostIp":"198.51.100.7","targetPort":8080}"#).unwrap();
        let resolution: Resolution = legacy.into();
        assert_eq!(resolution.routes.len(), 1);
        let route = &resolution.routes[0];
        assert_eq!(route.ip, "198.51.100.7");
        assert_eq!(route.port, 8080);
        assert_eq!(route.priority, 1);
    }

    #[test]
    fn test_legacy_resolution_default_port() {
        let legacy: LegacyResolution =
            serde_json::from_str(r#"{"hostIp":"198.51.100.7"}"#).unwrap();
        let resolution: Resolution = legacy.into();
        assert_eq!(resolution.routes[0].port, 443);
    }

    #[test]
    fn test_v2_resolution_parses() {
        let body = r#"{
            "userId": "u-1",
            "domainName": "alice.example.com",
            "serverDomain": "example.com",
            "routes": [
                {"ip": "203.0.113.5", "port": 443, "priority": 1, "source": "agent"},
                {"ip": "203.0.113.9", "priority": 2, "source": "tunnel"}
            ],
            "routesTtl": 120
        }"#;
        let resolution: Resolution = serde_json::from_str(body).unwrap();
        assert_eq!(resolution.user_id.as_deref(), Some("u-1"));
        assert_eq!(resolution.routes.len(), 2);
        assert_eq!(resolution.routes_ttl, Some(120));
        assert_eq!(resolution.routes[1].port, 443);
    }
}
