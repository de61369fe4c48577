use std::net::SocketAddr;

use http::Request;
use http::header;
use rand::Rng;

use crate::core::selector::ForceMode;

/// Host override used by CDN-fallback deployments where the edge rewrites
/// the visible `Host` header.
pub const HEADER_ROUTE_HOST: &str = "x-mesh-route-host";
/// Forces route selection to a single source tag.
pub const HEADER_FORCE: &str = "x-mesh-force";
/// Presence enables the `X-Mesh-Route` response header.
pub const HEADER_TRACE: &str = "x-mesh-trace";
/// Response header carrying the chain of attempted route sources.
pub const HEADER_ROUTE: &str = "x-mesh-route";
pub const HEADER_REQUEST_ID: &str = "x-request-id";
pub const HEADER_REAL_IP: &str = "x-real-ip";
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
pub const HEADER_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const HEADER_FORWARDED_HOST: &str = "x-forwarded-host";

/// Scheme the client used to reach the gateway, stamped per listener.
#[derive(Debug, Clone, Copy)]
pub struct ClientScheme(pub &'static str);

/// Per-request facts threaded through the resolution and proxy stages.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 24-bit hex request id, also forwarded as `X-Request-ID`.
    pub req_id: String,
    /// Host the client actually sent.
    pub original_host: String,
    /// Host used for tenant extraction and forwarded as `Host`; differs
    /// from the original only when `X-Mesh-Route-Host` is present.
    pub proxy_host: String,
    pub client_addr: Option<SocketAddr>,
    pub client_scheme: &'static str,
    pub force: ForceMode,
    pub trace: bool,
}

impl RequestContext {
    /// Builds the context from request headers. Returns `None` when no
    /// usable host can be determined at all.
    pub fn from_request<B>(
        req: &Request<B>,
        client_addr: Option<SocketAddr>,
        client_scheme: &'static str,
    ) -> Option<Self> {
        let original_host = header_str(req, header::HOST.as_str())
            .map(str::to_string)
            .or_else(|| req.uri().host().map(str::to_string))?;
        let proxy_host = header_str(req, HEADER_ROUTE_HOST)
            .map(str::to_string)
            .unwrap_or_else(|| original_host.clone());

        Some(RequestContext {
            req_id: new_request_id(),
            original_host,
            proxy_host,
            client_addr,
            client_scheme,
            force: ForceMode::from_header(header_str(req, HEADER_FORCE)),
            trace: req.headers().contains_key(HEADER_TRACE),
        })
    }
}

fn header_str<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}

pub fn new_request_id() -> String {
    format!("{:06x}", rand::rng().random_range(0u32..0x0100_0000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_request_id_is_24_bit_hex() {
        for _ in 0..32 {
            let id = new_request_id();
            assert_eq!(id.len(), 6);
            assert!(u32::from_str_radix(&id, 16).is_ok());
        }
    }

    #[test]
    fn test_host_header_is_default_source() {
        let req = request(&[("host", "alice.example.com")]);
        let ctx = RequestContext::from_request(&req, None, "https").unwrap();
        assert_eq!(ctx.original_host, "alice.example.com");
        assert_eq!(ctx.proxy_host, "alice.example.com");
        assert!(!ctx.trace);
        assert_eq!(ctx.force, ForceMode::None);
    }

    #[test]
    fn test_route_host_overrides_proxy_host_only() {
        let req = request(&[
            ("host", "edge.cdn.net"),
            ("x-mesh-route-host", "alice.example.com"),
        ]);
        let ctx = RequestContext::from_request(&req, None, "https").unwrap();
        assert_eq!(ctx.original_host, "edge.cdn.net");
        assert_eq!(ctx.proxy_host, "alice.example.com");
    }

    #[test]
    fn test_trace_and_force_flags() {
        let req = request(&[
            ("host", "alice.example.com"),
            ("x-mesh-trace", "1"),
            ("x-mesh-force", "tunnel"),
        ]);
        let ctx = RequestContext::from_request(&req, None, "http").unwrap();
        assert!(ctx.trace);
        assert_eq!(ctx.force, ForceMode::Tunnel);
    }

    #[test]
    fn test_missing_host_yields_none() {
        let req = request(&[]);
        assert!(RequestContext::from_request(&req, None, "http").is_none());
    }
}
