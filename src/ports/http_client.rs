use axum::body::Body as AxumBody;
use hyper::body::Incoming;
use hyper::{Request, Response};
use thiserror::Error;
use url::Url;

use crate::core::route::{Route, Scheme};

/// One concrete backend address a proxy attempt connects to.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub protocol: Scheme,
    /// IP literal (or hostname for the default backend), unbracketed.
    pub host: String,
    pub port: u16,
    /// TLS server name presented during the handshake. Certificate checks
    /// run against this name rather than the raw IP.
    pub sni_host: Option<String>,
    /// Disabled only for the default backend, which is expected on-box.
    pub verify_tls: bool,
}

impl ProxyTarget {
    pub fn from_route(route: &Route, sni_host: &str) -> Self {
        Self {
            protocol: route.wire_protocol(),
            host: route.ip.clone(),
            port: route.port,
            sni_host: Some(sni_host.to_string()),
            verify_tls: true,
        }
    }

    pub fn from_url(url: &Url, verify_tls: bool) -> Result<Self, ProxyError> {
        let protocol = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(ProxyError::InvalidTarget(format!(
                    "unsupported scheme '{other}' in {url}"
                )));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::InvalidTarget(format!("missing host in {url}")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or(protocol.default_port());
        Ok(Self {
            protocol,
            host,
            port,
            sni_host: None,
            verify_tls,
        })
    }

    /// URL authority for this target; IPv6 hosts are bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Errors raised by one proxy attempt, before any response headers arrive.
/// Once a backend produces an HTTP response - whatever the status - the
/// attempt counts as a success and the response is forwarded verbatim.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("connection to {authority} failed: {source}")]
    Connect {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {authority} timed out")]
    ConnectTimeout { authority: String },

    #[error("tls handshake with {authority} failed: {source}")]
    Tls {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid proxy target: {0}")]
    InvalidTarget(String),

    #[error("request to {authority} failed: {source}")]
    Http {
        authority: String,
        #[source]
        source: hyper::Error,
    },

    #[error("request body could not be replayed: {0}")]
    Body(String),
}

/// Substrings that identify a retriable transport failure when the typed
/// taxonomy cannot, matched case-insensitively against the error message.
/// Catch-all for errors opaque to the TCP/TLS/DNS stack boundaries.
pub const RETRIABLE_MESSAGE_PARTS: &[&str] = &[
    "connection refused",
    "connection reset by peer",
    "no route to host",
    "network is unreachable",
    "timeout",
    "connection timed out",
    "handshake failed",
    "certificate verify failed",
    "ssl handshake failed",
    "bad ssl client hello",
];

pub fn message_is_retriable(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    RETRIABLE_MESSAGE_PARTS.iter().any(|part| lower.contains(part))
}

impl ProxyError {
    /// Whether the failover loop should move on to the next route. Connect
    /// and handshake failures always are; request-level failures only when
    /// the connection died before a response, or the opaque message matches
    /// the retriable list.
    pub fn is_retriable(&self) -> bool {
        match self {
            ProxyError::Connect { .. }
            | ProxyError::ConnectTimeout { .. }
            | ProxyError::Tls { .. } => true,
            ProxyError::Http { source, .. } => {
                source.is_incomplete_message() || message_is_retriable(&source.to_string())
            }
            ProxyError::InvalidTarget(_) | ProxyError::Body(_) => false,
        }
    }
}

/// ProxyConnector defines the port (interface) for executing one proxy
/// attempt against a backend target.
pub trait ProxyConnector: Send + Sync + 'static {
    /// Connect to the target and exchange the request for a response.
    ///
    /// The request must carry an origin-form URI; target addressing comes
    /// from `target`, not from the URI.
    fn send(
        &self,
        target: &ProxyTarget,
        req: Request<AxumBody>,
    ) -> impl std::future::Future<Output = Result<Response<Incoming>, ProxyError>> + Send;
}
