use std::sync::Arc;
use std::time::Duration;

use axum::body::Body as AxumBody;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{Method, Request, StatusCode, header};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::config::GatewayConfig;
use crate::core::route::{LegacyResolution, Resolution};
use crate::core::route_cache::RouteCache;
use crate::metrics;
use crate::ports::resolver::{ResolveError, Resolver};

type ResolutionClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, AxumBody>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiVersion {
    V2,
    V1,
}

impl ApiVersion {
    fn as_str(self) -> &'static str {
        match self {
            ApiVersion::V2 => "v2",
            ApiVersion::V1 => "v1",
        }
    }
}

/// One resolution round against a single API version, after retries.
enum FetchOutcome {
    Success(Resolution),
    /// The backend answered with a non-200 status.
    NotFound,
    /// The backend answered 200 with an undecodable body.
    Invalid(String),
    /// Every attempt failed at the transport layer.
    Transport(String),
}

/// HTTP client for the resolution API, fronted by the shared route cache.
///
/// The v2 endpoint is authoritative; v1 is consulted when v2 cannot answer,
/// and its single-address responses are reshaped into the v2 form. Cache
/// misses for the same tenant may race and each query the backend; the
/// operation is idempotent so no single-flight is needed.
pub struct HttpResolver {
    client: ResolutionClient,
    base_url: Url,
    cache: Arc<RouteCache>,
    max_retries: u32,
    retry_delay: Duration,
    request_timeout: Duration,
}

impl HttpResolver {
    pub fn new(
        config: &GatewayConfig,
        tls: Arc<rustls::ClientConfig>,
        cache: Arc<RouteCache>,
    ) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config((*tls).clone())
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);
        Self {
            client,
            base_url: config.backend_url.clone(),
            cache,
            max_retries: config.backend_max_retries,
            retry_delay: config.backend_retry_delay(),
            request_timeout: config.backend_timeout(),
        }
    }

    fn endpoint(&self, version: ApiVersion, tenant: &str) -> Result<Url, ResolveError> {
        let path = match version {
            ApiVersion::V2 => format!("resolve/v2/{tenant}"),
            ApiVersion::V1 => format!("resolve/{tenant}"),
        };
        self.base_url
            .join(&path)
            .map_err(|err| ResolveError::Unavailable(format!("invalid resolve url: {err}")))
    }

    async fn fetch_version(&self, version: ApiVersion, tenant: &str) -> FetchOutcome {
        let url = match self.endpoint(version, tenant) {
            Ok(url) => url,
            Err(err) => return FetchOutcome::Transport(err.to_string()),
        };

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay).await;
            }
            match self.fetch_once(url.as_str()).await {
                Ok((status, body)) => {
                    if !status.is_success() {
                        tracing::debug!(
                            tenant,
                            version = version.as_str(),
                            status = %status,
                            "resolution backend does not know the tenant"
                        );
                        metrics::increment_resolution(version.as_str(), "not_found");
                        return FetchOutcome::NotFound;
                    }
                    return match decode(version, &body) {
                        Ok(resolution) => {
                            metrics::increment_resolution(version.as_str(), "success");
                            FetchOutcome::Success(resolution)
                        }
                        Err(err) => {
                            metrics::increment_resolution(version.as_str(), "invalid");
                            FetchOutcome::Invalid(err)
                        }
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        tenant,
                        version = version.as_str(),
                        attempt,
                        max_attempts = self.max_retries,
                        error = %err,
                        "resolution attempt failed"
                    );
                    last_error = err;
                }
            }
        }
        metrics::increment_resolution(version.as_str(), "transport_error");
        FetchOutcome::Transport(last_error)
    }

    async fn fetch_once(&self, url: &str) -> Result<(StatusCode, Bytes), String> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header(header::ACCEPT, "application/json")
            .body(AxumBody::empty())
            .map_err(|err| err.to_string())?;

        let response = tokio::time::timeout(self.request_timeout, self.client.request(req))
            .await
            .map_err(|_| format!("request to {url} timed out"))?
            .map_err(|err| err.to_string())?;

        let (parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|err| err.to_string())?
            .to_bytes();
        Ok((parts.status, bytes))
    }
}

fn decode(version: ApiVersion, body: &[u8]) -> Result<Resolution, String> {
    match version {
        ApiVersion::V2 => serde_json::from_slice::<Resolution>(body).map_err(|err| err.to_string()),
        ApiVersion::V1 => serde_json::from_slice::<LegacyResolution>(body)
            .map(Resolution::from)
            .map_err(|err| err.to_string()),
    }
}

impl Resolver for HttpResolver {
    async fn resolve(&self, tenant: &str) -> Result<Resolution, ResolveError> {
        if let Some(routes) = self.cache.get(tenant) {
            tracing::debug!(tenant, routes = routes.len(), "route cache hit");
            metrics::increment_cache_event("hit");
            return Ok(Resolution::from_cached_routes(routes));
        }
        metrics::increment_cache_event("miss");

        let resolution = match self.fetch_version(ApiVersion::V2, tenant).await {
            FetchOutcome::Success(resolution) => resolution,
            FetchOutcome::Invalid(err) => return Err(ResolveError::InvalidResponse(err)),
            first @ (FetchOutcome::NotFound | FetchOutcome::Transport(_)) => {
                // NOT_FOUND means both versions answered with a non-200
                // status. When v2 never answered, the overall result is the
                // outage, whatever v1 said.
                let v2_outage = match first {
                    FetchOutcome::Transport(err) => Some(err),
                    _ => None,
                };
                match self.fetch_version(ApiVersion::V1, tenant).await {
                    FetchOutcome::Success(resolution) => resolution,
                    FetchOutcome::Invalid(err) => return Err(ResolveError::InvalidResponse(err)),
                    FetchOutcome::NotFound => {
                        return Err(match v2_outage {
                            Some(err) => ResolveError::Unavailable(err),
                            None => ResolveError::NotFound,
                        });
                    }
                    FetchOutcome::Transport(err) => {
                        return Err(match v2_outage {
                            Some(_) => ResolveError::Unavailable(err),
                            // A definitive v2 "unknown tenant" wins over a
                            // v1 outage.
                            None => ResolveError::NotFound,
                        });
                    }
                }
            }
        };

        if resolution.routes.is_empty() {
            return Err(ResolveError::NoRoutes);
        }

        let ttl_override = resolution.routes_ttl.map(Duration::from_secs);
        self.cache
            .insert(tenant, resolution.routes.clone(), ttl_override);
        tracing::debug!(tenant, routes = resolution.routes.len(), "resolution cached");
        Ok(resolution)
    }
}
