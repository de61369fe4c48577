use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Body as AxumBody;
use axum::extract::ConnectInfo;
use axum::response::IntoResponse;
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri, header};
use hyper_util::rt::TokioIo;
use serde_json::json;

use crate::adapters::body::{BufferError, BufferedBody};
use crate::core::GatewayState;
use crate::core::context::{
    ClientScheme, HEADER_FORWARDED_FOR, HEADER_FORWARDED_HOST, HEADER_FORWARDED_PROTO,
    HEADER_REAL_IP, HEADER_REQUEST_ID, HEADER_ROUTE, RequestContext,
};
use crate::core::host::extract_tenant;
use crate::core::route::Route;
use crate::core::selector::failover_sequence;
use crate::metrics;
use crate::ports::http_client::{ProxyConnector, ProxyTarget};
use crate::ports::http_server::HttpHandler;
use crate::ports::resolver::{ResolveError, Resolver};

/// Upgrade protocols that select the single-shot streaming path.
const UPGRADE_PROTOCOLS: &[&str] = &["websocket", "mqtt", "wss"];

/// How a request will be proxied, decided once after route selection.
/// The two paths have different capabilities - buffered bodies and
/// failover versus a raw byte relay - so the split lives in the type
/// rather than in a branch inside one handler.
enum DispatchPlan {
    /// Single-shot streaming upgrade pinned to one route.
    Upgrade(Route),
    /// Buffered-body failover over the selected sequence.
    Failover(Vec<Route>),
}

impl DispatchPlan {
    /// Returns `None` when the sequence is empty and there is nothing to
    /// dispatch to.
    fn for_request(req: &Request<AxumBody>, mut sequence: Vec<Route>) -> Option<Self> {
        if sequence.is_empty() {
            return None;
        }
        if is_upgrade_request(req) {
            Some(DispatchPlan::Upgrade(sequence.swap_remove(0)))
        } else {
            Some(DispatchPlan::Failover(sequence))
        }
    }
}

/// The request-time engine: tenant extraction, resolution, route selection,
/// and the failover proxy loop with passive-health writeback.
///
/// Plain HTTP requests get the failover loop over a replayable buffered
/// body. Streaming upgrades cannot be retried once bytes have crossed, so
/// they take a separate single-shot path pinned to the first route.
pub struct GatewayHandler<R, C> {
    state: Arc<GatewayState>,
    resolver: Arc<R>,
    client: Arc<C>,
}

impl<R: Resolver, C: ProxyConnector> GatewayHandler<R, C> {
    pub fn new(state: Arc<GatewayState>, resolver: Arc<R>, client: Arc<C>) -> Self {
        Self {
            state,
            resolver,
            client,
        }
    }

    async fn dispatch(&self, req: Request<AxumBody>) -> Response<AxumBody> {
        let client_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        let client_scheme = req
            .extensions()
            .get::<ClientScheme>()
            .map(|scheme| scheme.0)
            .unwrap_or("http");

        let Some(ctx) = RequestContext::from_request(&req, client_addr, client_scheme) else {
            return error_response(StatusCode::BAD_REQUEST, "No usable host", "INVALID_HOST");
        };

        let Some(tenant) = extract_tenant(&ctx.proxy_host, &self.state.config.server_domain)
        else {
            tracing::warn!(
                req_id = %ctx.req_id,
                host = %ctx.proxy_host,
                "host does not map to a tenant"
            );
            return self
                .default_backend_or_not_found(&ctx, req, "INVALID_SUBDOMAIN")
                .await;
        };

        let resolution = match self.resolver.resolve(&tenant).await {
            Ok(resolution) => resolution,
            Err(ResolveError::NotFound) => {
                tracing::info!(req_id = %ctx.req_id, tenant = %tenant, "tenant is not registered");
                return self.default_backend_or_not_found(&ctx, req, "NOT_FOUND").await;
            }
            Err(ResolveError::NoRoutes) => {
                tracing::info!(req_id = %ctx.req_id, tenant = %tenant, "tenant has no routes");
                return self.default_backend_or_not_found(&ctx, req, "NO_ROUTES").await;
            }
            Err(err) => {
                tracing::error!(req_id = %ctx.req_id, tenant = %tenant, error = %err, "resolution failed");
                return error_response(
                    StatusCode::BAD_GATEWAY,
                    "Failed to resolve tenant routes",
                    "BACKEND_UNAVAILABLE",
                );
            }
        };

        let sequence =
            failover_sequence(&resolution.routes, ctx.force, &self.state.passive_health);
        tracing::debug!(
            req_id = %ctx.req_id,
            tenant = %tenant,
            routes = sequence.len(),
            "failover sequence selected"
        );
        let Some(plan) = DispatchPlan::for_request(&req, sequence) else {
            return self.default_backend_or_not_found(&ctx, req, "NO_ROUTES").await;
        };

        match plan {
            DispatchPlan::Upgrade(route) => self.proxy_upgrade(&ctx, req, &route).await,
            DispatchPlan::Failover(routes) => self.proxy_with_failover(&ctx, req, &routes).await,
        }
    }

    /// The failover loop: attempt routes in sequence order, forward the
    /// first HTTP response verbatim, and feed the passive-health store on
    /// every attempt. Only transport-level failures before response headers
    /// trigger the next attempt.
    async fn proxy_with_failover(
        &self,
        ctx: &RequestContext,
        req: Request<AxumBody>,
        sequence: &[Route],
    ) -> Response<AxumBody> {
        let (parts, body) = req.into_parts();
        let buffered = match BufferedBody::buffer(body, self.state.config.max_body_bytes).await {
            Ok(buffered) => buffered,
            Err(err @ BufferError::TooLarge { .. }) => {
                tracing::warn!(req_id = %ctx.req_id, error = %err, "request body rejected");
                return error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "Request body too large",
                    "BODY_TOO_LARGE",
                );
            }
            Err(err) => {
                tracing::error!(req_id = %ctx.req_id, error = %err, "failed to buffer request body");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read request body",
                    "BODY_READ_FAILED",
                );
            }
        };
        let content_length = (!buffered.is_empty()).then(|| buffered.len());

        let attempts = sequence.len().min(self.state.config.failover_max_retries);
        let mut tried: Vec<String> = Vec::with_capacity(attempts);

        for route in &sequence[..attempts] {
            tried.push(route.source_tag().to_string());
            let target = ProxyTarget::from_route(route, &ctx.original_host);
            let authority = target.authority();

            let outbound_body = match buffered.to_body() {
                Ok(body) => body,
                Err(err) => {
                    tracing::error!(req_id = %ctx.req_id, error = %err, "request body replay failed");
                    return error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to replay request body",
                        "BODY_READ_FAILED",
                    );
                }
            };
            let outbound = match build_outbound(
                &parts.method,
                &parts.uri,
                &parts.headers,
                ctx,
                outbound_body,
                content_length,
                false,
            ) {
                Ok(outbound) => outbound,
                Err(response) => return response,
            };

            tracing::debug!(
                req_id = %ctx.req_id,
                authority = %authority,
                protocol = target.protocol.as_str(),
                source = route.source_tag(),
                "attempting backend route"
            );
            match self.client.send(&target, outbound).await {
                Ok(response) => {
                    self.state.passive_health.mark_healthy(&route.health_key());
                    metrics::increment_route_attempt(route.source_tag(), "success");
                    tracing::info!(
                        req_id = %ctx.req_id,
                        authority = %authority,
                        status = %response.status(),
                        "forwarding backend response"
                    );
                    let mut response = forward_response(response);
                    if ctx.trace {
                        set_route_trace(&mut response, &tried, "pcs");
                    }
                    return response;
                }
                Err(err) => {
                    let failures = self.state.passive_health.mark_failed(&route.health_key());
                    metrics::increment_route_attempt(route.source_tag(), "failure");
                    let retriable = err.is_retriable();
                    tracing::warn!(
                        req_id = %ctx.req_id,
                        authority = %authority,
                        failures,
                        retriable,
                        error = %err,
                        "backend attempt failed"
                    );
                    if !retriable {
                        break;
                    }
                }
            }
        }

        tracing::error!(req_id = %ctx.req_id, tried = %tried.join(","), "all backend routes failed");
        let mut response = error_response(
            StatusCode::BAD_GATEWAY,
            "All backend routes failed",
            "ROUTES_EXHAUSTED",
        );
        if ctx.trace {
            set_route_trace(&mut response, &tried, "failed");
        }
        response
    }

    /// Single-shot streaming path for protocol upgrades. Upgrade headers
    /// pass through untouched; after the 101 the two connections become a
    /// transparent byte relay.
    async fn proxy_upgrade(
        &self,
        ctx: &RequestContext,
        mut req: Request<AxumBody>,
        route: &Route,
    ) -> Response<AxumBody> {
        let target = ProxyTarget::from_route(route, &ctx.original_host);
        let authority = target.authority();
        let health_key = route.health_key();
        tracing::debug!(
            req_id = %ctx.req_id,
            authority = %authority,
            source = route.source_tag(),
            "dispatching streaming upgrade"
        );

        let outbound = match build_outbound(
            req.method(),
            req.uri(),
            req.headers(),
            ctx,
            AxumBody::empty(),
            None,
            true,
        ) {
            Ok(outbound) => outbound,
            Err(response) => return response,
        };

        let upstream = match self.client.send(&target, outbound).await {
            Ok(response) => response,
            Err(err) => {
                let failures = self.state.passive_health.mark_failed(&health_key);
                metrics::increment_route_attempt(route.source_tag(), "failure");
                tracing::warn!(
                    req_id = %ctx.req_id,
                    authority = %authority,
                    failures,
                    error = %err,
                    "upgrade connection failed"
                );
                return error_response(
                    StatusCode::BAD_GATEWAY,
                    "Upstream connection failed",
                    "ROUTE_TRANSPORT_FAILURE",
                );
            }
        };
        self.state.passive_health.mark_healthy(&health_key);
        metrics::increment_route_attempt(route.source_tag(), "success");

        if upstream.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::info!(
                req_id = %ctx.req_id,
                authority = %authority,
                status = %upstream.status(),
                "backend declined the upgrade"
            );
            return forward_response(upstream);
        }

        let mut builder = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
        if let Some(headers) = builder.headers_mut() {
            *headers = upstream.headers().clone();
        }

        let req_id = ctx.req_id.clone();
        tokio::spawn(async move {
            match tokio::try_join!(hyper::upgrade::on(&mut req), hyper::upgrade::on(upstream)) {
                Ok((client_io, upstream_io)) => {
                    let mut client_io = TokioIo::new(client_io);
                    let mut upstream_io = TokioIo::new(upstream_io);
                    match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
                        Ok((to_upstream, to_client)) => tracing::debug!(
                            req_id = %req_id,
                            to_upstream,
                            to_client,
                            "upgrade relay closed"
                        ),
                        Err(err) => tracing::debug!(
                            req_id = %req_id,
                            error = %err,
                            "upgrade relay terminated"
                        ),
                    }
                }
                Err(err) => {
                    tracing::warn!(req_id = %req_id, error = %err, "upgrade handshake failed");
                }
            }
        });

        match builder.body(AxumBody::empty()) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(req_id = %ctx.req_id, error = %err, "failed to build upgrade response");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to build upgrade response",
                    "UPGRADE_FAILED",
                )
            }
        }
    }

    /// When resolution cannot produce routes, proxy once to the configured
    /// default backend, or answer 404. The default backend is expected
    /// on-box, so certificate verification is disabled for it.
    async fn default_backend_or_not_found(
        &self,
        ctx: &RequestContext,
        req: Request<AxumBody>,
        code: &str,
    ) -> Response<AxumBody> {
        let Some(url) = self.state.config.default_backend.clone() else {
            return error_response(StatusCode::NOT_FOUND, "Tenant not found", code);
        };
        let target = match ProxyTarget::from_url(&url, false) {
            Ok(target) => target,
            Err(err) => {
                tracing::error!(req_id = %ctx.req_id, error = %err, "default backend misconfigured");
                return error_response(
                    StatusCode::BAD_GATEWAY,
                    "Default backend failed",
                    "DEFAULT_BACKEND_FAILED",
                );
            }
        };
        tracing::info!(
            req_id = %ctx.req_id,
            reason = code,
            backend = %url,
            "routing to default backend"
        );

        let (parts, body) = req.into_parts();
        let buffered = match BufferedBody::buffer(body, self.state.config.max_body_bytes).await {
            Ok(buffered) => buffered,
            Err(err) => {
                tracing::error!(req_id = %ctx.req_id, error = %err, "failed to buffer request body");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read request body",
                    "BODY_READ_FAILED",
                );
            }
        };
        let content_length = (!buffered.is_empty()).then(|| buffered.len());
        let outbound_body = match buffered.to_body() {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(req_id = %ctx.req_id, error = %err, "request body replay failed");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to replay request body",
                    "BODY_READ_FAILED",
                );
            }
        };
        let outbound = match build_outbound(
            &parts.method,
            &parts.uri,
            &parts.headers,
            ctx,
            outbound_body,
            content_length,
            false,
        ) {
            Ok(outbound) => outbound,
            Err(response) => return response,
        };

        match self.client.send(&target, outbound).await {
            Ok(response) => forward_response(response),
            Err(err) => {
                tracing::error!(req_id = %ctx.req_id, error = %err, "default backend request failed");
                error_response(
                    StatusCode::BAD_GATEWAY,
                    "Default backend failed",
                    "DEFAULT_BACKEND_FAILED",
                )
            }
        }
    }
}

impl<R: Resolver, C: ProxyConnector> HttpHandler for GatewayHandler<R, C> {
    async fn handle_request(&self, req: Request<AxumBody>) -> Response<AxumBody> {
        let method = req.method().to_string();
        let _timer = metrics::RequestTimer::new(method.clone());
        let response = self.dispatch(req).await;
        metrics::increment_request_total(&method, response.status().as_u16());
        response
    }
}

fn is_upgrade_request(req: &Request<AxumBody>) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value.split(',').any(|token| {
                let token = token.trim();
                UPGRADE_PROTOCOLS
                    .iter()
                    .any(|proto| token.eq_ignore_ascii_case(proto))
            })
        })
        .unwrap_or(false)
}

/// Build the outbound request: origin-form URI, cloned headers, and the
/// forwarding header set. Upgrade dispatches keep their hop-by-hop headers
/// so the handshake survives the hop.
fn build_outbound(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    ctx: &RequestContext,
    body: AxumBody,
    content_length: Option<u64>,
    preserve_upgrade: bool,
) -> Result<Request<AxumBody>, Response<AxumBody>> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut outbound = Request::builder()
        .method(method.clone())
        .uri(path_and_query)
        .body(body)
        .map_err(|err| {
            tracing::error!(error = %err, "failed to build outbound request");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build outbound request",
                "OUTBOUND_BUILD_FAILED",
            )
        })?;

    *outbound.headers_mut() = headers.clone();
    let headers = outbound.headers_mut();
    if !preserve_upgrade {
        strip_hop_by_hop(headers);
    }
    apply_forwarding_headers(headers, ctx)?;
    if !preserve_upgrade {
        headers.remove(header::TRANSFER_ENCODING);
        match content_length {
            Some(len) => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            }
            None => {
                headers.remove(header::CONTENT_LENGTH);
            }
        }
    }
    Ok(outbound)
}

fn apply_forwarding_headers(
    headers: &mut HeaderMap,
    ctx: &RequestContext,
) -> Result<(), Response<AxumBody>> {
    headers.insert(header::HOST, header_value(&ctx.proxy_host)?);
    if let Some(addr) = ctx.client_addr {
        let ip = addr.ip().to_string();
        let forwarded_for = match headers
            .get(HEADER_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
        {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip.clone(),
        };
        headers.insert(HEADER_REAL_IP, header_value(&ip)?);
        headers.insert(HEADER_FORWARDED_FOR, header_value(&forwarded_for)?);
    }
    headers.insert(
        HEADER_FORWARDED_PROTO,
        HeaderValue::from_static(ctx.client_scheme),
    );
    headers.insert(HEADER_FORWARDED_HOST, header_value(&ctx.original_host)?);
    headers.insert(HEADER_REQUEST_ID, header_value(&ctx.req_id)?);
    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue, Response<AxumBody>> {
    HeaderValue::from_str(value).map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            "Invalid header value",
            "INVALID_HEADER",
        )
    })
}

/// Forward a backend response to the client, minus hop-by-hop headers.
fn forward_response(response: Response<Incoming>) -> Response<AxumBody> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, AxumBody::new(body))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
    ] {
        headers.remove(name);
    }
}

fn set_route_trace(response: &mut Response<AxumBody>, tried: &[String], suffix: &str) {
    let value = format!("{},{}", tried.join(","), suffix);
    if let Ok(value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(HEADER_ROUTE, value);
    }
}

fn error_response(status: StatusCode, message: &str, code: &str) -> Response<AxumBody> {
    (status, Json(json!({ "error": message, "code": code }))).into_response()
}
