use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::routing::get;
use axum::{Json, Router};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use hyper::Request;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::core::GatewayState;
use crate::core::context::ClientScheme;
use crate::metrics;
use crate::ports::http_server::HttpHandler;

/// Window within which in-flight TLS connections may finish after a
/// shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Binds the client-facing listeners and serves the gateway handler behind
/// them: plain HTTP always, TLS when a wildcard certificate is configured.
/// `/_health` and `/_metrics` are answered ahead of the tenant fallback.
pub struct GatewayServer<H> {
    state: Arc<GatewayState>,
    handler: Arc<H>,
    metrics_handle: PrometheusHandle,
}

impl<H: HttpHandler> GatewayServer<H> {
    pub fn new(state: Arc<GatewayState>, handler: Arc<H>) -> Result<Self> {
        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|err| anyhow!("failed to install metrics recorder: {err}"))?;
        metrics::describe_metrics();
        Ok(Self {
            state,
            handler,
            metrics_handle,
        })
    }

    fn build_app(&self, scheme: &'static str) -> Router {
        let handler = self.handler.clone();
        let metrics_handle = self.metrics_handle.clone();

        Router::new()
            .route(
                "/_health",
                get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
            )
            .route(
                "/_metrics",
                get(move || {
                    let handle = metrics_handle.clone();
                    async move { handle.render() }
                }),
            )
            .fallback(move |req: Request<AxumBody>| {
                let handler = handler.clone();
                async move { handler.handle_request(req).await }
            })
            .layer(
                ServiceBuilder::new()
                    .layer(Extension(ClientScheme(scheme)))
                    .layer(TraceLayer::new_for_http()),
            )
    }

    pub async fn run(&self) -> Result<()> {
        let config = &self.state.config;

        let http_app = self.build_app("http");
        let http_listener = TcpListener::bind(config.http_addr)
            .await
            .with_context(|| format!("failed to bind http listener on {}", config.http_addr))?;
        tracing::info!(addr = %config.http_addr, "http listener started");
        let http_server = axum::serve(
            http_listener,
            http_app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());

        match (&config.tls_cert_path, &config.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let tls = RustlsConfig::from_pem_file(cert_path, key_path)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to load TLS certificate from {}",
                            cert_path.display()
                        )
                    })?;
                let https_app = self.build_app("https");

                // The plain listener drains through with_graceful_shutdown;
                // the TLS listener drains through its axum-server handle,
                // triggered by the same signal.
                let https_handle = Handle::new();
                let drain_handle = https_handle.clone();
                tokio::spawn(async move {
                    shutdown_signal().await;
                    drain_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
                });

                tracing::info!(addr = %config.https_addr, "https listener started");
                let https_server = axum_server::bind_rustls(config.https_addr, tls)
                    .handle(https_handle)
                    .serve(https_app.into_make_service_with_connect_info::<SocketAddr>());

                // Poll both listeners together so a shutdown drains each of
                // them before run() returns.
                let (http_result, https_result) =
                    tokio::join!(http_server.into_future(), https_server);
                http_result.context("http server error")?;
                https_result.context("https server error")?;
            }
            _ => {
                tracing::info!("tls certificate not configured, https listener disabled");
                http_server.await.context("http server error")?;
            }
        }
        tracing::info!("gateway shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining listeners");
}
