use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Structured JSON logging with an env-filter. Every per-request event
/// carries the request id, so a decision chain can be reconstructed from
/// logs alone.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true),
        )
        .init();

    tracing::info!("structured logging initialized");
    Ok(())
}
