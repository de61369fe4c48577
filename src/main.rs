use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;

use mesh_gateway::config::{ConfigValidator, load_config};
use mesh_gateway::{
    GatewayHandler, GatewayServer, GatewayState, HttpResolver, ProxyClient, bootstrap_ca_bundle,
    client_tls_config, load_root_store, tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Multi-tenant wildcard-subdomain reverse proxy")]
struct Args {
    /// Optional YAML configuration file; environment variables take
    /// precedence over its values.
    #[clap(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_setup::init_tracing().map_err(|err| anyhow!("failed to initialize tracing: {err}"))?;

    let args = Args::parse();
    let config = load_config(args.config.as_deref()).await?;
    ConfigValidator::validate(&config)?;
    tracing::info!(
        server_domain = %config.server_domain,
        backend_url = %config.backend_url,
        "configuration loaded"
    );

    rustls::crypto::CryptoProvider::install_default(rustls::crypto::aws_lc_rs::default_provider())
        .map_err(|_| anyhow!("failed to install default crypto provider"))?;

    bootstrap_ca_bundle(&config.backend_url, &config.ca_bundle_path).await?;
    let roots = load_root_store(&config.ca_bundle_path)?;
    let tls = Arc::new(client_tls_config(roots));

    let state = Arc::new(GatewayState::new(config.clone()));
    let _sweeper = state.spawn_sweeper();

    let resolver = Arc::new(HttpResolver::new(
        &config,
        tls.clone(),
        state.route_cache.clone(),
    ));
    let client = Arc::new(ProxyClient::new(tls, config.proxy_connect_timeout()));
    let handler = Arc::new(GatewayHandler::new(state.clone(), resolver, client));

    let server = GatewayServer::new(state, handler)?;
    server.run().await
}
