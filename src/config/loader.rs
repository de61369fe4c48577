use std::env;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use tokio::fs;

use crate::config::models::GatewayConfig;

/// Load configuration: defaults, then the optional YAML file, then
/// environment variables on top.
pub async fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        }
        None => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut GatewayConfig) -> Result<()> {
    if let Some(domain) = env_string("SERVER_DOMAIN") {
        config.server_domain = domain;
    }
    if let Some(url) = env_parse("BACKEND_URL")? {
        config.backend_url = url;
    }
    // An explicitly empty DEFAULT_BACKEND disables the fallback.
    if let Ok(raw) = env::var("DEFAULT_BACKEND") {
        let raw = raw.trim();
        config.default_backend = if raw.is_empty() {
            None
        } else {
            Some(raw.parse().map_err(|err| anyhow!("invalid DEFAULT_BACKEND: {err}"))?)
        };
    }

    set_if_present(&mut config.cache_ttl_secs, "CACHE_TTL")?;
    set_if_present(&mut config.cache_max_entries, "CACHE_MAX_ENTRIES")?;
    set_if_present(&mut config.passive_unhealthy_ttl_secs, "PASSIVE_UNHEALTHY_TTL")?;
    set_if_present(&mut config.failure_threshold, "FAILURE_THRESHOLD")?;
    set_if_present(&mut config.failover_max_retries, "FAILOVER_MAX_RETRIES")?;
    set_if_present(&mut config.backend_max_retries, "BACKEND_MAX_RETRIES")?;
    set_if_present(&mut config.backend_retry_delay_ms, "BACKEND_RETRY_DELAY_MS")?;
    set_if_present(&mut config.backend_timeout_secs, "BACKEND_TIMEOUT_SECS")?;
    set_if_present(
        &mut config.proxy_connect_timeout_secs,
        "PROXY_CONNECT_TIMEOUT_SECS",
    )?;
    set_if_present(&mut config.max_body_bytes, "MAX_BODY_BYTES")?;
    set_if_present(&mut config.http_addr, "HTTP_ADDR")?;
    set_if_present(&mut config.https_addr, "HTTPS_ADDR")?;

    if let Some(path) = env_string("CA_BUNDLE_PATH") {
        config.ca_bundle_path = path.into();
    }
    if let Some(path) = env_string("TLS_CERT_PATH") {
        config.tls_cert_path = Some(path.into());
    }
    if let Some(path) = env_string("TLS_KEY_PATH") {
        config.tls_key_path = Some(path.into());
    }
    Ok(())
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|err| anyhow!("invalid {name}: {err}")),
        None => Ok(None),
    }
}

fn set_if_present<T>(target: &mut T, name: &str) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = env_parse(name)? {
        *target = value;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use super::*;

    // The environment is process-global; every test that touches
    // load_config serializes on this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn test_yaml_file_loads() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_domain: example.com").unwrap();
        writeln!(file, "cache_ttl_secs: 15").unwrap();
        file.flush().unwrap();

        let config = load_config(Some(file.path())).await.unwrap();
        assert_eq!(config.server_domain, "example.com");
        assert_eq!(config.cache_ttl_secs, 15);
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let result = load_config(Some(Path::new("/nonexistent/mesh-gateway.yaml"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_env_overrides_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("SERVER_DOMAIN", "env.example.net");
            env::set_var("CACHE_TTL", "120");
            env::set_var("FAILOVER_MAX_RETRIES", "5");
        }
        let config = load_config(None).await;
        unsafe {
            env::remove_var("SERVER_DOMAIN");
            env::remove_var("CACHE_TTL");
            env::remove_var("FAILOVER_MAX_RETRIES");
        }

        let config = config.unwrap();
        assert_eq!(config.server_domain, "env.example.net");
        assert_eq!(config.cache_ttl_secs, 120);
        assert_eq!(config.failover_max_retries, 5);
    }
}
