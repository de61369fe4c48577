use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use axum::body::Body as AxumBody;
use http_body_util::BodyExt;
use hyper::{Method, Request};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::RootCertStore;
use rustls::pki_types::CertificateDer;
use url::Url;

const CA_FETCH_MAX_RETRIES: u32 = 30;
const CA_FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);
const CA_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

type BootstrapClient = Client<
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    AxumBody,
>;

/// Fetch the resolution backend's CA certificate and persist it as the
/// trust bundle used by the resolver and proxy clients. The backend may
/// still be coming up when the gateway starts, hence the long retry budget.
pub async fn bootstrap_ca_bundle(backend_url: &Url, bundle_path: &Path) -> Result<()> {
    let url = backend_url
        .join("ca-cert")
        .with_context(|| format!("invalid backend url: {backend_url}"))?;

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .context("failed to load native TLS roots")?
        .https_or_http()
        .enable_http1()
        .build();
    let client: BootstrapClient = Client::builder(TokioExecutor::new()).build(https);

    for attempt in 1..=CA_FETCH_MAX_RETRIES {
        match fetch_pem(&client, url.as_str()).await {
            Ok(pem) => {
                ensure_parseable(&pem)
                    .with_context(|| format!("backend served an unusable CA bundle from {url}"))?;
                tokio::fs::write(bundle_path, &pem).await.with_context(|| {
                    format!("failed to write CA bundle to {}", bundle_path.display())
                })?;
                tracing::info!(
                    path = %bundle_path.display(),
                    bytes = pem.len(),
                    "CA bundle written"
                );
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "ca-cert fetch failed");
                if attempt < CA_FETCH_MAX_RETRIES {
                    tokio::time::sleep(CA_FETCH_RETRY_DELAY).await;
                }
            }
        }
    }
    bail!("could not fetch CA bundle from {url} after {CA_FETCH_MAX_RETRIES} attempts")
}

async fn fetch_pem(client: &BootstrapClient, url: &str) -> Result<Vec<u8>> {
    let req = Request::builder()
        .method(Method::GET)
        .uri(url)
        .body(AxumBody::empty())?;
    let response = tokio::time::timeout(CA_FETCH_TIMEOUT, client.request(req))
        .await
        .map_err(|_| anyhow::anyhow!("request timed out"))??;
    ensure!(
        response.status().is_success(),
        "backend answered {}",
        response.status()
    );
    let body = response.into_body().collect().await?.to_bytes();
    Ok(body.to_vec())
}

fn ensure_parseable(pem: &[u8]) -> Result<()> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<_, _>>()
        .context("failed to parse PEM")?;
    ensure!(!certs.is_empty(), "no certificates in PEM body");
    Ok(())
}

/// Build the root store the outbound TLS clients verify against: the
/// fetched CA bundle plus the host's native roots.
pub fn load_root_store(bundle_path: &Path) -> Result<RootCertStore> {
    let pem = std::fs::read(bundle_path)
        .with_context(|| format!("failed to read CA bundle: {}", bundle_path.display()))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<_, _>>()
        .with_context(|| format!("failed to parse CA bundle: {}", bundle_path.display()))?;

    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(certs);
    ensure!(
        added > 0,
        "no usable certificates in {}",
        bundle_path.display()
    );

    for cert in rustls_native_certs::load_native_certs()
        .context("failed to load native TLS roots")?
    {
        // Unparseable system certificates are skipped, not fatal.
        let _ = roots.add(cert);
    }
    Ok(roots)
}

/// TLS client configuration verifying against the given roots.
pub fn client_tls_config(roots: RootCertStore) -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // ensure_parseable checks PEM framing, not ASN.1 validity, so any
    // well-framed CERTIFICATE section passes.
    const TEST_PEM: &str =
        "-----BEGIN CERTIFICATE-----\naGVsbG8gY2VydA==\n-----END CERTIFICATE-----\n";

    #[test]
    fn test_framed_pem_accepted() {
        assert!(ensure_parseable(TEST_PEM.as_bytes()).is_ok());
    }

    #[test]
    fn test_garbage_pem_rejected() {
        assert!(ensure_parseable(b"not a certificate").is_err());
        assert!(ensure_parseable(b"").is_err());
    }

    #[test]
    fn test_missing_bundle_file_errors() {
        assert!(load_root_store(Path::new("/nonexistent/ca.pem")).is_err());
    }

    #[test]
    fn test_bundle_with_no_usable_certs_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"garbage").unwrap();
        file.flush().unwrap();
        assert!(load_root_store(file.path()).is_err());
    }
}
