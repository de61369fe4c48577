use std::sync::Arc;
use std::time::Duration;

use axum::body::Body as AxumBody;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::core::route::Scheme;
use crate::ports::http_client::{ProxyConnector, ProxyError, ProxyTarget};

/// Executes single proxy attempts: a fresh TCP connect per attempt, an
/// optional TLS handshake with SNI taken from the target, then an HTTP/1.1
/// exchange. The failover loop owns retries; this type only classifies.
pub struct ProxyClient {
    verified_tls: TlsConnector,
    insecure_tls: TlsConnector,
    connect_timeout: Duration,
}

impl ProxyClient {
    pub fn new(tls: Arc<rustls::ClientConfig>, connect_timeout: Duration) -> Self {
        Self {
            verified_tls: TlsConnector::from(tls),
            insecure_tls: TlsConnector::from(Arc::new(insecure_client_config())),
            connect_timeout,
        }
    }

    async fn exchange<I>(
        &self,
        io: TokioIo<I>,
        authority: String,
        req: Request<AxumBody>,
    ) -> Result<Response<Incoming>, ProxyError>
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|source| ProxyError::Http {
                authority: authority.clone(),
                source,
            })?;

        // The connection task outlives the request so response bodies and
        // protocol upgrades keep flowing after this call returns.
        tokio::spawn(async move {
            if let Err(err) = conn.with_upgrades().await {
                tracing::debug!(error = %err, "backend connection closed with error");
            }
        });

        sender
            .send_request(req)
            .await
            .map_err(|source| ProxyError::Http { authority, source })
    }
}

impl ProxyConnector for ProxyClient {
    async fn send(
        &self,
        target: &ProxyTarget,
        req: Request<AxumBody>,
    ) -> Result<Response<Incoming>, ProxyError> {
        let authority = target.authority();

        let connect = TcpStream::connect((target.host.as_str(), target.port));
        let tcp = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ProxyError::Connect { authority, source }),
            Err(_) => return Err(ProxyError::ConnectTimeout { authority }),
        };
        let _ = tcp.set_nodelay(true);

        match target.protocol {
            Scheme::Http => self.exchange(TokioIo::new(tcp), authority, req).await,
            Scheme::Https => {
                let connector = if target.verify_tls {
                    &self.verified_tls
                } else {
                    &self.insecure_tls
                };
                let sni = target
                    .sni_host
                    .clone()
                    .unwrap_or_else(|| target.host.clone());
                let server_name = ServerName::try_from(sni).map_err(|_| {
                    ProxyError::InvalidTarget(format!("invalid tls server name for {authority}"))
                })?;

                let handshake = connector.connect(server_name, tcp);
                let tls = match tokio::time::timeout(self.connect_timeout, handshake).await {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(source)) => return Err(ProxyError::Tls { authority, source }),
                    Err(_) => return Err(ProxyError::ConnectTimeout { authority }),
                };
                self.exchange(TokioIo::new(tls), authority, req).await
            }
        }
    }
}

/// TLS configuration that accepts any server certificate. Used exclusively
/// for the default backend, which sits on-box behind the gateway.
fn insecure_client_config() -> rustls::ClientConfig {
    let provider = rustls::crypto::aws_lc_rs::default_provider();
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(DisabledVerifier(provider)))
        .with_no_client_auth()
}

#[derive(Debug)]
struct DisabledVerifier(rustls::crypto::CryptoProvider);

impl ServerCertVerifier for DisabledVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::routing::get;

    use super::*;

    fn client() -> ProxyClient {
        let tls = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(rustls::RootCertStore::empty())
                .with_no_client_auth(),
        );
        ProxyClient::new(tls, Duration::from_secs(2))
    }

    fn origin_form_request(host: &str) -> Request<AxumBody> {
        Request::builder()
            .method(hyper::Method::GET)
            .uri("/ping")
            .header(hyper::header::HOST, host)
            .body(AxumBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_http_exchange() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = Router::new().route("/ping", get(|| async { "pong" }));
            axum::serve(listener, app).await.unwrap();
        });

        let target = ProxyTarget {
            protocol: Scheme::Http,
            host: addr.ip().to_string(),
            port: addr.port(),
            sni_host: None,
            verify_tls: true,
        };
        let response = client()
            .send(&target, origin_form_request("alice.example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), hyper::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_connection_refused_is_retriable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let target = ProxyTarget {
            protocol: Scheme::Http,
            host: addr.ip().to_string(),
            port: addr.port(),
            sni_host: None,
            verify_tls: true,
        };
        let err = client()
            .send(&target, origin_form_request("alice.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Connect { .. }));
        assert!(err.is_retriable());
    }
}
