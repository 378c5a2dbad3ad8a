use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use url::{Host, Url};
use x509_parser::prelude::*;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("invalid probe URL: {0}")]
    InvalidUrl(String),
    #[error("invalid server name: {0}")]
    InvalidServerName(String),
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("server presented no certificate")]
    NoCertificate,
    #[error("failed to parse certificate: {0}")]
    Parse(String),
    #[error("TLS configuration failed: {0}")]
    Config(#[from] rustls::Error),
}

/// Fields taken from a server's leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub not_after: DateTime<Utc>,
    pub issuer: String,
}

#[async_trait]
pub trait CertificateProber: Send + Sync {
    /// Handshake with the host of `probe_url` and read its leaf certificate
    async fn probe(&self, probe_url: &str) -> Result<CertificateInfo, CertificateError>;
}

/// Whole days until `not_after`, rounded down. Negative once expired.
pub fn days_until_expiry(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_seconds().div_euclid(86_400)
}

/// Host and port to dial for `probe_url`, 443 unless the URL names a port
pub(crate) fn dial_target(probe_url: &str) -> Result<(String, u16), CertificateError> {
    let url = Url::parse(probe_url).map_err(|e| CertificateError::InvalidUrl(e.to_string()))?;
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(CertificateError::InvalidUrl(format!("{probe_url} has no host"))),
    };
    Ok((host, url.port().unwrap_or(443)))
}

/// Read expiry and issuer from a DER encoded certificate. The issuer is the
/// organization, then the common name, then "Unknown".
pub fn parse_leaf(der: &[u8]) -> Result<CertificateInfo, CertificateError> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| CertificateError::Parse(e.to_string()))?;

    let issuer = cert
        .issuer()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .or_else(|| cert.issuer().iter_common_name().next().and_then(|attr| attr.as_str().ok()))
        .unwrap_or("Unknown")
        .to_string();

    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| CertificateError::Parse("expiry out of range".into()))?;

    Ok(CertificateInfo { not_after, issuer })
}

/// Performs a verified TLS handshake against the public web PKI
pub struct TlsProber {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsProber {
    pub fn new(timeout: Duration) -> Result<Self, CertificateError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)), timeout })
    }
}

#[async_trait]
impl CertificateProber for TlsProber {
    async fn probe(&self, probe_url: &str) -> Result<CertificateInfo, CertificateError> {
        let (host, port) = dial_target(probe_url)?;
        let server_name = ServerName::try_from(host.clone())
            .map_err(|_| CertificateError::InvalidServerName(host.clone()))?;

        let handshake = async {
            let stream = TcpStream::connect((host.as_str(), port)).await.map_err(CertificateError::Connect)?;
            let tls = self.connector.connect(server_name, stream).await.map_err(CertificateError::Handshake)?;

            let (_, connection) = tls.get_ref();
            let leaf = connection
                .peer_certificates()
                .and_then(|certs| certs.first())
                .ok_or(CertificateError::NoCertificate)?;
            parse_leaf(leaf.as_ref())
        };

        timeout(self.timeout, handshake).await.map_err(|_| CertificateError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_days_until_expiry_rounds_down() {
        let now = Utc::now();
        assert_eq!(days_until_expiry(now + ChronoDuration::hours(5 * 24 + 23), now), 5);
        assert_eq!(days_until_expiry(now + ChronoDuration::hours(120), now), 5);
        assert_eq!(days_until_expiry(now + ChronoDuration::hours(23), now), 0);
        assert_eq!(days_until_expiry(now - ChronoDuration::hours(1), now), -1);
    }

    #[test]
    fn test_dial_target() {
        assert_eq!(dial_target("https://example.com/health").unwrap(), ("example.com".into(), 443));
        assert_eq!(dial_target("https://example.com:8443").unwrap(), ("example.com".into(), 8443));
        assert_eq!(dial_target("https://[::1]:9443/").unwrap(), ("::1".into(), 9443));
        assert!(matches!(dial_target("not a url"), Err(CertificateError::InvalidUrl(_))));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_leaf(b"not a certificate"), Err(CertificateError::Parse(_))));
    }

    #[tokio::test]
    async fn test_handshake_against_plain_tcp_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });

        let prober = TlsProber::new(std::time::Duration::from_secs(5)).unwrap();
        let err = prober.probe(&format!("https://127.0.0.1:{port}/")).await.unwrap_err();
        assert!(matches!(err, CertificateError::Handshake(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        // Accepts the connection but never answers the ClientHello
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let held = listener.accept().await;
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(held);
        });

        let prober = TlsProber::new(std::time::Duration::from_millis(200)).unwrap();
        let err = prober.probe(&format!("https://127.0.0.1:{port}/")).await.unwrap_err();
        assert!(matches!(err, CertificateError::Timeout(_)));
    }
}
