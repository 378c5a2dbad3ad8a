use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request timed out")]
    Timeout(#[source] reqwest::Error),
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ProbeError::Timeout(err) } else { ProbeError::Request(err) }
    }
}

/// Build the HTTP client shared by probes and chat notifiers
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("statusframe-engine/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Checker trait for availability probes
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform the check and return latency in milliseconds and the status code.
    ///
    /// Any response counts as a result, whatever its code; only the absence of
    /// one is an error.
    async fn check(&self, target: &str) -> Result<(u64, u16), ProbeError>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout_seconds: u64) -> Result<Self, ProbeError> {
        Self::with_timeout(Duration::from_secs(timeout_seconds))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProbeError> {
        let client = http_client(timeout).map_err(ProbeError::Request)?;
        Ok(Self { client })
    }

    /// Reuse an existing client; its timeout applies to every probe
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> Result<(u64, u16), ProbeError> {
        let start = Instant::now();

        let response = self.client.get(target).send().await?;

        let latency = start.elapsed().as_millis() as u64;
        Ok((latency, response.status().as_u16()))
    }
}
