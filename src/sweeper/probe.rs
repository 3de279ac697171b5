use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Health-check transport to a remote entity.
///
/// In-world scripts expose an HTTP endpoint that accepts a `command` form
/// field and answers with a short text reply.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Send `command` to `endpoint` and return the reply text
    async fn probe(&self, endpoint: &str, command: &str) -> Result<String>;
}

/// Probes entities over HTTP with a form-encoded POST
pub struct HttpProber {
    http_client: Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("botfleet-sweeper/1.0")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &str, command: &str) -> Result<String> {
        let response = self
            .http_client
            .post(endpoint)
            .form(&[("command", command)])
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", endpoint))?
            .error_for_status()
            .with_context(|| format!("{} rejected {}", endpoint, command))?;

        response
            .text()
            .await
            .with_context(|| format!("Failed to read reply from {}", endpoint))
    }
}
