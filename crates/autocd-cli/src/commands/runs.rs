//! Operator API commands.

use anyhow::{Context, Result, bail};
use autocd_core::executor::RunInfo;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Client for the token-protected `/runs` routes.
pub struct OperatorClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct RunList {
    runs: Vec<RunInfo>,
}

#[derive(Debug, Deserialize)]
struct StopResponse {
    stopped: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl OperatorClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid API URL: {}", base_url);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.to_string(),
        })
    }

    /// Build a URL under the base URL. Each segment is percent-encoded, so an
    /// event name can never add path components or a query.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, segments: &[&str]) -> Result<T> {
        let url = self.url(segments);
        let response = self
            .http
            .request(method, url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            if status == StatusCode::NOT_FOUND && segments == ["runs"] {
                bail!("operator API not enabled on {}", self.base_url);
            }
            bail!("{} ({})", message, status);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Unexpected response from {}", url))
    }
}

pub async fn list(client: &OperatorClient) -> Result<()> {
    let list: RunList = client.call(Method::GET, &["runs"]).await?;

    if list.runs.is_empty() {
        println!("No live runs");
        return Ok(());
    }

    println!("{:<38} {:<16} {:>8}  STARTED", "RUN ID", "EVENT", "PID");
    for run in list.runs {
        let pid = run
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<16} {:>8}  {}",
            run.id.to_string(),
            run.event,
            pid,
            run.started_at.to_rfc3339()
        );
    }
    Ok(())
}

pub async fn stop(client: &OperatorClient, event: &str) -> Result<()> {
    let response: StopResponse = client
        .call(Method::POST, &["runs", event, "stop"])
        .await?;
    println!("Stopped {} run(s) of {}", response.stopped, event);
    Ok(())
}

pub async fn stop_all(client: &OperatorClient) -> Result<()> {
    let response: StopResponse = client.call(Method::POST, &["runs", "stop-all"]).await?;
    println!("Stopped {} run(s)", response.stopped);
    Ok(())
}
