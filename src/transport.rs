//! HTTP access for everything that is not delegated to yt-dlp.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::constants;
use crate::error::FetchError;

#[async_trait]
pub trait Downloader: Send + Sync {
  /// Fetches the body of `url`.
  async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest client with a browser user agent and a read timeout.
pub struct HttpDownloader {
  client: Client,
}

impl HttpDownloader {
  pub fn new() -> Result<Self, FetchError> {
    let c = constants();
    let client = Client::builder()
      .user_agent(c.user_agent.as_str())
      .read_timeout(Duration::from_secs(c.read_timeout_secs))
      .build()
      .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {e}")))?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Downloader for HttpDownloader {
  async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    debug!(url, "transport: GET");
    let response = self.client.get(url).send().await.map_err(|e| FetchError::Transport(e.to_string()))?;
    check_status(response.status())?;
    let body = response.bytes().await.map_err(|e| FetchError::Transport(e.to_string()))?;
    Ok(body.to_vec())
  }
}

fn check_status(status: StatusCode) -> Result<(), FetchError> {
  if status == StatusCode::TOO_MANY_REQUESTS {
    warn!("transport: rate limited");
    return Err(FetchError::Transport("rate limited (HTTP 429), solve the captcha in a browser and retry".into()));
  }
  if !status.is_success() {
    return Err(FetchError::Transport(format!("HTTP {status}")));
  }
  Ok(())
}
