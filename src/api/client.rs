use futures::Stream;
use futures::TryStreamExt;
use reqwest::Client;
use thiserror::Error;

use super::models::{ApiConfig, Release};
use crate::domain::TaskError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<ApiError> for TaskError {
    fn from(e: ApiError) -> Self {
        match &e {
            ApiError::RequestError(inner) if inner.is_timeout() => {
                TaskError::NetworkTimeout(e.to_string())
            }
            _ => TaskError::Network(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("falling back to default HTTP client: {e}");
                Client::new()
            });
        Self { config, http }
    }

    /// Fetch metadata of the latest published release
    pub async fn latest_release(&self) -> Result<Release> {
        let response = self
            .http
            .get(&self.config.release_url)
            .header("Accept", "application/vnd.github+json")
            .timeout(self.config.metadata_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::ApiError(format!(
                "Release request failed: {status}"
            )));
        }

        response
            .json::<Release>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))
    }

    /// Download file as a byte stream
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: &str,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        let response = self
            .http
            .get(download_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Download request failed: {}", e)))?;

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((total_size, stream))
    }
}
