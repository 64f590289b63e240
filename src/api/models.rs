use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const LATEST_RELEASE_URL: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";

/// Response from the latest-release endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl Release {
    /// Asset whose file name equals `name` exactly.
    pub fn find_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub release_url: String,
    pub user_agent: String,
    pub metadata_timeout: Duration,
    pub connect_timeout: Duration,
    /// Longest gap allowed between two reads of a response body
    pub read_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            release_url: LATEST_RELEASE_URL.to_string(),
            user_agent: concat!("ytdlp-gui/", env!("CARGO_PKG_VERSION")).to_string(),
            metadata_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
        }
    }
}
