//! Configuration types for datasource-mapper

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// File host settings used by [`HttpFileHost`](crate::collector::HttpFileHost)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileHostConfig {
    /// Base URL of the file host (e.g. "https://filehost.example:1443")
    #[serde(default)]
    pub url: Option<String>,

    /// Timeout for a single blob download (default: 60 seconds)
    #[serde(default = "default_filehost_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for FileHostConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: default_filehost_timeout(),
        }
    }
}

/// Main configuration for the feed view processor
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (default: "./data"); staging files live in `<data_dir>/feeds`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of queue workers (default: 2)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum feed views downloading at the same time (default: 1)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Records requested per getFeedData page (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Items per insertViewData batch (default: 20)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum length of one staged line in bytes (default: 16 MiB)
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// Timeout applied to each collector request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// File host used to fetch record blobs
    #[serde(default)]
    pub filehost: FileHostConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workers: default_workers(),
            max_concurrent_downloads: default_max_concurrent(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            max_line_bytes: default_max_line_bytes(),
            request_timeout: default_request_timeout(),
            filehost: FileHostConfig::default(),
        }
    }
}

impl Config {
    /// Directory holding the per-view staging and watermark files
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("feeds")
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("workers", self.workers),
            ("max_concurrent_downloads", self.max_concurrent_downloads),
            ("page_size", self.page_size),
            ("batch_size", self.batch_size),
            ("max_line_bytes", self.max_line_bytes),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(Error::Config {
                    message: format!("{key} must be greater than zero"),
                    key: Some(key.to_string()),
                });
            }
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_workers() -> usize {
    2
}

fn default_max_concurrent() -> usize {
    1
}

fn default_page_size() -> usize {
    50
}

fn default_batch_size() -> usize {
    20
}

fn default_max_line_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_filehost_timeout() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
