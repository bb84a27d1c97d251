use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{PublishConfig, PublishTarget};
use crate::error::{ClipError, Result};

/// Storage key of a finished clip: `clips/YYYY/MM/DD/<execution_id>.mp4`
pub fn object_key(execution_id: &Uuid, at: DateTime<Utc>) -> String {
    format!("clips/{}/{}.mp4", at.format("%Y/%m/%d"), execution_id)
}

/// Destination for finished clips
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Store `bytes` under `key` and return the URL it can be fetched from
    async fn publish(&self, bytes: Vec<u8>, content_type: &str, key: &str) -> Result<String>;
}

/// Writes clips below a local directory
pub struct DirectoryPublisher {
    root: PathBuf,
}

impl DirectoryPublisher {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(&self, bytes: Vec<u8>, content_type: &str, key: &str) -> Result<String> {
        let target = self.root.join(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        debug!("Writing {} bytes of {} to {}", bytes.len(), content_type, target.display());
        fs::write(&target, &bytes).await?;

        let absolute = fs::canonicalize(&target).await?;
        let url = format!("file://{}", absolute.to_string_lossy().replace('\\', "/"));
        info!("Published {}", url);
        Ok(url)
    }
}

/// Uploads clips with HTTP PUT to `<base_url>/<key>`
pub struct HttpPublisher {
    client: reqwest::Client,
    base_url: String,
    public_base_url: String,
}

impl HttpPublisher {
    pub fn new(base_url: &str, public_base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let public_base_url = match public_base_url.trim_end_matches('/') {
            "" => base_url.clone(),
            public => public.to_string(),
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            public_base_url,
        }
    }

    fn upload_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, bytes: Vec<u8>, content_type: &str, key: &str) -> Result<String> {
        let upload_url = self.upload_url(key);
        info!("Uploading {} bytes to {}", bytes.len(), upload_url);

        let response = self
            .client
            .put(&upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClipError::Publish(format!(
                "upload to {} returned {}",
                upload_url,
                response.status()
            )));
        }

        Ok(self.public_url(key))
    }
}

/// Factory for creating publisher instances
pub struct PublisherFactory;

impl PublisherFactory {
    pub fn create(config: &PublishConfig) -> Result<Box<dyn Publisher>> {
        match config.target {
            PublishTarget::Directory => Ok(Box::new(DirectoryPublisher::new(&config.directory))),
            PublishTarget::Http => {
                if config.base_url.trim().is_empty() {
                    return Err(ClipError::Config("publish.base_url is required for the http target".to_string()));
                }
                Ok(Box::new(HttpPublisher::new(&config.base_url, &config.public_base_url)))
            }
        }
    }
}
