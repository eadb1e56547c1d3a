//! Raw resource retrieval for connectors.
//!
//! A resource is a bare filesystem path, a `file://` URI, or an
//! `http(s)://` URL. HTTP requests carry a fixed `User-Agent` and anything
//! other than `200 OK` is an error.

use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SparkError;

pub const USER_AGENT: &str = "Spark";

/// Build the HTTP client shared by connectors and providers.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Where a resource lives, after parsing its URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    File(PathBuf),
    Http(Url),
}

impl Resource {
    pub fn parse(uri: &str) -> Result<Self> {
        if !uri.contains("://") {
            return Ok(Resource::File(PathBuf::from(uri)));
        }

        let url = Url::parse(uri).with_context(|| format!("Failed to parse URI: {}", uri))?;
        match url.scheme().to_ascii_lowercase().as_str() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| anyhow::anyhow!("Invalid file URI: {}", uri))?;
                Ok(Resource::File(path))
            }
            "http" | "https" => Ok(Resource::Http(url)),
            other => Err(SparkError::UnsupportedScheme(other.to_string()).into()),
        }
    }
}

/// Read a resource fully into memory.
pub async fn fetch_bytes(client: &reqwest::Client, uri: &str) -> Result<Vec<u8>> {
    match Resource::parse(uri)? {
        Resource::File(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        Resource::Http(url) => {
            tracing::debug!(%url, "fetching");
            let response = client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("Request to {} failed", url))?;

            let status = response.status();
            if status != StatusCode::OK {
                return Err(SparkError::Http {
                    status: status.as_u16(),
                    uri: url.to_string(),
                }
                .into());
            }

            let body = response.bytes().await?;
            Ok(body.to_vec())
        }
    }
}

/// [`fetch_bytes`] decoded as UTF-8 (lossy).
pub async fn fetch_string(client: &reqwest::Client, uri: &str) -> Result<String> {
    let bytes = fetch_bytes(client, uri).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
