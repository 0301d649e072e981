//! Artwork retrieval
//!
//! Images either arrive inline in the request as `data:` URLs or are
//! downloaded from the metadata provider.

use base64::{Engine, engine::general_purpose::STANDARD};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Errors that can occur while retrieving artwork
#[derive(Debug, Error)]
pub enum AssetError {
    /// The image host answered with a non-success status
    #[error("Image download failed with status {status}: {url}")]
    Upstream { status: u16, url: String },

    /// The request never produced a response
    #[error("Image download failed: {0}")]
    RequestError(String),

    /// A `data:` URL carried a payload that is not valid base64
    #[error("Invalid inline image: {0}")]
    InvalidDataUrl(String),
}

static DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:(.+);base64,(.+)$").expect("data URL pattern is valid")
});

/// Decodes a `data:<mime>;base64,<payload>` URL
///
/// Returns `Ok(None)` for anything that is not a base64 data URL, so callers
/// can skip it.
pub fn decode_data_url(url: &str) -> Result<Option<Vec<u8>>, AssetError> {
    let Some(caps) = DATA_URL.captures(url.trim()) else {
        return Ok(None);
    };
    let payload: String = caps[2].chars().filter(|c| !c.is_whitespace()).collect();

    STANDARD
        .decode(payload.as_bytes())
        .map(Some)
        .map_err(|e| AssetError::InvalidDataUrl(format!("{} ({e})", &caps[1])))
}

/// Trait for downloading remote images
pub trait ImageFetcher: Send + Sync {
    /// Downloads the image at `url`
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unreachable or answers with a
    /// non-success status.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

/// Plain HTTP image downloader
pub struct HttpImageFetcher {
    client: reqwest::blocking::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| AssetError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AssetError::Upstream {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|e| AssetError::RequestError(e.to_string()))
    }
}
