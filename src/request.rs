//! Generation requests
//!
//! A request is parsed and validated once, before any pipeline work starts,
//! and is then passed around as an immutable value.

use crate::metadata::manual::{ManualEpisode, ManualStructure};
use crate::metadata::{Episode, MediaType, ProviderQuery, Series, Source, lenient};
use crate::rename_plan::{PlanScope, RenameConfig, RenamePlan, build_plan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while reading a request
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request body is not valid JSON of the expected shape
    #[error("Malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A provider source was selected without an id to look up
    #[error("Source '{0}' requires an id")]
    MissingId(Source),

    /// The manual year is neither empty nor four digits
    #[error("Invalid year '{0}': expected four digits")]
    InvalidYear(String),
}

fn is_year(value: &str) -> bool {
    value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Artwork supplied inline as `data:` URLs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageUploads {
    /// Season number to data URL
    pub seasons: BTreeMap<String, String>,
    /// `"<season>-<episode>"` to data URL
    pub episodes: BTreeMap<String, String>,
}

impl ImageUploads {
    pub fn season(&self, season: u32) -> Option<&str> {
        self.seasons.get(&season.to_string()).map(String::as_str)
    }

    pub fn episode(&self, season: u32, episode: u32) -> Option<&str> {
        self.episodes
            .get(&format!("{season}-{episode}"))
            .map(String::as_str)
    }
}

/// One metadata generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    pub source: Source,
    pub media_type: MediaType,
    pub lang: String,
    /// Provider id of the series or movie
    #[serde(deserialize_with = "lenient::text")]
    pub id: String,
    pub episode_group_id: Option<String>,
    #[serde(rename = "useAI")]
    pub use_ai: bool,
    /// Series fields typed in by the user; these win over provider data
    pub manual: Series,
    pub manual_structure: Option<ManualStructure>,
    pub manual_episode: Option<ManualEpisode>,
    pub rename: Option<RenameConfig>,
    pub images: ImageUploads,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            source: Source::default(),
            media_type: MediaType::default(),
            lang: "zh-CN".to_string(),
            id: String::new(),
            episode_group_id: None,
            use_ai: false,
            manual: Series::default(),
            manual_structure: None,
            manual_episode: None,
            rename: None,
            images: ImageUploads::default(),
        }
    }
}

impl GenerationRequest {
    /// Parses and validates a JSON request body
    ///
    /// # Example
    ///
    /// ```
    /// use emby_meta::GenerationRequest;
    ///
    /// let request = GenerationRequest::from_json(r#"{"source": "manual", "manual": {"title": "Show"}}"#).unwrap();
    /// assert_eq!(request.manual.title, "Show");
    /// assert_eq!(request.lang, "zh-CN");
    /// ```
    pub fn from_json(body: &str) -> Result<Self, RequestError> {
        let request: Self = serde_json::from_str(body)?;
        request.validate()?;
        Ok(request)
    }

    /// Checks the fields that serde cannot
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.source != Source::Manual && self.id.trim().is_empty() {
            return Err(RequestError::MissingId(self.source));
        }
        let year = self.manual.year.trim();
        if !year.is_empty() && !is_year(year) {
            return Err(RequestError::InvalidYear(year.to_string()));
        }
        Ok(())
    }

    /// The single manual episode, if one with non-zero numbers was given
    pub fn manual_episode(&self) -> Option<&ManualEpisode> {
        self.manual_episode.as_ref().filter(|e| e.is_valid())
    }

    /// Rename settings, if any originals were supplied
    pub fn rename_config(&self) -> Option<&RenameConfig> {
        self.rename
            .as_ref()
            .filter(|r| r.non_blank_originals().next().is_some())
    }

    pub fn provider_query(&self) -> ProviderQuery {
        ProviderQuery {
            media_type: self.media_type,
            lang: self.lang.clone(),
            id: self.id.trim().to_string(),
            episode_group_id: self
                .episode_group_id
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string),
        }
    }
}

/// A rename preview over already known series and episode metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewRequest {
    pub media_type: MediaType,
    pub series: Series,
    pub episodes: Vec<Episode>,
    pub rename: RenameConfig,
}

impl PreviewRequest {
    pub fn from_json(body: &str) -> Result<Self, RequestError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Rename plan over the first originals only
    pub fn plan(&self) -> RenamePlan {
        build_plan(
            self.media_type,
            &self.series,
            &self.episodes,
            &self.rename,
            PlanScope::Preview,
        )
    }
}
