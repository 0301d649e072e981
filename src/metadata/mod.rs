//! Normalized series metadata and the provider seam.
//!
//! Providers (TMDB, Bangumi, AniDB, ...) live outside this crate and hand the
//! pipeline a normalized [`Series`] with its seasons and episodes. The manual
//! source is built in (see [`manual`]).

pub mod manual;
pub(crate) mod lenient;

use crate::events::Progress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while fetching metadata from a provider.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The provider answered with a non-success status
    #[error("Provider request failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The request never produced a response
    #[error("Request failed: {0}")]
    RequestError(String),

    /// The provider's response could not be decoded
    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    /// The requested item does not exist at the provider
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Where the metadata for a request comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Tmdb,
    Bangumi,
    Anidb,
    Manual,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Tmdb => write!(f, "tmdb"),
            Source::Bangumi => write!(f, "bangumi"),
            Source::Anidb => write!(f, "anidb"),
            Source::Manual => write!(f, "manual"),
        }
    }
}

/// Kind of media being described.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Tv,
    Movie,
    Anime,
}

/// Series-level metadata.
///
/// Deserialization is forgiving, since the same shape comes from form input
/// and from AI completions: text fields accept numbers, `rating` accepts a
/// numeric string, and the list fields accept one string separated by
/// `, ， / |`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Series {
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub original_title: String,
    /// Four-digit year or empty
    #[serde(deserialize_with = "lenient::text")]
    pub year: String,
    #[serde(deserialize_with = "lenient::text")]
    pub plot: String,
    /// ISO date or empty
    #[serde(deserialize_with = "lenient::text")]
    pub premiered: String,
    /// 0..10
    #[serde(deserialize_with = "lenient::rating")]
    pub rating: Option<f64>,
    #[serde(deserialize_with = "lenient::list")]
    pub genres: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub studios: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub actors: Vec<String>,
    /// Provider name to external id
    pub unique_ids: BTreeMap<String, String>,
}

impl Series {
    /// Fills every empty field from `other`
    ///
    /// Fields that already hold a value are kept. Unique ids are merged, with
    /// the ids in `other` replacing ids of the same provider.
    pub fn fill_missing_from(&mut self, other: &Series) {
        fn fill(target: &mut String, source: &str) {
            if target.trim().is_empty() && !source.trim().is_empty() {
                *target = source.to_string();
            }
        }
        fn fill_list(target: &mut Vec<String>, source: &[String]) {
            if target.is_empty() && !source.is_empty() {
                *target = source.to_vec();
            }
        }

        fill(&mut self.title, &other.title);
        fill(&mut self.original_title, &other.original_title);
        fill(&mut self.year, &other.year);
        fill(&mut self.plot, &other.plot);
        fill(&mut self.premiered, &other.premiered);

        if !self.rating.is_some_and(f64::is_finite) && other.rating.is_some_and(f64::is_finite) {
            self.rating = other.rating;
        }

        fill_list(&mut self.genres, &other.genres);
        fill_list(&mut self.studios, &other.studios);
        fill_list(&mut self.actors, &other.actors);

        self.unique_ids.extend(
            other
                .unique_ids
                .iter()
                .map(|(provider, id)| (provider.clone(), id.clone())),
        );
    }
}

/// Represents a season of a series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Season {
    pub season_number: u32,
    pub title: String,
    pub plot: String,
}

impl Season {
    /// Placeholder used when episodes reference a season nobody described
    pub fn placeholder(season_number: u32) -> Self {
        Self {
            season_number,
            title: format!("Season {season_number}"),
            plot: String::new(),
        }
    }
}

/// Represents a single episode of a series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Episode {
    pub season_number: u32,
    pub episode_number: u32,
    pub title: String,
    pub plot: String,
    /// ISO date or empty
    pub aired: String,
}

/// Returns the episodes ordered by `(season, episode)`
///
/// The sort is stable, so duplicates keep their input order.
pub fn sorted_episodes(episodes: &[Episode]) -> Vec<Episode> {
    let mut sorted = episodes.to_vec();
    sorted.sort_by_key(|e| (e.season_number, e.episode_number));
    sorted
}

/// First episode with the given season and episode number
pub fn find_episode(episodes: &[Episode], season: u32, episode: u32) -> Option<&Episode> {
    episodes
        .iter()
        .find(|e| e.season_number == season && e.episode_number == episode)
}

/// A provider-hosted image to download into the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteImage {
    /// Path relative to the series root, e.g. `poster.jpg`
    pub key: String,
    pub url: String,
}

/// What the pipeline asks a provider for.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuery {
    pub media_type: MediaType,
    pub lang: String,
    pub id: String,
    pub episode_group_id: Option<String>,
}

/// Everything a provider returns for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMetadata {
    pub series: Series,
    pub seasons: Vec<Season>,
    pub episodes: Vec<Episode>,
    pub images: Vec<RemoteImage>,
}

/// Trait for metadata providers.
///
/// Implementors fetch one series (or movie) with its seasons and episodes and
/// report intermediate steps through `progress`.
pub trait MetadataProvider: Send + Sync {
    /// Fetches metadata for the queried id.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached, answers with a
    /// non-success status, or returns data that cannot be decoded.
    fn fetch(
        &self,
        query: &ProviderQuery,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<ProviderMetadata, MetadataError>;
}
