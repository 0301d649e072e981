//! Rename planning
//!
//! Maps original media filenames onto library paths rendered from the rename
//! templates, and decides which descriptor files each media file gets.

use crate::metadata::{Episode, MediaType, Series, find_episode, sorted_episodes};
use crate::naming::{
    episode_nfo_name, same_as_media_nfo_name, sanitize_path, season_episode_code, split_ext,
};
use crate::season_episode::{ParsedSeasonEpisode, parse_season_episode};
use crate::template::{TemplateContext, render};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Default template for series and anime
pub const DEFAULT_TV_FORMAT: &str = "{{ title }}{% if year %} ({{ year }}){% endif %}/Season {{ season }}/{{ title }} - {{ season_episode }}{% if episode_title %} - {{ episode_title }}{% endif %}{{ fileExt }}";

/// Default template for movies
pub const DEFAULT_MOVIE_FORMAT: &str = "{{ title }}{% if year %} ({{ year }}){% endif %}/{{ title }}{% if year %} ({{ year }}){% endif %}{{ fileExt }}";

/// Number of originals considered by a preview plan
pub const PREVIEW_LIMIT: usize = 50;

/// How episode descriptor files are named
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NfoNameMode {
    /// `S01E02.nfo`
    Standard,
    /// Named after the media file, e.g. `Show - 02.nfo`
    SameAsMedia,
    /// Both of the above
    #[default]
    Both,
}

impl NfoNameMode {
    pub fn includes_standard(self) -> bool {
        matches!(self, NfoNameMode::Standard | NfoNameMode::Both)
    }

    pub fn includes_same_as_media(self) -> bool {
        matches!(self, NfoNameMode::SameAsMedia | NfoNameMode::Both)
    }
}

/// Rename settings of one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenameConfig {
    pub tv_format: String,
    pub movie_format: String,
    /// Free text exposed to templates as `customization`
    pub customization: String,
    /// Original media filenames, in the order they should be mapped
    pub originals: Vec<String>,
    pub nfo_name_mode: NfoNameMode,
}

impl RenameConfig {
    fn tv_template(&self) -> &str {
        non_blank_or(&self.tv_format, DEFAULT_TV_FORMAT)
    }

    fn movie_template(&self) -> &str {
        non_blank_or(&self.movie_format, DEFAULT_MOVIE_FORMAT)
    }

    /// Originals that are not blank, trimmed
    pub fn non_blank_originals(&self) -> impl Iterator<Item = &str> {
        self.originals
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
    }
}

fn non_blank_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

/// Whether a plan covers every original or only a preview of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanScope {
    /// First [`PREVIEW_LIMIT`] originals
    Preview,
    Full,
}

/// How a row got its season and episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Read from the filename
    Parsed,
    /// Assigned from the fallback cursor
    Fallback,
    /// Movies have no episodes
    Movie,
}

/// One original filename and where it goes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRow {
    pub original: String,
    /// What the filename itself revealed
    pub parsed: ParsedSeasonEpisode,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub resolution: Resolution,
    pub new_path: String,
    /// Descriptor filenames to emit for this media file
    pub nfo_names: Vec<String>,
}

/// Ordered rename rows for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenamePlan {
    pub rows: Vec<RenameRow>,
}

/// Shared position over the sorted episode list for unparsable filenames
struct FallbackCursor<'a> {
    episodes: &'a [Episode],
    position: usize,
}

impl<'a> FallbackCursor<'a> {
    fn new(episodes: &'a [Episode]) -> Self {
        Self {
            episodes,
            position: 0,
        }
    }

    /// Season/episode for the next unparsable filename, and its episode if any
    fn next(&mut self) -> (u32, u32, Option<&'a Episode>) {
        let assigned = match self.episodes.get(self.position) {
            Some(ep) => (ep.season_number, ep.episode_number, Some(ep)),
            None => {
                let episode = u32::try_from(self.position + 1).unwrap_or(u32::MAX);
                (1, episode, None)
            }
        };
        self.position += 1;
        assigned
    }
}

fn base_context(series: &Series, config: &RenameConfig, original: &str, ext: &str) -> TemplateContext {
    let id = |provider: &str| series.unique_ids.get(provider).cloned().unwrap_or_default();
    TemplateContext::new()
        .with("title", series.title.as_str())
        .with("en_title", "")
        .with("original_title", series.original_title.as_str())
        .with("year", series.year.as_str())
        .with("tmdbid", id("tmdb"))
        .with("imdbid", id("imdb"))
        .with("original_name", original)
        .with("fileExt", ext)
        .with("customization", config.customization.as_str())
}

/// Builds the rename plan for the given originals
///
/// Filenames are processed in input order. For series, the season and
/// episode come from the filename when it carries both; otherwise the next
/// episode in `(season, episode)` order is assigned. Every non-blank original
/// yields exactly one row.
pub fn build_plan(
    media_type: MediaType,
    series: &Series,
    episodes: &[Episode],
    config: &RenameConfig,
    scope: PlanScope,
) -> RenamePlan {
    let limit = match scope {
        PlanScope::Preview => PREVIEW_LIMIT,
        PlanScope::Full => usize::MAX,
    };
    let sorted = sorted_episodes(episodes);
    let mut cursor = FallbackCursor::new(&sorted);
    let mode = config.nfo_name_mode;

    let rows = config
        .originals
        .iter()
        .take(limit)
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(|original| {
            let (_, ext) = split_ext(original);
            let mut ctx = base_context(series, config, original, ext);
            let parsed = parse_season_episode(original);

            let (template, season_episode, resolution, known) = if media_type == MediaType::Movie {
                (config.movie_template(), None, Resolution::Movie, false)
            } else {
                let (season, episode, hit, resolution) = match parsed.pair() {
                    Some((season, episode)) => (
                        season,
                        episode,
                        find_episode(&sorted, season, episode),
                        Resolution::Parsed,
                    ),
                    None => {
                        let (season, episode, hit) = cursor.next();
                        debug!(original, season, episode, "assigned episode from fallback cursor");
                        (season, episode, hit, Resolution::Fallback)
                    }
                };

                ctx.insert("season", season);
                ctx.insert("episode", episode);
                ctx.insert("season_episode", season_episode_code(season, episode));
                ctx.insert("episode_title", hit.map(|e| e.title.clone()).unwrap_or_default());
                ctx.insert("episode_date", hit.map(|e| e.aired.clone()).unwrap_or_default());
                ctx.insert("season_year", "");

                (config.tv_template(), Some((season, episode)), resolution, hit.is_some())
            };

            let mut new_path = sanitize_path(&render(template, &ctx));
            if new_path.is_empty() {
                new_path = sanitize_path(original);
            }

            RenameRow {
                original: original.to_string(),
                parsed,
                season: season_episode.map(|(s, _)| s),
                episode: season_episode.map(|(_, e)| e),
                resolution,
                new_path,
                nfo_names: if known {
                    nfo_names_for(mode, original, season_episode, resolution)
                } else {
                    Vec::new()
                },
            }
        })
        .collect();

    RenamePlan { rows }
}

fn nfo_names_for(
    mode: NfoNameMode,
    original: &str,
    season_episode: Option<(u32, u32)>,
    resolution: Resolution,
) -> Vec<String> {
    let Some((season, episode)) = season_episode else {
        return Vec::new();
    };

    let mut names = Vec::new();
    if mode.includes_standard() {
        names.push(episode_nfo_name(season, episode));
    }
    if mode.includes_same_as_media() && resolution == Resolution::Parsed {
        if let Some(name) = same_as_media_nfo_name(original) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Same-as-media descriptor names keyed by the `(season, episode)` parsed
/// from each original
///
/// Only originals whose filename reveals both numbers of a known episode
/// take part. Several originals may share an episode; each keeps its name.
pub fn same_as_media_names(
    config: &RenameConfig,
    episodes: &[Episode],
) -> BTreeMap<(u32, u32), Vec<String>> {
    let mut names: BTreeMap<(u32, u32), Vec<String>> = BTreeMap::new();
    for original in config.non_blank_originals() {
        let Some((season, episode)) = parse_season_episode(original).pair() else {
            continue;
        };
        if find_episode(episodes, season, episode).is_none() {
            continue;
        }
        if let Some(name) = same_as_media_nfo_name(original) {
            let entry = names.entry((season, episode)).or_default();
            if !entry.contains(&name) {
                entry.push(name);
            }
        }
    }
    names
}

/// Quotes a CSV field when it contains a comma, quote or newline
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl RenamePlan {
    /// `original,new` rename map
    pub fn to_csv(&self) -> String {
        std::iter::once("original,new".to_string())
            .chain(
                self.rows
                    .iter()
                    .map(|row| format!("{},{}", csv_escape(&row.original), csv_escape(&row.new_path))),
            )
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Human-readable `original  ->  new` listing
    pub fn to_preview(&self) -> String {
        self.rows
            .iter()
            .map(|row| format!("{}  ->  {}", row.original, row.new_path))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
