//! Season/episode recognition for free-form media filenames
//!
//! Filenames are matched against an ordered cascade of patterns. The first
//! pattern that matches decides the result; later patterns are never tried.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

/// Season and episode numbers recognized in a filename
///
/// Either value may be absent: a bare `第5集` yields an episode without a
/// season, and an unrecognized name yields neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParsedSeasonEpisode {
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl ParsedSeasonEpisode {
    /// Returns the `(season, episode)` pair when both were recognized
    pub fn pair(&self) -> Option<(u32, u32)> {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => Some((season, episode)),
            _ => None,
        }
    }
}

/// One entry of the recognition cascade
struct Rule {
    name: &'static str,
    pattern: Regex,
    extract: fn(&Captures<'_>) -> ParsedSeasonEpisode,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("season/episode pattern is a valid regex")
}

/// Parses a captured group as a base-10 number, treating garbage as 0
fn number(caps: &Captures<'_>, group: usize) -> u32 {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn season_and_episode(caps: &Captures<'_>) -> ParsedSeasonEpisode {
    ParsedSeasonEpisode {
        season: Some(number(caps, 1)),
        episode: Some(number(caps, 2)),
    }
}

fn episode_only(caps: &Captures<'_>) -> ParsedSeasonEpisode {
    ParsedSeasonEpisode {
        season: None,
        episode: Some(number(caps, 1)),
    }
}

/// The cascade, highest priority first
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        // S01E02, s1e2, S01.E02, S01 - E02
        Rule {
            name: "sxxeyy",
            pattern: compile(r"(?i)s\s*0*(\d{1,3})\s*[ ._\-\[\(]*e\s*0*(\d{1,4})"),
            extract: season_and_episode,
        },
        // 1x02
        Rule {
            name: "nxnn",
            pattern: compile(
                r"(?i)(?:^|[ ._\-\[\(])0*(\d{1,3})\s*x\s*0*(\d{1,4})(?:$|[ ._\-\]\)])",
            ),
            extract: season_and_episode,
        },
        // 第1季第2集 / 第1季 第2话
        Rule {
            name: "cjk_season_episode",
            pattern: compile(r"第\s*0*(\d{1,3})\s*季[\s\S]{0,8}?第\s*0*(\d{1,4})\s*(?:集|话)"),
            extract: season_and_episode,
        },
        // 第2集 without a season
        Rule {
            name: "cjk_episode",
            pattern: compile(r"第\s*0*(\d{1,4})\s*(?:集|话)"),
            extract: episode_only,
        },
        // EP02, E02, Episode 02 without a season
        Rule {
            name: "episode_marker",
            pattern: compile(
                r"(?i)(?:^|[ ._\-\[\(])(?:ep|e|episode)\s*0*(\d{1,4})(?:$|[ ._\-\]\)])",
            ),
            extract: episode_only,
        },
    ]
});

/// Extracts season and episode numbers from a filename
///
/// Matching is case-insensitive. When no rule matches, both values are `None`.
///
/// # Examples
///
/// ```
/// use emby_meta::parse_season_episode;
///
/// let parsed = parse_season_episode("Show.S01E02.1080p.mkv");
/// assert_eq!(parsed.pair(), Some((1, 2)));
/// ```
pub fn parse_season_episode(filename: &str) -> ParsedSeasonEpisode {
    for rule in RULES.iter() {
        if let Some(caps) = rule.pattern.captures(filename) {
            let parsed = (rule.extract)(&caps);
            debug!(filename, rule = rule.name, ?parsed, "recognized season/episode");
            return parsed;
        }
    }
    ParsedSeasonEpisode::default()
}

/// Name of the rule that would decide the given filename, if any
#[cfg(test)]
fn deciding_rule(filename: &str) -> Option<&'static str> {
    RULES
        .iter()
        .find(|rule| rule.pattern.is_match(filename))
        .map(|rule| rule.name)
}
