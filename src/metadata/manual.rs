//! Season/episode structure typed in by the user instead of fetched

use super::{Episode, Season, Series};
use crate::naming::season_episode_code;
use crate::template::{TemplateContext, render};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default episode title template of the manual structure
pub const DEFAULT_EPISODE_TITLE_TEMPLATE: &str = "Episode {{ episode }}";

/// A grid of seasons and episodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualStructure {
    /// Number of seasons, at least 1
    pub seasons: u32,
    /// Episodes in every season not listed in `season_episode_map`
    pub episodes_per_season: Option<u32>,
    /// Season number to episode count
    pub season_episode_map: BTreeMap<String, u32>,
    pub episode_title_template: String,
    /// Season number to plot
    pub season_plots: BTreeMap<String, String>,
    /// `"<season>-<episode>"` to plot
    pub episode_plots: BTreeMap<String, String>,
}

impl Default for ManualStructure {
    fn default() -> Self {
        Self {
            seasons: 1,
            episodes_per_season: None,
            season_episode_map: BTreeMap::new(),
            episode_title_template: String::new(),
            season_plots: BTreeMap::new(),
            episode_plots: BTreeMap::new(),
        }
    }
}

/// A single episode, used instead of the grid when present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualEpisode {
    pub season_number: u32,
    pub episode_number: u32,
    pub title: String,
    pub plot: String,
    pub aired: String,
}

impl ManualEpisode {
    /// Season and episode numbers are both non-zero
    pub fn is_valid(&self) -> bool {
        self.season_number > 0 && self.episode_number > 0
    }
}

impl ManualStructure {
    fn title_template(&self) -> &str {
        if self.episode_title_template.trim().is_empty() {
            DEFAULT_EPISODE_TITLE_TEMPLATE
        } else {
            &self.episode_title_template
        }
    }

    fn episode_count(&self, season: u32) -> u32 {
        self.season_episode_map
            .get(&season.to_string())
            .copied()
            .filter(|&n| n > 0)
            .or(self.episodes_per_season.map(|n| n.max(1)))
            .unwrap_or(1)
    }

    fn season(&self, season: u32) -> Season {
        Season {
            plot: self
                .season_plots
                .get(&season.to_string())
                .cloned()
                .unwrap_or_default(),
            ..Season::placeholder(season)
        }
    }

    fn episode_plot(&self, season: u32, episode: u32) -> String {
        self.episode_plots
            .get(&format!("{season}-{episode}"))
            .cloned()
            .unwrap_or_default()
    }

    fn episode_title(&self, series: &Series, season: u32, episode: u32) -> String {
        let ctx = TemplateContext::new()
            .with("season", season)
            .with("episode", episode)
            .with("season_episode", season_episode_code(season, episode))
            .with("title", series.title.as_str())
            .with("year", series.year.as_str());

        let title = render(self.title_template(), &ctx);
        if title.is_empty() {
            format!("Episode {episode}")
        } else {
            title
        }
    }

    /// Builds seasons and episodes for `series`
    ///
    /// A valid `single` episode replaces the grid; its own title and plot win
    /// over the templated ones.
    pub fn build(
        &self,
        series: &Series,
        single: Option<&ManualEpisode>,
    ) -> (Vec<Season>, Vec<Episode>) {
        if let Some(single) = single.filter(|e| e.is_valid()) {
            let (s, e) = (single.season_number, single.episode_number);
            let title = if single.title.trim().is_empty() {
                self.episode_title(series, s, e)
            } else {
                single.title.clone()
            };
            let plot = if single.plot.trim().is_empty() {
                self.episode_plot(s, e)
            } else {
                single.plot.clone()
            };

            let episode = Episode {
                season_number: s,
                episode_number: e,
                title,
                plot,
                aired: single.aired.clone(),
            };
            return (vec![self.season(s)], vec![episode]);
        }

        let mut seasons = Vec::new();
        let mut episodes = Vec::new();
        for s in 1..=self.seasons.max(1) {
            seasons.push(self.season(s));
            for e in 1..=self.episode_count(s) {
                episodes.push(Episode {
                    season_number: s,
                    episode_number: e,
                    title: self.episode_title(series, s, e),
                    plot: self.episode_plot(s, e),
                    aired: String::new(),
                });
            }
        }
        (seasons, episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Series {
        Series {
            title: "Show".into(),
            year: "2021".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_grid() {
        let (seasons, episodes) = ManualStructure::default().build(&series(), None);
        assert_eq!(seasons.len(), 1);
        assert_eq!(seasons[0].title, "Season 1");
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].title, "Episode 1");
    }

    #[test]
    fn test_grid_with_overrides() {
        let structure = ManualStructure {
            seasons: 2,
            episodes_per_season: Some(3),
            season_episode_map: BTreeMap::from([("2".into(), 1)]),
            episode_title_template: "{{ title }} {{ season_episode }}".into(),
            season_plots: BTreeMap::from([("1".into(), "First season".into())]),
            episode_plots: BTreeMap::from([("1-2".into(), "Middle".into())]),
        };

        let (seasons, episodes) = structure.build(&series(), None);

        assert_eq!(seasons.len(), 2);
        assert_eq!(seasons[0].plot, "First season");
        assert_eq!(seasons[1].plot, "");
        let keys: Vec<_> = episodes
            .iter()
            .map(|e| (e.season_number, e.episode_number))
            .collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (1, 3), (2, 1)]);
        assert_eq!(episodes[1].title, "Show S01E02");
        assert_eq!(episodes[1].plot, "Middle");
    }

    #[test]
    fn test_zero_seasons_means_one() {
        let structure = ManualStructure {
            seasons: 0,
            episodes_per_season: Some(2),
            ..Default::default()
        };
        let (seasons, episodes) = structure.build(&series(), None);
        assert_eq!(seasons.len(), 1);
        assert_eq!(episodes.len(), 2);
    }

    #[test]
    fn test_empty_title_render_falls_back() {
        let structure = ManualStructure {
            episode_title_template: "{{ unknown }}".into(),
            ..Default::default()
        };
        let (_, episodes) = structure.build(&series(), None);
        assert_eq!(episodes[0].title, "Episode 1");
    }

    #[test]
    fn test_single_episode_replaces_grid() {
        let structure = ManualStructure {
            seasons: 3,
            episodes_per_season: Some(10),
            episode_plots: BTreeMap::from([("2-5".into(), "Templated plot".into())]),
            ..Default::default()
        };
        let single = ManualEpisode {
            season_number: 2,
            episode_number: 5,
            aired: "2021-01-01".into(),
            ..Default::default()
        };

        let (seasons, episodes) = structure.build(&series(), Some(&single));

        assert_eq!(seasons, vec![Season::placeholder(2)]);
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].title, "Episode 5");
        assert_eq!(episodes[0].plot, "Templated plot");
        assert_eq!(episodes[0].aired, "2021-01-01");
    }

    #[test]
    fn test_invalid_single_episode_is_ignored() {
        let single = ManualEpisode {
            season_number: 0,
            episode_number: 4,
            title: "Ignored".into(),
            ..Default::default()
        };
        let (_, episodes) = ManualStructure::default().build(&series(), Some(&single));
        assert_eq!(episodes[0].title, "Episode 1");
    }
}
