//! NFO descriptor documents
//!
//! Renders series, seasons and episodes into the fixed XML schema that
//! Emby/Kodi/Jellyfin read. Optional elements are left out entirely when
//! their value is empty.

use crate::metadata::{Episode, Season, Series};
use std::fmt::Write;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Maximum number of actors a caller should pass to [`series_nfo`]
pub const MAX_ACTORS: usize = 30;

/// Escapes the five XML metacharacters
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Accumulates one document, two-space indented under the root element
struct Document {
    out: String,
    root: &'static str,
}

impl Document {
    fn open(root: &'static str) -> Self {
        let mut out = String::new();
        out.push_str(XML_DECLARATION);
        out.push('\n');
        let _ = writeln!(out, "<{root}>");
        Self { out, root }
    }

    fn element(&mut self, name: &str, value: &str) {
        let _ = writeln!(self.out, "  <{name}>{}</{name}>", xml_escape(value));
    }

    fn optional(&mut self, name: &str, value: &str) {
        if !value.trim().is_empty() {
            self.element(name, value);
        }
    }

    fn raw(&mut self, line: &str) {
        let _ = writeln!(self.out, "  {line}");
    }

    fn close(mut self) -> String {
        let _ = writeln!(self.out, "</{}>", self.root);
        self.out
    }
}

/// Builds `tvshow.nfo`
///
/// The unique id whose provider equals `primary_provider` is marked as the
/// default id. Actors are emitted as given; callers cap them at
/// [`MAX_ACTORS`].
pub fn series_nfo(series: &Series, primary_provider: &str) -> String {
    let mut doc = Document::open("tvshow");

    doc.element("title", &series.title);
    doc.optional("originaltitle", &series.original_title);
    doc.optional("year", &series.year);
    doc.optional("plot", &series.plot);
    doc.optional("premiered", &series.premiered);
    if let Some(rating) = series.rating.filter(|r| r.is_finite()) {
        doc.element("rating", &format!("{rating:.1}"));
    }

    for (provider, id) in &series.unique_ids {
        let default = if provider == primary_provider {
            r#" default="true""#
        } else {
            ""
        };
        doc.raw(&format!(
            r#"<uniqueid type="{}"{default}>{}</uniqueid>"#,
            xml_escape(provider),
            xml_escape(id)
        ));
    }

    for genre in &series.genres {
        doc.element("genre", genre);
    }
    for studio in &series.studios {
        doc.element("studio", studio);
    }
    for actor in &series.actors {
        doc.raw(&format!("<actor><name>{}</name></actor>", xml_escape(actor)));
    }

    doc.close()
}

/// Builds `season.nfo`
pub fn season_nfo(season: &Season) -> String {
    let mut doc = Document::open("season");
    doc.element("seasonnumber", &season.season_number.to_string());
    doc.optional("title", &season.title);
    doc.optional("plot", &season.plot);
    doc.close()
}

/// Builds an episode descriptor (`S01E02.nfo`)
pub fn episode_nfo(episode: &Episode) -> String {
    let mut doc = Document::open("episodedetails");
    doc.element("title", &episode.title);
    doc.element("season", &episode.season_number.to_string());
    doc.element("episode", &episode.episode_number.to_string());
    doc.optional("aired", &episode.aired);
    doc.optional("plot", &episode.plot);
    doc.close()
}
