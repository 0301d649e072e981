//! Generation pipeline
//!
//! One request runs through a fixed sequence of stages: fetch metadata,
//! optionally enrich it, build the descriptor tree, download artwork, plan
//! renames, package and persist. Progress is reported as events; the run ends
//! with exactly one `done` or `error` event.

use crate::GenerationError;
use crate::assets::{HttpImageFetcher, ImageFetcher, decode_data_url};
use crate::enrichment::SeriesEnricher;
use crate::events::{EventSink, EventStream, PipelineEvent, Progress};
use crate::file_tree::FileTree;
use crate::metadata::{
    Episode, MetadataProvider, RemoteImage, Season, Series, Source, sorted_episodes,
};
use crate::naming::{
    RENAME_DIR, RENAME_MAP_NAME, RENAME_PREVIEW_NAME, SEASON_NFO_NAME, SEASON_POSTER_NAME,
    SERIES_NFO_NAME, episode_nfo_name, episode_thumb_name, sanitize_path, season_folder_name,
    series_root_folder_name,
};
use crate::nfo::{MAX_ACTORS, episode_nfo, season_nfo, series_nfo};
use crate::packaging::{Packager, Storage, ZipPackager, storage_key};
use crate::rename_plan::{PlanScope, RenamePlan, build_plan, same_as_media_names};
use crate::request::GenerationRequest;
use crate::scheduler::{FetchConfig, FetchScheduler};
use humansize::{DECIMAL, format_size};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, mpsc};
use std::thread;
use tracing::{debug, info, warn};

/// Step labels carried by progress events
pub mod steps {
    pub const INIT: &str = "Init";
    pub const METADATA: &str = "Metadata";
    pub const MANUAL_STRUCTURE: &str = "Manual structure";
    pub const AI_FILL: &str = "AI fill";
    pub const NFO: &str = "NFO";
    pub const IMAGES: &str = "Images";
    pub const RENAME: &str = "Rename";
    pub const PACKAGE: &str = "Package";
    pub const PERSIST: &str = "Persist";
}

/// Series, seasons and episodes a request resolved to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedMetadata {
    pub series: Series,
    pub seasons: Vec<Season>,
    pub episodes: Vec<Episode>,
    /// Provider artwork still to download
    pub images: Vec<RemoteImage>,
}

/// A generated library, ready to package
#[derive(Debug, Clone)]
pub struct Library {
    /// Root folder name; every path in `tree` starts with it
    pub root: String,
    pub tree: FileTree,
    pub rename: Option<RenamePlan>,
}

/// Runs generation requests against a set of collaborators
///
/// Cloning is cheap; all collaborators are shared.
#[derive(Clone)]
pub struct GenerationPipeline {
    providers: HashMap<Source, Arc<dyn MetadataProvider>>,
    enricher: Option<Arc<dyn SeriesEnricher>>,
    images: Arc<dyn ImageFetcher>,
    packager: Arc<dyn Packager>,
    storage: Option<Arc<dyn Storage>>,
    fetch: FetchConfig,
}

impl Default for GenerationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier type marked as default in `tvshow.nfo`
fn primary_provider(source: Source) -> String {
    match source {
        Source::Manual => Source::Tmdb.to_string(),
        other => other.to_string(),
    }
}

impl GenerationPipeline {
    /// A pipeline with HTTP image downloads, zip packaging, no providers and
    /// no storage
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            enricher: None,
            images: Arc::new(HttpImageFetcher::new()),
            packager: Arc::new(ZipPackager),
            storage: None,
            fetch: FetchConfig::default(),
        }
    }

    pub fn with_provider(mut self, source: Source, provider: impl MetadataProvider + 'static) -> Self {
        self.providers.insert(source, Arc::new(provider));
        self
    }

    pub fn with_enricher(mut self, enricher: impl SeriesEnricher + 'static) -> Self {
        self.enricher = Some(Arc::new(enricher));
        self
    }

    pub fn with_image_fetcher(mut self, fetcher: impl ImageFetcher + 'static) -> Self {
        self.images = Arc::new(fetcher);
        self
    }

    pub fn with_packager(mut self, packager: impl Packager + 'static) -> Self {
        self.packager = Arc::new(packager);
        self
    }

    pub fn with_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    pub fn with_fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch = config;
        self
    }

    /// Starts a run on its own thread and returns its event stream
    ///
    /// Events are handed over one at a time; the producer waits until the
    /// consumer has taken each one. Dropping the stream does not stop the run.
    pub fn spawn(&self, request: GenerationRequest) -> EventStream {
        let (tx, rx) = mpsc::sync_channel(0);
        let pipeline = self.clone();
        thread::spawn(move || {
            let sink = EventSink::new(tx);
            pipeline.run(&request, &sink);
        });
        EventStream::new(rx)
    }

    fn run(&self, request: &GenerationRequest, sink: &EventSink) {
        let outcome = self.generate(request, &mut |progress| sink.emit(progress));
        match outcome {
            Ok(download_url) => {
                info!(%download_url, "generation finished");
                sink.emit(PipelineEvent::Done { download_url });
            }
            Err(err) => {
                warn!(kind = ?err.kind(), "generation failed: {err}");
                sink.emit(PipelineEvent::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Runs every stage and returns the retrieval reference of the package
    ///
    /// # Errors
    ///
    /// The first failing stage aborts the run; nothing is stored.
    pub fn generate(
        &self,
        request: &GenerationRequest,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<String, GenerationError> {
        progress(Progress::new(steps::INIT, "Preparing"));
        let library = self.build_library(request, progress)?;
        self.publish(&library, progress)
    }

    /// Runs every stage up to, but not including, packaging
    pub fn build_library(
        &self,
        request: &GenerationRequest,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Library, GenerationError> {
        request.validate()?;
        let mut resolved = self.fetch_metadata(request, progress)?;

        if request.use_ai {
            self.enrich(&mut resolved.series, progress)?;
        }

        let root = series_root_folder_name(&resolved.series.title, &resolved.series.year);
        let mut tree = build_tree(request, &root, &resolved, progress)?;

        self.fetch_assets(&root, &resolved.images, &mut tree, progress)?;

        let rename = request.rename_config().map(|config| {
            let count = config.non_blank_originals().count();
            progress(Progress::new(steps::RENAME, format!("{count} original files")));

            let plan = build_plan(
                request.media_type,
                &resolved.series,
                &resolved.episodes,
                config,
                PlanScope::Full,
            );
            tree.insert_text(
                format!("{root}/{RENAME_DIR}/{RENAME_MAP_NAME}"),
                &plan.to_csv(),
            );
            tree.insert_text(
                format!("{root}/{RENAME_DIR}/{RENAME_PREVIEW_NAME}"),
                &plan.to_preview(),
            );
            plan
        });

        Ok(Library { root, tree, rename })
    }

    /// Packages a library and stores it
    pub fn publish(
        &self,
        library: &Library,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<String, GenerationError> {
        progress(Progress::new(
            steps::PACKAGE,
            format!("Packaging {} files", library.tree.len()),
        ));
        let package = self.packager.package(&library.root, &library.tree)?;
        let size = format_size(package.bytes.len(), DECIMAL);
        debug!(
            files = library.tree.len(),
            unpacked = %format_size(library.tree.total_bytes(), DECIMAL),
            %size,
            content_type = %package.content_type,
            "packaged library"
        );

        let storage = self.storage.as_ref().ok_or_else(|| {
            GenerationError::Configuration("No storage configured for packaged libraries".into())
        })?;
        let key = storage_key(&library.root, &package.extension);
        progress(Progress::new(steps::PERSIST, format!("Storing {key} ({size})")));

        Ok(storage.put(&key, &package)?)
    }

    fn fetch_metadata(
        &self,
        request: &GenerationRequest,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<ResolvedMetadata, GenerationError> {
        let mut series = request.manual.clone();

        if request.source == Source::Manual {
            progress(Progress::new(
                steps::MANUAL_STRUCTURE,
                "Building seasons and episodes from manual structure",
            ));
            let structure = request.manual_structure.clone().unwrap_or_default();
            let (seasons, episodes) = structure.build(&series, request.manual_episode());
            return Ok(ResolvedMetadata {
                series,
                seasons,
                episodes,
                images: Vec::new(),
            });
        }

        let source = request.source;
        let provider = self.providers.get(&source).ok_or_else(|| {
            GenerationError::Configuration(format!(
                "No metadata provider configured for source '{source}'"
            ))
        })?;

        let query = request.provider_query();
        progress(Progress::new(
            steps::METADATA,
            format!("Fetching {source} {}", query.id),
        ));
        let fetched = provider.fetch(&query, &mut *progress)?;

        series.fill_missing_from(&fetched.series);
        let mut seasons = fetched.seasons;
        let mut episodes = fetched.episodes;

        if source == Source::Anidb {
            series
                .unique_ids
                .entry(source.to_string())
                .or_insert_with(|| query.id.clone());
            if seasons.is_empty() {
                seasons.push(Season::placeholder(1));
            }
            if episodes.is_empty() {
                let title = if series.title.is_empty() {
                    "Episode 1".to_string()
                } else {
                    series.title.clone()
                };
                episodes.push(Episode {
                    season_number: 1,
                    episode_number: 1,
                    title,
                    ..Default::default()
                });
            }
        }

        info!(
            %source,
            seasons = seasons.len(),
            episodes = episodes.len(),
            images = fetched.images.len(),
            "metadata resolved"
        );

        Ok(ResolvedMetadata {
            series,
            seasons,
            episodes,
            images: fetched.images,
        })
    }

    fn enrich(
        &self,
        series: &mut Series,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<(), GenerationError> {
        let enricher = self.enricher.as_ref().ok_or_else(|| {
            GenerationError::Configuration("AI completion requested but no enricher configured".into())
        })?;

        progress(Progress::new(steps::AI_FILL, "Completing missing fields"));
        let patch = enricher.enrich(series)?;
        patch.apply_to(series);
        progress(Progress::new(steps::AI_FILL, "Completion merged"));
        Ok(())
    }

    fn fetch_assets(
        &self,
        root: &str,
        images: &[RemoteImage],
        tree: &mut FileTree,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<(), GenerationError> {
        if images.is_empty() {
            return Ok(());
        }

        let total = images.len();
        progress(Progress::counted(steps::IMAGES, 0, total, format!("{total} images")));

        let fetcher = &self.images;
        let downloaded = FetchScheduler::new(self.fetch).run(
            images,
            |image, _| fetcher.fetch(&image.url),
            |done, total| {
                progress(Progress::counted(
                    steps::IMAGES,
                    done,
                    total,
                    format!("Downloaded {done}/{total}"),
                ))
            },
        )?;

        for (image, bytes) in images.iter().zip(downloaded) {
            let key = sanitize_path(&image.key);
            if key.is_empty() {
                warn!(url = %image.url, "skipping image without a usable key");
                continue;
            }
            tree.insert(format!("{root}/{key}"), bytes);
        }
        Ok(())
    }
}

/// Builds the descriptor tree: `tvshow.nfo`, then per season its folder,
/// `season.nfo`, inline artwork and episode descriptors
fn build_tree(
    request: &GenerationRequest,
    root: &str,
    resolved: &ResolvedMetadata,
    progress: &mut dyn FnMut(Progress),
) -> Result<FileTree, GenerationError> {
    progress(Progress::new(steps::NFO, format!("Root folder: {root}")));

    let mut tree = FileTree::new();

    let mut series = resolved.series.clone();
    series.actors.truncate(MAX_ACTORS);
    tree.insert_text(
        format!("{root}/{SERIES_NFO_NAME}"),
        &series_nfo(&series, &primary_provider(request.source)),
    );

    let season_numbers: BTreeSet<u32> = resolved
        .seasons
        .iter()
        .map(|s| s.season_number)
        .chain(resolved.episodes.iter().map(|e| e.season_number))
        .collect();

    let mode = request
        .rename
        .as_ref()
        .map(|r| r.nfo_name_mode)
        .unwrap_or_default();
    let same_names = request
        .rename
        .as_ref()
        .map(|config| same_as_media_names(config, &resolved.episodes))
        .unwrap_or_default();
    let episodes = sorted_episodes(&resolved.episodes);

    let total = season_numbers.len();
    for (index, &season_number) in season_numbers.iter().enumerate() {
        progress(Progress::counted(
            steps::NFO,
            index + 1,
            total,
            format!("Season {season_number}"),
        ));

        let folder = format!("{root}/{}", season_folder_name(season_number));
        let season = resolved
            .seasons
            .iter()
            .find(|s| s.season_number == season_number)
            .cloned()
            .unwrap_or_else(|| Season::placeholder(season_number));
        tree.insert_text(format!("{folder}/{SEASON_NFO_NAME}"), &season_nfo(&season));

        if let Some(poster) = request.images.season(season_number) {
            if let Some(bytes) = decode_data_url(poster)? {
                tree.insert(format!("{folder}/{SEASON_POSTER_NAME}"), bytes);
            }
        }

        for episode in episodes.iter().filter(|e| e.season_number == season_number) {
            let number = episode.episode_number;
            let document = episode_nfo(episode);

            if mode.includes_standard() {
                tree.insert_text(
                    format!("{folder}/{}", episode_nfo_name(season_number, number)),
                    &document,
                );
            }
            if mode.includes_same_as_media() {
                for name in same_names.get(&(season_number, number)).into_iter().flatten() {
                    tree.insert_text(format!("{folder}/{name}"), &document);
                }
            }

            if let Some(thumb) = request.images.episode(season_number, number) {
                if let Some(bytes) = decode_data_url(thumb)? {
                    tree.insert(
                        format!("{folder}/{}", episode_thumb_name(season_number, number)),
                        bytes,
                    );
                }
            }
        }
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetError;
    use crate::enrichment::{EnrichmentError, SeriesPatch};
    use crate::metadata::manual::ManualStructure;
    use crate::metadata::{MetadataError, ProviderMetadata, ProviderQuery};
    use crate::packaging::{LocalStorage, read_zip};
    use crate::rename_plan::{NfoNameMode, RenameConfig};
    use crate::request::RequestError;
    use crate::ErrorKind;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeProvider {
        metadata: ProviderMetadata,
    }

    impl MetadataProvider for FakeProvider {
        fn fetch(
            &self,
            query: &ProviderQuery,
            progress: &mut dyn FnMut(Progress),
        ) -> Result<ProviderMetadata, MetadataError> {
            progress(Progress::new("Fake", format!("details {}", query.id)));
            Ok(self.metadata.clone())
        }
    }

    struct FailingProvider;

    impl MetadataProvider for FailingProvider {
        fn fetch(
            &self,
            _query: &ProviderQuery,
            _progress: &mut dyn FnMut(Progress),
        ) -> Result<ProviderMetadata, MetadataError> {
            Err(MetadataError::Upstream {
                status: 401,
                body: "invalid api key".into(),
            })
        }
    }

    struct FakeImages {
        fetched: Mutex<Vec<String>>,
    }

    impl ImageFetcher for FakeImages {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
            self.fetched.lock().unwrap().push(url.to_string());
            if url.contains("missing") {
                return Err(AssetError::Upstream {
                    status: 404,
                    url: url.to_string(),
                });
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    fn fake_images() -> FakeImages {
        FakeImages {
            fetched: Mutex::new(Vec::new()),
        }
    }

    struct FakeEnricher;

    impl SeriesEnricher for FakeEnricher {
        fn enrich(&self, _series: &Series) -> Result<SeriesPatch, EnrichmentError> {
            SeriesPatch::from_completion_text(
                r#"```json
{"title": "Ignored", "plot": "Filled in", "genres": ["Drama"]}
```"#,
            )
        }
    }

    fn manual_request(episodes: u32, mode: NfoNameMode, originals: &[&str]) -> GenerationRequest {
        GenerationRequest {
            source: Source::Manual,
            manual: Series {
                title: "Show".into(),
                year: "2020".into(),
                ..Default::default()
            },
            manual_structure: Some(ManualStructure {
                seasons: 1,
                episodes_per_season: Some(episodes),
                ..Default::default()
            }),
            rename: Some(RenameConfig {
                originals: originals.iter().map(|o| o.to_string()).collect(),
                nfo_name_mode: mode,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn tmdb_metadata() -> ProviderMetadata {
        ProviderMetadata {
            series: Series {
                title: "Provider Title".into(),
                year: "2019".into(),
                plot: "From provider".into(),
                unique_ids: BTreeMap::from([("tmdb".into(), "42".into())]),
                ..Default::default()
            },
            seasons: vec![Season::placeholder(1)],
            episodes: vec![
                Episode {
                    season_number: 1,
                    episode_number: 1,
                    title: "Pilot".into(),
                    ..Default::default()
                },
                Episode {
                    season_number: 2,
                    episode_number: 1,
                    title: "Return".into(),
                    ..Default::default()
                },
            ],
            images: vec![
                RemoteImage {
                    key: "poster.jpg".into(),
                    url: "https://img/poster".into(),
                },
                RemoteImage {
                    key: "fanart.jpg".into(),
                    url: "https://img/fanart".into(),
                },
            ],
        }
    }

    fn relative_paths(library: &Library) -> Vec<String> {
        let prefix = format!("{}/", library.root);
        library
            .tree
            .paths()
            .map(|p| p.strip_prefix(&prefix).unwrap_or(p).to_string())
            .collect()
    }

    fn collect_events(pipeline: &GenerationPipeline, request: GenerationRequest) -> Vec<PipelineEvent> {
        pipeline.spawn(request).collect()
    }

    #[test]
    fn test_manual_tree_both_mode_without_originals() {
        let library = GenerationPipeline::new()
            .build_library(&manual_request(2, NfoNameMode::Both, &[]), &mut |_| {})
            .unwrap();

        assert_eq!(library.root, "Show (2020)");
        let mut paths = relative_paths(&library);
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "Season 1/S01E01.nfo",
                "Season 1/S01E02.nfo",
                "Season 1/season.nfo",
                "tvshow.nfo",
            ]
        );
        assert!(library.rename.is_none());
    }

    #[test]
    fn test_manual_tree_same_as_media_only_for_parsed_originals() {
        let request = manual_request(
            2,
            NfoNameMode::Both,
            &["Show - S01E02 - 1080p.mkv", "random.mkv"],
        );
        let library = GenerationPipeline::new()
            .build_library(&request, &mut |_| {})
            .unwrap();

        let paths = relative_paths(&library);
        assert!(paths.contains(&"Season 1/Show - S01E02 - 1080p.nfo".to_string()));
        assert!(!paths.iter().any(|p| p.contains("random")));
        assert!(paths.contains(&"rename/rename_map.csv".to_string()));
        assert!(paths.contains(&"rename/rename_preview.txt".to_string()));

        let csv = library.tree.get("Show (2020)/rename/rename_map.csv").unwrap();
        let csv = String::from_utf8(csv.to_vec()).unwrap();
        assert_eq!(
            csv,
            "original,new\n\
             Show - S01E02 - 1080p.mkv,Show (2020)/Season 1/Show - S01E02 - Episode 2.mkv\n\
             random.mkv,Show (2020)/Season 1/Show - S01E01 - Episode 1.mkv"
        );
    }

    #[test]
    fn test_rename_rows_only_claim_descriptors_in_tree() {
        for mode in [NfoNameMode::SameAsMedia, NfoNameMode::Both, NfoNameMode::Standard] {
            let request = manual_request(
                2,
                mode,
                &["x S03E04.mp4", "A S01E01.mkv", "B S01E01.mkv", "loose.mkv"],
            );
            let library = GenerationPipeline::new()
                .build_library(&request, &mut |_| {})
                .unwrap();
            let plan = library.rename.as_ref().unwrap();

            for row in &plan.rows {
                let season = row.season.unwrap();
                for name in &row.nfo_names {
                    let path = format!("{}/{}/{name}", library.root, season_folder_name(season));
                    assert!(library.tree.contains(&path), "{mode:?}: {path} missing");
                }
            }
            assert!(plan.rows[0].nfo_names.is_empty());
        }

        let request = manual_request(2, NfoNameMode::SameAsMedia, &["A S01E01.mkv", "B S01E01.mkv"]);
        let library = GenerationPipeline::new()
            .build_library(&request, &mut |_| {})
            .unwrap();
        assert!(library.tree.contains("Show (2020)/Season 1/A S01E01.nfo"));
        assert!(library.tree.contains("Show (2020)/Season 1/B S01E01.nfo"));
    }

    #[test]
    fn test_unvalidated_request_is_rejected_before_fetching() {
        let pipeline = GenerationPipeline::new()
            .with_provider(Source::Tmdb, FailingProvider);
        let request = GenerationRequest {
            id: "  ".into(),
            ..Default::default()
        };

        let mut seen = Vec::new();
        let err = pipeline
            .build_library(&request, &mut |p| seen.push(p.step))
            .unwrap_err();
        assert!(matches!(err, GenerationError::Request(RequestError::MissingId(Source::Tmdb))));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(seen.is_empty());

        let mut request = manual_request(1, NfoNameMode::Standard, &[]);
        request.manual.year = "20/../../x".into();
        let events = collect_events(&pipeline, request);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Error { message }) if message.contains("20/../../x")
        ));
    }

    #[test]
    fn test_standard_mode_skips_same_as_media() {
        let request = manual_request(1, NfoNameMode::Standard, &["Show S01E01.mkv"]);
        let library = GenerationPipeline::new()
            .build_library(&request, &mut |_| {})
            .unwrap();
        assert!(!library.tree.contains("Show (2020)/Season 1/Show S01E01.nfo"));
        assert!(library.tree.contains("Show (2020)/Season 1/S01E01.nfo"));
    }

    #[test]
    fn test_inline_images() {
        let mut request = manual_request(1, NfoNameMode::Standard, &[]);
        request.images.seasons.insert("1".into(), "data:image/jpeg;base64,AQID".into());
        request.images.episodes.insert("1-1".into(), "data:image/jpeg;base64,BAU=".into());
        request.images.episodes.insert("1-2".into(), "https://not-inline".into());

        let library = GenerationPipeline::new()
            .build_library(&request, &mut |_| {})
            .unwrap();

        assert_eq!(library.tree.get("Show (2020)/Season 1/poster.jpg"), Some(&[1, 2, 3][..]));
        assert_eq!(
            library.tree.get("Show (2020)/Season 1/S01E01-thumb.jpg"),
            Some(&[4, 5][..])
        );
    }

    #[test]
    fn test_provider_metadata_and_images() {
        let images = Arc::new(fake_images());
        let pipeline = GenerationPipeline::new()
            .with_provider(Source::Tmdb, FakeProvider { metadata: tmdb_metadata() })
            .with_image_fetcher(SharedImages(images.clone()))
            .with_fetch_config(FetchConfig::new(2, 0));
        let request = GenerationRequest {
            id: "42".into(),
            manual: Series {
                title: "My Title".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut steps_seen = Vec::new();
        let library = pipeline
            .build_library(&request, &mut |p| steps_seen.push(p.step))
            .unwrap();

        assert_eq!(library.root, "My Title (2019)");
        let paths = relative_paths(&library);
        assert!(paths.contains(&"Season 2/season.nfo".to_string()));
        assert!(paths.contains(&"Season 2/S02E01.nfo".to_string()));
        assert_eq!(
            library.tree.get("My Title (2019)/fanart.jpg"),
            Some(&b"https://img/fanart"[..])
        );

        let tvshow = library.tree.get("My Title (2019)/tvshow.nfo").unwrap();
        let tvshow = String::from_utf8(tvshow.to_vec()).unwrap();
        assert!(tvshow.contains("<title>My Title</title>"));
        assert!(tvshow.contains("<plot>From provider</plot>"));
        assert!(tvshow.contains(r#"<uniqueid type="tmdb" default="true">42</uniqueid>"#));

        assert!(steps_seen.contains(&"Fake".to_string()));
        assert!(steps_seen.contains(&steps::IMAGES.to_string()));
        assert_eq!(images.fetched.lock().unwrap().len(), 2);
    }

    struct SharedImages(Arc<FakeImages>);

    impl ImageFetcher for SharedImages {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
            self.0.fetch(url)
        }
    }

    #[test]
    fn test_failed_image_fails_library() {
        let mut metadata = tmdb_metadata();
        metadata.images.push(RemoteImage {
            key: "banner.jpg".into(),
            url: "https://img/missing".into(),
        });
        let pipeline = GenerationPipeline::new()
            .with_provider(Source::Tmdb, FakeProvider { metadata })
            .with_image_fetcher(fake_images())
            .with_fetch_config(FetchConfig::new(2, 0));
        let request = GenerationRequest {
            id: "42".into(),
            ..Default::default()
        };

        let err = pipeline.build_library(&request, &mut |_| {}).unwrap_err();
        assert!(err.to_string().contains("404"));
        assert_eq!(err.kind(), crate::ErrorKind::Upstream);
    }

    #[test]
    fn test_anidb_placeholders() {
        let pipeline = GenerationPipeline::new().with_provider(
            Source::Anidb,
            FakeProvider {
                metadata: ProviderMetadata::default(),
            },
        );
        let request = GenerationRequest {
            source: Source::Anidb,
            id: "777".into(),
            manual: Series {
                title: "Anime".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        let library = pipeline.build_library(&request, &mut |_| {}).unwrap();

        let paths = relative_paths(&library);
        assert!(paths.contains(&"Season 1/S01E01.nfo".to_string()));
        let tvshow = String::from_utf8(library.tree.get("Anime/tvshow.nfo").unwrap().to_vec()).unwrap();
        assert!(tvshow.contains(r#"<uniqueid type="anidb" default="true">777</uniqueid>"#));
    }

    #[test]
    fn test_enrichment_fills_missing_fields() {
        let mut request = manual_request(1, NfoNameMode::Standard, &[]);
        request.use_ai = true;

        let library = GenerationPipeline::new()
            .with_enricher(FakeEnricher)
            .build_library(&request, &mut |_| {})
            .unwrap();

        let tvshow = String::from_utf8(library.tree.get("Show (2020)/tvshow.nfo").unwrap().to_vec()).unwrap();
        assert!(tvshow.contains("<title>Show</title>"));
        assert!(tvshow.contains("<plot>Filled in</plot>"));
        assert!(tvshow.contains("<genre>Drama</genre>"));
    }

    #[test]
    fn test_enrichment_without_enricher_is_configuration_error() {
        let mut request = manual_request(1, NfoNameMode::Standard, &[]);
        request.use_ai = true;
        let err = GenerationPipeline::new()
            .build_library(&request, &mut |_| {})
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_event_stream_success() {
        let dir = TempDir::new().unwrap();
        let pipeline = GenerationPipeline::new()
            .with_storage(LocalStorage::new(dir.path(), Some("https://meta.example.com".into())));

        let events = collect_events(&pipeline, manual_request(2, NfoNameMode::Both, &[]));

        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        let PipelineEvent::Done { download_url } = events.last().unwrap() else {
            panic!("expected done, got {:?}", events.last());
        };
        assert!(download_url.starts_with("https://meta.example.com/download?key=zips%2FShow+%282020%29-"));

        let PipelineEvent::Progress(first) = &events[0] else {
            panic!("expected progress first");
        };
        assert_eq!(first.step, steps::INIT);
        let step_names: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress(p) => Some(p.step.as_str()),
                _ => None,
            })
            .collect();
        let package_at = step_names.iter().position(|s| *s == steps::PACKAGE).unwrap();
        let persist_at = step_names.iter().position(|s| *s == steps::PERSIST).unwrap();
        assert!(package_at < persist_at);

        let stored: Vec<_> = std::fs::read_dir(dir.path().join("zips"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(stored.len(), 1);
        let (root, tree) = read_zip(&std::fs::read(&stored[0]).unwrap()).unwrap();
        assert_eq!(root, "Show (2020)");
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_event_stream_upstream_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = GenerationPipeline::new()
            .with_provider(Source::Tmdb, FailingProvider)
            .with_storage(LocalStorage::new(dir.path(), None));
        let request = GenerationRequest {
            id: "1".into(),
            ..Default::default()
        };

        let events = collect_events(&pipeline, request);

        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        match events.last().unwrap() {
            PipelineEvent::Error { message } => {
                assert!(message.contains("401"), "{message}");
                assert!(message.contains("invalid api key"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(!dir.path().join("bundles").exists());
    }

    #[test]
    fn test_missing_provider_and_storage() {
        let events = collect_events(
            &GenerationPipeline::new(),
            GenerationRequest {
                source: Source::Bangumi,
                id: "1".into(),
                ..Default::default()
            },
        );
        assert!(matches!(events.last(), Some(PipelineEvent::Error { message }) if message.contains("bangumi")));

        let events = collect_events(
            &GenerationPipeline::new(),
            manual_request(1, NfoNameMode::Standard, &[]),
        );
        assert!(matches!(events.last(), Some(PipelineEvent::Error { message }) if message.contains("storage")));
    }
}
