//! emby-meta - Generate Emby/Kodi/Jellyfin metadata libraries
//!
//! This library turns series metadata (fetched from a provider or typed in by
//! hand) into a library tree of NFO descriptors, artwork and rename plans,
//! packages it and reports progress as an event stream.

mod assets;
mod enrichment;
mod events;
mod file_tree;
pub mod metadata;
mod naming;
mod nfo;
mod packaging;
mod pipeline;
mod rename_plan;
mod request;
mod scheduler;
mod season_episode;
mod template;

// Re-export error types
pub use assets::AssetError;
pub use enrichment::EnrichmentError;
pub use file_tree::BundleError;
pub use metadata::MetadataError;
pub use packaging::{PackagingError, StorageError};
pub use request::RequestError;

pub use assets::{HttpImageFetcher, ImageFetcher, decode_data_url};
pub use enrichment::{ChatCompletionEnricher, SeriesEnricher, SeriesPatch};
pub use events::{EventStream, PipelineEvent, Progress};
pub use file_tree::FileTree;
pub use metadata::manual::{ManualEpisode, ManualStructure};
pub use metadata::{
    Episode, MediaType, MetadataProvider, ProviderMetadata, ProviderQuery, RemoteImage, Season,
    Series, Source,
};
pub use naming::{
    episode_nfo_name, episode_thumb_name, same_as_media_nfo_name, sanitize_path,
    season_folder_name, series_root_folder_name, split_ext,
};
pub use nfo::{episode_nfo, season_nfo, series_nfo, xml_escape};
pub use packaging::{
    BundlePackager, LocalStorage, Package, Packager, Storage, ZipPackager, default_data_dir,
    read_bundle, read_package, read_zip, storage_key,
};
pub use pipeline::{GenerationPipeline, Library, ResolvedMetadata, steps};
pub use rename_plan::{
    NfoNameMode, PlanScope, RenameConfig, RenamePlan, RenameRow, Resolution, build_plan,
};
pub use request::{GenerationRequest, ImageUploads, PreviewRequest};
pub use scheduler::{FetchConfig, FetchScheduler};
pub use season_episode::{ParsedSeasonEpisode, parse_season_episode};
pub use template::{TemplateContext, Value, render as render_template};

use thiserror::Error;

/// Broad category of a failure, for callers that need to react to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed or incomplete
    Validation,
    /// An external service failed or answered with a non-success status
    Upstream,
    /// An external answer could not be decoded
    Parse,
    /// A required collaborator or credential is missing
    Configuration,
    /// Packaging or persistence failed
    Io,
}

/// Top-level error type for generation runs
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The request was rejected
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    /// Error while fetching metadata
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Error while completing fields with AI
    #[error("AI completion error: {0}")]
    Enrichment(#[from] EnrichmentError),

    /// Error while retrieving artwork
    #[error("Image error: {0}")]
    Asset(#[from] AssetError),

    /// Error while packaging the tree
    #[error("Packaging error: {0}")]
    Packaging(#[from] PackagingError),

    /// Error while storing the package
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error while reading or unpacking a bundle
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// A required collaborator is not configured
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Request(_) => ErrorKind::Validation,
            GenerationError::Metadata(err) => match err {
                MetadataError::ParseError(_) => ErrorKind::Parse,
                MetadataError::NotFound(_) => ErrorKind::Validation,
                MetadataError::Upstream { .. } | MetadataError::RequestError(_) => {
                    ErrorKind::Upstream
                }
            },
            GenerationError::Enrichment(err) => match err {
                EnrichmentError::ParseError { .. } => ErrorKind::Parse,
                EnrichmentError::Upstream { .. } | EnrichmentError::ServiceError(_) => {
                    ErrorKind::Upstream
                }
            },
            GenerationError::Asset(err) => match err {
                AssetError::InvalidDataUrl(_) => ErrorKind::Validation,
                AssetError::Upstream { .. } | AssetError::RequestError(_) => ErrorKind::Upstream,
            },
            GenerationError::Packaging(_) | GenerationError::Storage(_) => ErrorKind::Io,
            GenerationError::Bundle(err) => match err {
                BundleError::Decode(_) => ErrorKind::Parse,
                BundleError::Io(_) | BundleError::UnsafePath(_) => ErrorKind::Io,
            },
            GenerationError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err: GenerationError = MetadataError::Upstream {
            status: 500,
            body: "oops".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(
            err.to_string(),
            "Metadata error: Provider request failed with status 500: oops"
        );

        let err: GenerationError = RequestError::MissingId(Source::Tmdb).into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: GenerationError = EnrichmentError::ParseError {
            reason: "eof".into(),
            response: String::new(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Parse);

        assert_eq!(
            GenerationError::Configuration("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            GenerationError::from(PackagingError::EmptyTree).kind(),
            ErrorKind::Io
        );
    }
}
