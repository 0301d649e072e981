use clap::{Parser, Subcommand};
use emby_meta::{
    ChatCompletionEnricher, FetchConfig, GenerationPipeline, GenerationRequest, LocalStorage,
    PipelineEvent, PreviewRequest, default_data_dir, read_package,
};
use serde_json::json;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Generate Emby/Kodi metadata libraries from a JSON request
#[derive(Parser)]
#[command(name = "emby-meta")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a generation request and print its event stream
    Generate {
        /// Path to the request JSON
        request: PathBuf,

        /// Directory packaged libraries are stored in
        #[arg(short, long, env = "EMBY_META_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Public base URL used to build download links
        #[arg(short, long, env = "EMBY_META_BASE_URL")]
        base_url: Option<String>,

        /// Number of parallel downloads (1-6)
        #[arg(long, env = "FETCH_CONCURRENCY")]
        concurrency: Option<String>,

        /// Pause before each download in milliseconds (0-2000)
        #[arg(long, env = "FETCH_DELAY_MS")]
        delay_ms: Option<String>,
    },
    /// Print the rename preview for the first originals as JSON
    Preview {
        /// Path to the preview request JSON
        request: PathBuf,
    },
    /// Extract a stored package (zip or JSON bundle) into a directory
    Unpack {
        /// Path to the package
        package: PathBuf,

        /// Target directory
        target: PathBuf,
    },
}

fn read_input(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) => {
            eprintln!("Error: Failed to read {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn generate(
    request_path: &Path,
    output_dir: Option<PathBuf>,
    base_url: Option<String>,
    fetch: FetchConfig,
) -> i32 {
    let request = match GenerationRequest::from_json(&read_input(request_path)) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let output_dir = match output_dir.map(Ok).unwrap_or_else(default_data_dir) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let storage = LocalStorage::new(output_dir, base_url);
    info!(output_dir = %storage.base_dir().display(), "storing packages");

    let mut pipeline = GenerationPipeline::new()
        .with_fetch_config(fetch)
        .with_storage(storage);
    if let Some(enricher) = ChatCompletionEnricher::from_env() {
        pipeline = pipeline.with_enricher(enricher);
    }

    let mut stdout = io::stdout().lock();
    let mut failed = false;
    for event in pipeline.spawn(request) {
        if let PipelineEvent::Error { message } = &event {
            error!("{message}");
            failed = true;
        }
        // a closed stdout does not stop the run
        let _ = write!(stdout, "{}", event.to_sse()).and_then(|_| stdout.flush());
    }

    if failed { 1 } else { 0 }
}

fn preview(request_path: &Path) -> i32 {
    match PreviewRequest::from_json(&read_input(request_path)) {
        Ok(request) => {
            let plan = request.plan();
            println!("{}", json!({ "rows": plan.rows }));
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn unpack(package: &Path, target: &Path) -> i32 {
    let bytes = match fs::read(package) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: Failed to read {}: {}", package.display(), e);
            return 1;
        }
    };

    match read_package(&bytes).and_then(|(root, tree)| {
        tree.write_to_dir(target).map(|count| (root, count))
    }) {
        Ok((root, count)) => {
            println!("Unpacked {} file(s) of '{}' into {}", count, root, target.display());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Generate {
            request,
            output_dir,
            base_url,
            concurrency,
            delay_ms,
        } => {
            let fetch = FetchConfig::from_raw(concurrency.as_deref(), delay_ms.as_deref());
            generate(&request, output_dir, base_url, fetch)
        }
        Commands::Preview { request } => preview(&request),
        Commands::Unpack { package, target } => unpack(&package, &target),
    };

    process::exit(code);
}
