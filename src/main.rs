use std::{
    error::Error,
    path::{Path, PathBuf},
    process,
    sync::Arc,
    time::Duration,
};

use clap::{command, Parser, ValueEnum, ValueHint};
use futures_util::{stream, StreamExt};
use log::{debug, error, info, warn, LevelFilter};
use tokio::fs::{self, File};
use tokio_util::sync::CancellationToken;

use dzdl::{
    config::{Config, Credentials},
    download::{Download, Downloader},
    error::ErrorKind,
    gateway::{Gateway, Resource, ResourceKind},
    quality::QualityTier,
    session::Session,
    track::TrackDescriptor,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Kind of resource to download.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Kind {
    Track,
    Album,
    Playlist,
    Artist,
}

impl From<Kind> for ResourceKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Track => Self::Track,
            Kind::Album => Self::Album,
            Kind::Playlist => Self::Playlist,
            Kind::Artist => Self::Artist,
        }
    }
}

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kind of resource
    #[arg(value_enum)]
    kind: Kind,

    /// Identifier of the resource
    id: String,

    /// Secrets file
    ///
    /// Ensure that this file is kept secure and not shared publicly, as it
    /// contains sensitive information that can grant access to your Deezer
    /// account.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"), env = "SECRETS_FILE")]
    secrets_file: String,

    /// Audio quality
    ///
    /// One of `low` (MP3 128 kbps), `standard` (MP3 320 kbps) or `lossless`
    /// (FLAC). Premium accounts only for the latter two.
    #[arg(short = 'Q', long, default_value_t = QualityTier::Low, env = "QUALITY")]
    quality: QualityTier,

    /// Deadline per track in seconds
    #[arg(short, long, value_name = "SECONDS", default_value_t = Config::DEFAULT_TIMEOUT.as_secs(), env = "TIMEOUT")]
    timeout: u64,

    /// Maximum number of top songs to download for an artist
    #[arg(short, long, default_value_t = Config::DEFAULT_LIMIT, env = "LIMIT")]
    limit: usize,

    /// Number of tracks to download concurrently
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: u16,

    /// Output directory
    #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath, default_value_t = String::from("data"), env = "DATA_DIR")]
    output_dir: String,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive, and `verbose` is 0
            // by default. So this arm means: quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Loads the credentials from the secrets file.
fn load_credentials(secrets_file: &str) -> dzdl::error::Result<Credentials> {
    let credentials = Credentials::from_file(secrets_file);

    if let Err(ref e) = credentials {
        if e.kind == ErrorKind::NotFound {
            info!("read the documentation on how to set your secrets in {secrets_file}");
        }
    }

    credentials
}

/// Downloads one track to `<dir>/<id>.<ext>`.
///
/// The track is written to a `.part` file first, which is renamed when the
/// download succeeds and removed when it fails.
async fn save(
    downloader: &Downloader<Gateway>,
    config: &Config,
    dir: &Path,
    track: TrackDescriptor,
    cancel: &CancellationToken,
) -> dzdl::error::Result<Download> {
    let id = track.id;
    let partial = dir.join(format!("{id}.part"));

    let mut file = File::create(&partial).await?;
    let result = downloader
        .download(track, config.quality, config.timeout, &mut file, cancel)
        .await;
    drop(file);

    match result {
        Ok(download) => {
            let path = dir.join(format!("{id}.{}", download.format.extension()));
            fs::rename(&partial, &path).await?;

            if let Some(ref cover) = download.cover {
                let cover_path = dir.join(format!("{id}.jpg"));
                if let Err(e) = fs::write(&cover_path, cover).await {
                    warn!("failed to write {}: {e}", cover_path.display());
                }
            }

            Ok(download)
        }
        Err(e) => {
            if let Err(e) = fs::remove_file(&partial).await {
                warn!("failed to remove {}: {e}", partial.display());
            }
            Err(e)
        }
    }
}

/// Main application logic.
///
/// # Errors
///
/// Returns an error when the configuration is invalid, the resource cannot
/// be resolved or any track fails to download.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let credentials = load_credentials(&args.secrets_file)?;

    let mut config = Config::new(credentials);
    config.quality = args.quality;
    config.timeout = Duration::from_secs(args.timeout);
    config.limit = args.limit;
    config.jobs = args.jobs.into();

    let resource = Resource::new(args.kind.into(), &args.id)?;
    let dir = PathBuf::from(&args.output_dir);
    fs::create_dir_all(&dir).await?;

    let session = Arc::new(Session::new(&config)?);
    let gateway = Gateway::new(Arc::clone(&session), config.limit);
    let downloader = Downloader::new(session, gateway);

    let cancel = CancellationToken::new();
    let tracks = tokio::select! {
        biased;

        _ = tokio::signal::ctrl_c() => return Err("interrupted".into()),
        tracks = downloader.tracks(resource) => tracks?,
    };
    info!("downloading {} tracks of {resource}", tracks.len());

    let downloads = stream::iter(tracks)
        .map(|track| {
            let label = track.to_string();
            let future = save(&downloader, &config, &dir, track, &cancel);
            async move { (label, future.await) }
        })
        .buffer_unordered(config.jobs)
        .collect::<Vec<_>>();
    tokio::pin!(downloads);

    let results = tokio::select! {
        biased;

        _ = tokio::signal::ctrl_c() => {
            // Let every download observe cancellation and clean up after itself.
            info!("shutting down gracefully");
            cancel.cancel();
            downloads.await
        }
        results = &mut downloads => results,
    };

    let mut failures = 0;
    for (label, result) in results {
        match result {
            Ok(download) => {
                info!(
                    "{label}: {} bytes of {} ({} quality)",
                    download.progress.bytes, download.format, download.quality
                );
            }
            Err(e) => {
                error!("{label}: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} tracks failed to download").into());
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the downloads.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
