//! CLI entry point for the reference speed tile builder.
//!
//! Provides subcommands for building a reference tile from a year of weekly
//! fragments in S3, over HTTP, or in a local mirror; building from an
//! explicit fragment list; and inspecting tile paths and fragments.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ref_speed_tiles::{
    config::{Settings, TileJob},
    fetch::{
        DirectoryStore, FragmentList, FragmentSource, HttpStore, ObjectStore, S3Store,
        WeeklyArchive, maybe_gunzip,
    },
    output::print_json,
    parser::{decode_fragment, subtile_count},
    pipeline::{OutputOptions, run_job},
    tiles::{Level, TileHierarchy},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "ref_speed_tiles")]
#[command(about = "Build yearly reference speed tiles from weekly speed tiles", long_about = None)]
struct Cli {
    /// Turn on DEBUG level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TileArgs {
    /// Hierarchy level (0 highway, 1 arterial, 2 local)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=2))]
    level: u32,

    /// Tile id within the level
    #[arg(long)]
    tile_id: u32,
}

#[derive(Args)]
struct OutputArgs {
    /// Root directory for reference tiles
    #[arg(long)]
    ref_tile_path: PathBuf,

    /// CSV file to append data-quality warnings to
    #[arg(long)]
    warnings_csv: Option<PathBuf>,

    /// Log a JSON summary of the job
    #[arg(long, default_value_t = false)]
    summary: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct StoreArgs {
    /// S3 bucket holding the weekly speed tiles
    #[arg(long)]
    bucket: Option<String>,

    /// Base URL serving the weekly speed tiles
    #[arg(long)]
    http_base: Option<String>,

    /// Local directory mirroring the bucket layout
    #[arg(long)]
    archive_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a year of weekly fragments for one tile and build its reference tile
    Build {
        #[command(flatten)]
        store: StoreArgs,

        /// The year to aggregate
        #[arg(long)]
        year: i32,

        #[command(flatten)]
        tile: TileArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Every week is a single fragment; do not look for sibling subtiles
        #[arg(long, default_value_t = false)]
        no_separate_subtiles: bool,

        /// Cap on concurrent sibling downloads (default: one per subtile)
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
    /// Build a reference tile from an explicit list of local fragment files
    Local {
        /// Speed tile fragments (raw or .gz) for one tile
        #[arg(long, num_args = 1.., required = true)]
        speedtile_list: Vec<PathBuf>,

        #[command(flatten)]
        tile: TileArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the relative path of a tile
    Path {
        #[command(flatten)]
        tile: TileArgs,
    },
    /// Decode a fragment file and report its subtiles
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    // Logging setup: colored stderr + JSON rolling log file
    let log_dir = Path::new(&settings.log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&settings.log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("ref_speed_tiles.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_level = if cli.verbose { "debug" } else { "info" };
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(stderr_level.parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let hierarchy = TileHierarchy::world();

    match cli.command {
        Commands::Build {
            store,
            year,
            tile,
            output,
            no_separate_subtiles,
            concurrency,
        } => {
            let job = tile_job(year, &tile, &hierarchy)?;
            info!(year, level = %job.level, tile_id = job.tile_id, "Building reference tile");

            let separate = !no_separate_subtiles;

            if let Some(bucket) = store.bucket {
                info!(bucket = %bucket, "Reading fragments from S3");
                let source = weekly_archive(
                    S3Store::from_env(bucket).await,
                    &hierarchy,
                    &settings,
                    separate,
                    concurrency,
                );
                execute(&source, &hierarchy, &job, &output).await?;
            } else if let Some(base) = store.http_base {
                info!(base_url = %base, "Reading fragments over HTTP");
                let source = weekly_archive(
                    HttpStore::new(base)?,
                    &hierarchy,
                    &settings,
                    separate,
                    concurrency,
                );
                execute(&source, &hierarchy, &job, &output).await?;
            } else if let Some(dir) = store.archive_dir {
                info!(dir = %dir.display(), "Reading fragments from local archive");
                let source = weekly_archive(
                    DirectoryStore::new(dir),
                    &hierarchy,
                    &settings,
                    separate,
                    concurrency,
                );
                execute(&source, &hierarchy, &job, &output).await?;
            }
        }
        Commands::Local {
            speedtile_list,
            tile,
            output,
        } => {
            // the year only names remote objects, which a local list does not use
            let job = tile_job(0, &tile, &hierarchy)?;
            info!(files = speedtile_list.len(), "Building reference tile from local fragments");
            let source = FragmentList::new(speedtile_list);
            execute(&source, &hierarchy, &job, &output).await?;
        }
        Commands::Path { tile } => {
            let job = tile_job(0, &tile, &hierarchy)?;
            println!("{}", hierarchy.path_for(job.level, job.tile_id));
        }
        Commands::Inspect { file } => {
            inspect(&file)?;
        }
    }

    Ok(())
}

fn tile_job(year: i32, tile: &TileArgs, hierarchy: &TileHierarchy) -> Result<TileJob> {
    let level = Level::from_index(tile.level).context("level must be 0, 1 or 2")?;
    let job = TileJob::new(year, level, tile.tile_id);
    job.validate(hierarchy)?;
    Ok(job)
}

fn weekly_archive<S: ObjectStore + 'static>(
    store: S,
    hierarchy: &TileHierarchy,
    settings: &Settings,
    separate_subtiles: bool,
    concurrency: Option<usize>,
) -> WeeklyArchive<S> {
    let archive = WeeklyArchive::new(store, hierarchy.clone())
        .with_weeks(settings.weeks_per_year)
        .with_separate_subtiles(separate_subtiles);
    match concurrency {
        Some(max) => archive.with_max_concurrency(max),
        None => archive,
    }
}

async fn execute<S: FragmentSource>(
    source: &S,
    hierarchy: &TileHierarchy,
    job: &TileJob,
    output: &OutputArgs,
) -> Result<()> {
    let options = OutputOptions {
        ref_tile_path: output.ref_tile_path.clone(),
        warnings_csv: output.warnings_csv.clone(),
    };
    let summary = run_job(source, hierarchy, job, &options).await?;
    if output.summary {
        print_json(&summary)?;
    }
    Ok(())
}

/// Decodes one fragment file and logs what it contains.
#[tracing::instrument(fields(file = %path.display()))]
fn inspect(path: &Path) -> Result<()> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let bytes = maybe_gunzip(&path.display().to_string(), &raw)?;

    let fragments = decode_fragment(&bytes)?;
    for (i, f) in fragments.iter().enumerate() {
        info!(
            subtile = i,
            level = f.level,
            index = f.index,
            start_segment_index = f.start_segment_index,
            total_segments = f.total_segments,
            subtile_segments = f.subtile_segments,
            range_start = f.range_start,
            range_end = f.range_end,
            entries_per_segment = f.entries_per_segment(),
            samples = f.speeds.len(),
            "Subtile"
        );
    }

    let siblings = subtile_count(&bytes)?;
    info!(subtiles = fragments.len(), sibling_fragments = siblings, "Fragment summary");
    Ok(())
}
