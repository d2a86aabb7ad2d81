// Habitat Cam CLI binary

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

use habitat_cam::camera::CameraId;
use habitat_cam::config::PipelineConfig;
use habitat_cam::db::{get_db_path, init_library_folders, open_db, schema};
use habitat_cam::jobs::{
    FfmpegSourceFactory, JobOrchestrator, ProgressState, RecordingJob, StreamUnitRunner,
};
use habitat_cam::metadata::FfprobeProbe;
use habitat_cam::persist::LibraryStore;
use habitat_cam::tools;

#[derive(Parser)]
#[command(name = "habitatcam")]
#[command(about = "Habitat Cam - motion tracking for multi-camera enclosure footage", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a library (database and output folders)
    Init {
        /// Library root path
        path: PathBuf,
    },

    /// Process a recording session with Camera1/, Camera2/ and Camera3/ folders
    Process {
        /// Recording session root
        root: PathBuf,
        /// Start time of the first file of every camera, e.g. 2024-05-01T08:00:00
        #[arg(short, long, value_parser = parse_time)]
        start: NaiveDateTime,
        /// Library root (defaults to current directory)
        #[arg(short, long)]
        library: Option<PathBuf>,
        /// JSON config file (defaults to <library>/.habitat/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of parallel workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// List processed videos
    Videos {
        /// Library root (defaults to current directory)
        #[arg(short, long)]
        library: Option<PathBuf>,
        /// Only this camera (Camera1, Camera2, Camera3)
        #[arg(long)]
        camera: Option<CameraId>,
        /// Range start; used together with --camera and --to
        #[arg(long, value_parser = parse_time)]
        from: Option<NaiveDateTime>,
        /// Range end
        #[arg(long, value_parser = parse_time)]
        to: Option<NaiveDateTime>,
    },

    /// Per-second activity across all cameras
    Activity {
        #[arg(long, value_parser = parse_time)]
        from: NaiveDateTime,
        #[arg(long, value_parser = parse_time)]
        to: NaiveDateTime,
        /// Library root (defaults to current directory)
        #[arg(short, long)]
        library: Option<PathBuf>,
    },

    /// Tracked coordinates per camera
    Coordinates {
        #[arg(long, value_parser = parse_time)]
        from: NaiveDateTime,
        #[arg(long, value_parser = parse_time)]
        to: NaiveDateTime,
        /// Library root (defaults to current directory)
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
}

fn parse_time(s: &str) -> std::result::Result<NaiveDateTime, String> {
    s.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM:SS: {}", e))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => cmd_init(path),
        Commands::Process { root, start, library, config, workers } => {
            cmd_process(root, start, library, config, workers)
        }
        Commands::Videos { library, camera, from, to } => cmd_videos(library, camera, from, to),
        Commands::Activity { from, to, library } => cmd_activity(from, to, library),
        Commands::Coordinates { from, to, library } => cmd_coordinates(from, to, library),
    }
}

fn library_root(library: Option<PathBuf>) -> PathBuf {
    let root = library.unwrap_or_else(|| PathBuf::from("."));
    root.canonicalize().unwrap_or(root)
}

fn open_library(library: Option<PathBuf>) -> Result<rusqlite::Connection> {
    let root = library_root(library);
    let db_path = get_db_path(&root);
    if !db_path.exists() {
        anyhow::bail!("No library at {}. Run 'habitatcam init' first.", root.display());
    }
    open_db(&db_path)
}

fn cmd_init(path: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&path)?;
    let root = library_root(Some(path));
    init_library_folders(&root)?;

    println!("Library initialized at {}", root.display());
    Ok(())
}

fn load_config(library: &Path, config: Option<PathBuf>, workers: Option<usize>) -> Result<PipelineConfig> {
    let mut cfg = match config {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::for_library(library)?,
    };
    cfg.library_root = library.to_path_buf();
    if workers.is_some() {
        cfg.workers = workers;
    }
    Ok(cfg)
}

fn cmd_process(
    root: PathBuf,
    start: NaiveDateTime,
    library: Option<PathBuf>,
    config: Option<PathBuf>,
    workers: Option<usize>,
) -> Result<()> {
    if let Some(tool) = tools::missing_tools().first() {
        anyhow::bail!("{} not found. Install it or set {}.", tool, tool.env_key());
    }

    let library = library_root(library);
    init_library_folders(&library)?;
    let cfg = load_config(&library, config, workers)?;

    let sources = Arc::new(FfmpegSourceFactory { width: cfg.frame_width, height: cfg.frame_height });
    let sink = Arc::new(LibraryStore::new(&library));
    let worker_count = cfg.worker_count();
    let runner = StreamUnitRunner::new(cfg, sources, sink);
    let orchestrator = JobOrchestrator::new(worker_count, Arc::new(FfprobeProbe), Arc::new(runner));

    let job = RecordingJob { root_path: root, nominal_start: start };
    let progress = ProgressState::new();
    let summary = orchestrator.run(&job, &mut |p| {
        if let Err(e) = progress.set(p as i64) {
            log::warn!("{}", e);
        }
        log::info!("Progress: {}%", progress.get());
    })?;

    println!("{}", summary.message);
    if summary.failed > 0 {
        anyhow::bail!("{} of {} files failed", summary.failed, summary.total);
    }
    Ok(())
}

fn cmd_videos(
    library: Option<PathBuf>,
    camera: Option<CameraId>,
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
) -> Result<()> {
    let conn = open_library(library)?;

    let videos = match (camera, from, to) {
        (Some(camera), Some(from), Some(to)) => {
            schema::find_videos_in_range(&conn, camera, &from, &to)?.selected
        }
        (_, None, None) => schema::list_processed_videos(&conn, camera)?,
        _ => anyhow::bail!("--from and --to need --camera and each other"),
    };

    if videos.is_empty() {
        println!("No processed videos.");
        return Ok(());
    }

    println!("{:<6} {:<8} {:<27} {:>9} {:>7}  {}", "ID", "Camera", "Start", "Duration", "Frames", "File");
    println!("{}", "-".repeat(90));
    for video in &videos {
        println!(
            "{:<6} {:<8} {:<27} {:>8.1}s {:>7}  {}",
            video.id,
            video.camera.to_string(),
            schema::format_timestamp(&video.start_time),
            video.duration,
            video.frame_count,
            video.filepath
        );
    }
    println!("\nTotal: {} videos", videos.len());
    Ok(())
}

fn cmd_activity(from: NaiveDateTime, to: NaiveDateTime, library: Option<PathBuf>) -> Result<()> {
    let conn = open_library(library)?;
    let activity = schema::activity_by_second(&conn, &from, &to)?;
    println!("{}", serde_json::to_string(&activity)?);
    Ok(())
}

fn cmd_coordinates(from: NaiveDateTime, to: NaiveDateTime, library: Option<PathBuf>) -> Result<()> {
    let conn = open_library(library)?;
    let coords = schema::coordinates_in_range(&conn, &from, &to)?;
    let by_name: std::collections::BTreeMap<String, _> = coords
        .into_iter()
        .map(|(camera, points)| (camera.to_string(), points))
        .collect();
    println!("{}", serde_json::to_string_pretty(&by_name)?);
    Ok(())
}
