//! Draft Scanner
//!
//! Command-line front end. `monitor` watches the game window (or replays
//! screenshots) and prints one JSON status event per line on stdout.
//! `detect` runs a single detection pass on a saved screenshot.
//! Logs go to stderr and `logs/draft_scanner.log`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use draft_scanner::capture::{Frame, ReplaySource};
use draft_scanner::config::EngineConfig;
use draft_scanner::detection::DetectionSummary;
use draft_scanner::monitor::{Event, EventSink, JsonLinesSink, Monitor, ResultWriter};
use draft_scanner::{logging, paths, Engine};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detects the hero draft screen and reads its slots")]
struct Args {
    /// Engine config file. Defaults to config.json next to the executable.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Calibration directory (roi_config.json, anchor.png, ...).
    #[arg(long, global = true)]
    calibration: Option<PathBuf>,

    /// Reference catalog directory.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch for the draft screen and emit status events on stdout.
    Monitor {
        /// Replay a screenshot or a directory of screenshots instead of the live window.
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Restart the replay when it runs out.
        #[arg(long = "loop", requires = "replay")]
        looping: bool,
    },
    /// Run one detection pass on a screenshot and print the results.
    Detect {
        screenshot: PathBuf,

        /// Output directory for the result files.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn load_engine(args: &Args) -> Result<Engine> {
    let config = EngineConfig::load(args.config.as_deref()).context("Failed to load config")?;
    let calibration_dir = args
        .calibration
        .clone()
        .unwrap_or_else(paths::get_calibration_dir);
    let catalog_dir = args.catalog.clone().unwrap_or_else(paths::get_catalog_dir);

    log::info!("Calibration: {}", calibration_dir.display());
    log::info!("Catalog: {}", catalog_dir.display());
    Engine::load(config, &calibration_dir, &catalog_dir).context("Failed to initialize detection engine")
}

fn run_monitor(args: &Args, replay: Option<PathBuf>, looping: bool) -> Result<()> {
    let sink: Arc<dyn EventSink> = Arc::new(JsonLinesSink::stdout());

    let engine = match load_engine(args) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            sink.emit(Event::Error {
                msg: format!("{:#}", e),
            });
            return Err(e);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        log::info!("Stop requested");
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let writer = ResultWriter::new(engine.config().out_dir(), &engine.config().output);

    match replay {
        Some(path) => {
            let source = ReplaySource::open(&path, looping)
                .with_context(|| format!("Failed to open replay {}", path.display()))?;
            Monitor::new(engine, source, sink, writer, stop).run();
        }
        None => run_live(engine, sink, writer, stop)?,
    }
    Ok(())
}

#[cfg(windows)]
fn run_live(
    engine: Arc<Engine>,
    sink: Arc<dyn EventSink>,
    writer: ResultWriter,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let source = draft_scanner::capture::WindowSource::new(&engine.config().capture);
    log::info!(
        "Watching window \"{}\"",
        engine.config().capture.window_title
    );
    Monitor::new(engine, source, sink, writer, stop).run();
    Ok(())
}

#[cfg(not(windows))]
fn run_live(
    _engine: Arc<Engine>,
    sink: Arc<dyn EventSink>,
    _writer: ResultWriter,
    _stop: Arc<AtomicBool>,
) -> Result<()> {
    let msg = "live window capture is only available on Windows; use --replay";
    sink.emit(Event::Error { msg: msg.to_string() });
    anyhow::bail!(msg)
}

fn run_detect(args: &Args, screenshot: PathBuf, out: Option<PathBuf>) -> Result<()> {
    let engine = load_engine(args)?;
    let image = image::open(&screenshot)
        .with_context(|| format!("Failed to open {}", screenshot.display()))?
        .to_rgba8();
    log::info!(
        "Screenshot {}: {}x{}",
        screenshot.display(),
        image.width(),
        image.height()
    );

    let frame = Frame::new(image);
    let results = engine.detect(&frame.image);

    let out_dir = out.unwrap_or_else(|| engine.config().out_dir());
    ResultWriter::new(out_dir, &engine.config().output).write(&frame, &results)?;

    let summary = DetectionSummary::from_results(&results, engine.config().output.max_clean);
    let report = serde_json::json!({
        "results": results,
        "clean": summary.clean,
        "banned": summary.banned,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    paths::ensure_directories().context("Failed to create output directories")?;
    logging::init(&paths::get_logs_dir());
    logging::install_panic_hook();
    log::info!("Draft Scanner {} starting", env!("CARGO_PKG_VERSION"));

    match &args.command {
        Command::Monitor { replay, looping } => run_monitor(&args, replay.clone(), *looping),
        Command::Detect { screenshot, out } => run_detect(&args, screenshot.clone(), out.clone()),
    }
}
