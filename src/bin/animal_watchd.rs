//! animal_watchd - camera polling daemon
//!
//! This daemon:
//! 1. Pulls a still frame from the configured camera every cycle
//! 2. Runs the detector and keeps animals of interest above the confidence threshold
//! 3. Draws boxes, labels and the running accuracy onto the frame
//! 4. Forwards every retained detection to the alert sink (turtles raise alerts)
//! 5. Writes the annotated frame to the snapshot output, if configured
//!
//! Ctrl-C stops the loop after the current cycle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::Rgb;

use animal_watch::{
    alert::{AlertSink, ConsoleSink, Dispatcher, MqttSink, NullSink},
    config::{SinkKind, WatchConfig},
    AnimalTaxonomy, Annotator, ClassTable, ColorPalette, DetectionFilter, ExitSignal, Monitor,
    SnapshotDisplay,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Animal detection camera monitor")]
struct Args {
    /// Config file (TOML or JSON).
    #[arg(long, env = "ANIMAL_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Camera base URL; overrides the config file.
    #[arg(long, env = "ANIMAL_WATCH_CAMERA_URL")]
    camera_url: Option<String>,

    /// Detector backend (stub or tract); overrides the config file.
    #[arg(long, env = "ANIMAL_WATCH_BACKEND")]
    backend: Option<String>,

    /// Write each annotated frame to this JPEG path.
    #[arg(long, env = "ANIMAL_WATCH_SNAPSHOT_OUT")]
    snapshot_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = WatchConfig::load_from(args.config.as_deref())?;
    if let Some(url) = args.camera_url {
        cfg.camera.base_url = url;
    }
    if let Some(backend) = args.backend {
        cfg.model.backend = backend.parse()?;
    }
    if let Some(path) = args.snapshot_out {
        cfg.display.snapshot_out = Some(path);
    }
    cfg.validate()?;

    let classes = ClassTable::load(&cfg.model.class_file)?;
    let taxonomy = AnimalTaxonomy::with_overrides(classes, cfg.taxonomy.clone());
    log::info!(
        "class table {} ({} names), resolvers: {}",
        cfg.model.class_file.display(),
        taxonomy.classes().len(),
        taxonomy.strategy_names().join(" -> ")
    );
    let filter = DetectionFilter::new(taxonomy).with_threshold(cfg.confidence_threshold);

    let source = animal_watch::open_source(&cfg.camera)?;
    let detector = animal_watch::build_detector(&cfg.model)?;

    let mut palette = ColorPalette::default();
    for (label, rgb) in &cfg.display.colors {
        palette = palette.with_color(label.to_lowercase(), Rgb(*rgb));
    }
    let mut annotator = Annotator::new(palette);
    if let Some(path) = &cfg.display.font_path {
        annotator = annotator.with_font(Annotator::load_font(path)?);
        log::info!("overlay font {}", path.display());
    }

    let sink: Box<dyn AlertSink> = match cfg.alerts.sink {
        SinkKind::Console => Box::new(ConsoleSink::stdout()),
        SinkKind::Mqtt => Box::new(MqttSink::connect(&cfg.alerts.mqtt)?),
        SinkKind::None => Box::new(NullSink),
    };

    let exit = ExitSignal::new();
    let handler_exit = exit.clone();
    ctrlc::set_handler(move || {
        log::info!("exit requested");
        handler_exit.raise();
    })
    .context("install Ctrl-C handler")?;
    let display = SnapshotDisplay::new(cfg.display.snapshot_out.clone(), exit);

    let mut monitor = Monitor::new(
        source,
        detector,
        filter,
        annotator,
        Dispatcher::new(sink),
        Box::new(display),
    )
    .with_rotation(cfg.camera.rotation)
    .with_detector_threshold(cfg.model.detector_threshold)
    .with_retry_backoff(cfg.retry_backoff);

    log::info!("animal_watchd running. camera {}", monitor.source_description());
    log::info!(
        "detector={} threshold={:.2} filter={:.2} rotation={:?}",
        monitor.detector_name(),
        cfg.model.detector_threshold,
        cfg.confidence_threshold,
        cfg.camera.rotation
    );
    log::info!(
        "alert sink={} retry_backoff={:?} snapshot_out={}",
        monitor.sink_name(),
        monitor.retry_backoff(),
        cfg.display
            .snapshot_out
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    monitor.run();
    Ok(())
}
