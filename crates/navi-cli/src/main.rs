//! `navi-cli` – Navi fusion demo host
//!
//! This binary wires the fusion engine to a simulated sea and renders the
//! live track table in the terminal.  It:
//!
//! 1. Loads `~/.navi/config.toml` (or `$NAVI_CONFIG`), falling back to
//!    defaults when the file is absent.
//! 2. Starts the source, ingest, cycle and display tasks, connected by the
//!    event bus.
//! 3. Raises proximity alerts and source-silence notices as they happen.
//! 4. Intercepts **Ctrl-C** to stop the engine and exit cleanly.

mod config;
mod render;
mod sim;

use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, interval};
use tracing::{debug, info, warn};

use navi_fusion::engine::{FusionEngine, ViewSnapshot};
use navi_fusion::proximity::ProximityMonitor;
use navi_fusion::source::{SpatialSource, VisionSource};
use navi_middleware::{EventBus, Topic, TopicReceiver};
use navi_types::{CycleReport, Event, EventPayload, NaviError, TrackKind};

use crate::render::ViewRenderer;
use crate::sim::SimulatedSea;

const EVENT_SOURCE: &str = "navi-cli";

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (defaults to "info"); NAVI_LOG_FORMAT=json switches to
    // newline-delimited JSON.  The track table itself still uses println!.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("NAVI_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; writing defaults.",
                config::config_path().display().to_string().dimmed()
            );
            let mut cfg = config::Config::default();
            if let Err(e) = config::save(&cfg) {
                warn!(error = %e, "could not write default config");
            }
            config::apply_env_overrides(&mut cfg);
            match cfg.validate() {
                Ok(()) => cfg,
                Err(e) => {
                    println!("{}: {}", "Config error".red(), e);
                    println!("  Ignoring environment overrides.");
                    config::Config::default()
                }
            }
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let engine = match FusionEngine::new(cfg.fusion.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            println!("{}: {}", "Invalid fusion configuration".red(), e);
            std::process::exit(2);
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let engine_for_ctrlc = Arc::clone(&engine);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping fusion engine …".yellow().bold());
        engine_for_ctrlc.stop();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!(
        "  Renderer {} · cycle every {} ms · proximity threshold {:.1} m\n",
        cfg.display.renderer.to_string().bold(),
        cfg.display.cycle_interval_ms,
        cfg.proximity.threshold_m
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg, Arc::clone(&engine)));

    let view = engine.current_view();
    println!(
        "\n  {} Stopped after {} cycle(s) with {} live track(s).",
        "✓".green().bold(),
        view.cycle(),
        view.len()
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Task wiring
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: config::Config, engine: Arc<FusionEngine>) {
    let bus = EventBus::default();
    let clock = Instant::now();

    let detections = bus.subscribe_to(Topic::Detections);
    let views = bus.subscribe_to(Topic::FusedView);
    let alerts = bus.subscribe_to(Topic::ProximityAlerts);
    let health = bus.subscribe_to(Topic::SourceHealth);

    let tasks = [
        tokio::spawn(source_loop(bus.clone(), Arc::clone(&engine), cfg.clone(), clock)),
        tokio::spawn(ingest_loop(detections, Arc::clone(&engine))),
        tokio::spawn(cycle_loop(bus.clone(), Arc::clone(&engine), cfg.clone(), clock)),
        tokio::spawn(display_loop(views, alerts, health, Arc::clone(&engine), cfg.display.renderer)),
    ];
    // The display task ends once every publisher has dropped its bus handle.
    drop(bus);

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "task ended abnormally");
        }
    }
}

fn publish(bus: &EventBus, payload: EventPayload) {
    if let Err(e) = bus.publish(Event::new(EVENT_SOURCE, payload)) {
        debug!(error = %e, "event dropped");
    }
}

fn seconds_since(clock: Instant) -> f64 {
    clock.elapsed().as_secs_f64()
}

/// Polls the simulated sea on the two source cadences and publishes every
/// detection to the bus.
async fn source_loop(bus: EventBus, engine: Arc<FusionEngine>, cfg: config::Config, clock: Instant) {
    let mut sea = SimulatedSea::new(
        cfg.fusion.projection.clone(),
        cfg.fusion.spawn_interval_s,
        cfg.simulation.max_objects,
    );
    let mut spatial_tick = interval(Duration::from_millis(cfg.simulation.spatial_interval_ms));
    let mut vision_tick = interval(Duration::from_millis(cfg.simulation.vision_interval_ms));

    while !engine.is_stopped() {
        tokio::select! {
            _ = spatial_tick.tick() => {
                match sea.poll_spatial(seconds_since(clock)) {
                    Ok(batch) => {
                        debug!(source = SpatialSource::id(&sea), count = batch.len(), "spatial batch");
                        for d in batch {
                            publish(&bus, EventPayload::SpatialDetection(d));
                        }
                    }
                    Err(e) => warn!(error = %e, "spatial source failed"),
                }
            }
            _ = vision_tick.tick() => {
                match sea.poll_vision(seconds_since(clock)) {
                    Ok(batch) => {
                        debug!(source = VisionSource::id(&sea), count = batch.len(), "vision batch");
                        for d in batch {
                            publish(&bus, EventPayload::VisionDetection(d));
                        }
                    }
                    Err(e) => warn!(error = %e, "vision source failed"),
                }
            }
        }
    }
}

/// Feeds detections from the bus into the engine.
async fn ingest_loop(mut detections: TopicReceiver, engine: Arc<FusionEngine>) {
    while let Some(event) = detections.next().await {
        let result = match event.payload {
            EventPayload::SpatialDetection(d) => engine.ingest_spatial(d),
            EventPayload::VisionDetection(d) => engine.ingest_vision(d),
            _ => Ok(()),
        };
        if let Err(NaviError::EngineStopped) = result {
            break;
        }
    }
}

/// Runs one fusion cycle per tick, then publishes the view notification,
/// proximity edges and newly silent sources.
async fn cycle_loop(bus: EventBus, engine: Arc<FusionEngine>, cfg: config::Config, clock: Instant) {
    let mut proximity = ProximityMonitor::new(cfg.proximity.threshold_m);
    let mut tick = interval(Duration::from_millis(cfg.display.cycle_interval_ms));
    let mut previously_silent = Vec::new();

    loop {
        tick.tick().await;
        let now = seconds_since(clock);
        let report = match engine.run_cycle(now) {
            Ok(report) => report,
            Err(NaviError::EngineStopped) => break,
            Err(e) => {
                warn!(error = %e, "fusion cycle failed");
                continue;
            }
        };

        let view = engine.current_view();
        for alert in proximity.evaluate(view.tracks()) {
            publish(&bus, EventPayload::Proximity(alert));
        }
        for kind in &report.silent_sources {
            if !previously_silent.contains(kind) {
                publish(
                    &bus,
                    EventPayload::SourceSilent {
                        source_kind: *kind,
                        silent_for_s: engine.silent_for(*kind, now).unwrap_or_default(),
                    },
                );
            }
        }
        previously_silent.clone_from(&report.silent_sources);

        let cycle = report.cycle;
        publish(&bus, EventPayload::ViewUpdated(report));

        if cfg.simulation.max_cycles.is_some_and(|max| cycle >= max) {
            info!(cycle, "cycle limit reached");
            engine.stop();
            break;
        }
    }
}

/// Prints the track table on every view update, and alerts as they arrive.
async fn display_loop(
    mut views: TopicReceiver,
    mut alerts: TopicReceiver,
    mut health: TopicReceiver,
    engine: Arc<FusionEngine>,
    renderer: ViewRenderer,
) {
    loop {
        tokio::select! {
            event = views.next() => match event {
                Some(Event { payload: EventPayload::ViewUpdated(report), .. }) => {
                    print_view(&engine.current_view(), &report, renderer);
                }
                Some(_) => {}
                None => break,
            },
            event = alerts.next() => match event {
                Some(Event { payload: EventPayload::Proximity(alert), .. }) => {
                    if alert.raised {
                        println!("  {}", alert.message().red().bold());
                    } else {
                        println!("  {}", alert.message().green());
                    }
                }
                Some(_) => {}
                None => break,
            },
            event = health.next() => match event {
                Some(Event { payload: EventPayload::SourceSilent { source_kind, silent_for_s }, .. }) => {
                    println!(
                        "  {}",
                        format!("{source_kind} source silent for {silent_for_s:.1}s").yellow()
                    );
                }
                Some(_) => {}
                None => break,
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

fn print_view(view: &ViewSnapshot, report: &CycleReport, renderer: ViewRenderer) {
    println!(
        "{}",
        format!(
            "── cycle {} · t={:.1}s · {} matched · {} spatial · {} vision · {} expired ──",
            report.cycle,
            report.now,
            report.matched_count,
            report.spatial_only_count,
            report.vision_only_count,
            report.expired_count
        )
        .dimmed()
    );
    for projection in view.projections() {
        let row = renderer.render(&projection);
        let row = match projection.kind {
            TrackKind::Matched => row.green(),
            TrackKind::SpatialOnly => row.yellow(),
            TrackKind::VisionOnly => row.cyan(),
        };
        println!("  {row}");
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   _  __           _ "#.bold().cyan());
    println!("{}", r#"  / |/ /__ __  __ (_)"#.bold().cyan());
    println!("{}", r#" /    / _ `/ |/ // / "#.bold().cyan());
    println!("{}", r#"/_/|_/\_,_/|___//_/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Navi".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Maritime sensor fusion & track lifecycle");
    println!();
}
