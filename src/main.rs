// src/main.rs

use anyhow::Result;
use seat_monitor::config::Config;
use seat_monitor::detect::FrameDiffDetector;
use seat_monitor::monitor::Monitor;
use seat_monitor::persist::FileSink;
use seat_monitor::source::DirectoryFrameSource;
use tracing::{info, warn};

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    // Config load failure must not kill the monitor: remember the error,
    // init logging from whatever config we ended up with, then report it.
    let (config, load_error) = match Config::load(&config_path) {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.level.clone())
        .init();

    info!("Seat Occupancy Monitor starting");
    match load_error {
        Some(err) => warn!(
            "could not load {} ({err:#}), running with default configuration",
            config_path
        ),
        None => info!("✓ configuration loaded from {}", config_path),
    }

    let regions = config.regions();
    for region in &regions {
        info!("watching region {} ({})", region.id, region.name);
    }
    info!(
        "debounce: enter after {} frame(s), exit after {} frame(s), minimum interval {:.0}s",
        config.tracking.enter_threshold,
        config.tracking.exit_threshold,
        config.tracking.min_valid_duration_secs
    );

    let sink = FileSink::new(&config.data.data_dir)?;
    let source = DirectoryFrameSource::new(&config.data.frames_dir);
    let detector = FrameDiffDetector::from_config(&config.detection);

    let mut monitor = Monitor::new(&config, source, detector, Box::new(sink));

    let stop = monitor.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    })?;

    monitor.run()
}
