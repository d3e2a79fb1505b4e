//! Noise Meter Application
//!
//! Starts the metering engine against the configured microphone and
//! renders the live loudness as a stepped terminal bar, with a warning
//! once the reading crosses the configured limit.

use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use noise_meter::{
    audio::device::list_input_devices,
    config::MeterConfig,
    constants::ZONE_BUCKETS,
    engine::{MeterEngine, SupervisorState},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting noise meter");

    // Optional config file path as the first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = MeterConfig::load(config_path.as_deref())?;

    // List available input devices
    println!("\n=== Available Input Devices ===");
    for device in list_input_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Max channels: {}", device.max_channels);
    }
    println!();

    let mut engine = MeterEngine::new(&config);

    // An open failure here is the one fatal path: no microphone, or the
    // platform refused capture. Rerun once the device is available.
    engine.start()?;

    tracing::info!(
        sample_rate = config.audio.sample_rate,
        format = %config.audio.format,
        limit_db = config.display.limit_db,
        "metering - press Ctrl+C to stop"
    );

    let poll = config.engine.read_interval();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(poll) => render(&engine),
        }
    }

    println!();
    engine.stop().await;
    Ok(())
}

/// Draw one meter line in place: level, zone bar, status text
fn render(engine: &MeterEngine) {
    let level = engine.level();
    let zone = engine.zone();

    let mut bar = String::with_capacity(ZONE_BUCKETS + 1);
    for k in 0..ZONE_BUCKETS {
        bar.push(if k < zone.active_buckets { '#' } else { '.' });
    }
    bar.push(if zone.over_limit { '!' } else { ' ' });

    let status = match engine.state() {
        SupervisorState::Stalled | SupervisorState::Recovering => "recovering input...".to_string(),
        _ if zone.over_limit => {
            format!(
                "Too loud! Try to keep it below {:.0} dB.",
                engine.classifier().limit()
            )
        }
        _ => String::new(),
    };

    print!("\rDecibel level: {:5.1} dB  [{}]  {:<42}", level, bar, status);
    let _ = std::io::stdout().flush();
}
