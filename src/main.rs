use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};

use voicepool::audio::{AudioEngine, DeviceManager, OutputStream, Source};
use voicepool::cli::{CliApp, PlayArgs};
use voicepool::config::ConfigManager;
use voicepool::error::EngineError;
use voicepool::logging::{EngineLog, LOG_LEVEL_ENV};
use voicepool::models::SourceKind;

// Block codecs refill one frame per decode, so streams need a faster tick
// than the engine default to stay ahead of playback.
const STREAMING_TICK_MS: u64 = 50;
const STATUS_INTERVAL: Duration = Duration::from_millis(100);

fn main() {
    if std::env::var(LOG_LEVEL_ENV).is_err() {
        std::env::set_var(LOG_LEVEL_ENV, "warn");
    }
    if let Err(e) = EngineLog::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let args = PlayArgs::parse();
    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("Error: {}", e.user_message());
        std::process::exit(1);
    }
}

fn run(args: PlayArgs) -> Result<(), EngineError> {
    let mut devices = DeviceManager::new()?;
    if args.list_devices {
        let current = devices.current_device_name();
        for name in devices.list_devices() {
            let marker = if current.as_deref() == Some(name.as_str()) { "*" } else { " " };
            match devices.get_capabilities(&name) {
                Some(caps) => println!(
                    "{} {} ({} ch, {:?} Hz)",
                    marker, name, caps.max_channels, caps.supported_sample_rates
                ),
                None => println!("{} {}", marker, name),
            }
        }
        return Ok(());
    }

    let config_manager = ConfigManager::new()?;
    let mut config = config_manager.get_config().clone();
    match args.tick_ms {
        Some(ms) => config.tick_interval_ms = ms,
        None if args.stream => {
            config.tick_interval_ms = config.tick_interval_ms.min(STREAMING_TICK_MS);
        }
        None => {}
    }
    debug!("Scheduler period {} ms", config.tick_interval_ms);

    let device_name = args.device.clone().or_else(|| config.output_device.clone());
    devices.select_device(device_name.as_deref())?;
    let (_output, driver) = OutputStream::open(&devices, config.max_voices)?;
    let mut engine = AudioEngine::new(Box::new(driver), config)?;

    let sources = load_sources(&engine, &args);
    if sources.is_empty() {
        engine.shutdown();
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst)) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    while running.load(Ordering::SeqCst) && sources.iter().any(|(source, _)| !source.is_stopped()) {
        print_status(&sources);
        thread::sleep(STATUS_INTERVAL);
    }
    println!();

    engine.shutdown();
    let stats = engine.pool().events().statistics();
    info!(
        "Played {} source(s): {} underrun(s), {} decode fault(s)",
        sources.len(),
        stats.buffer_underruns,
        stats.decode_faults
    );
    Ok(())
}

/// Load, configure and start every requested file. Files that fail to load
/// or find no free voice are reported and skipped.
fn load_sources(engine: &AudioEngine, args: &PlayArgs) -> Vec<(Source, String)> {
    let kind = args.source_kind();
    let mut sources = Vec::new();

    for file in &args.files {
        let path = CliApp::expand_path(file);
        let name = CliApp::display_name(&path);
        let source = match engine.load(&path, kind) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Skipping {}: {}", name, e.user_message());
                continue;
            }
        };

        source.set_volume(args.gain());
        source.set_pitch(args.pitch);
        source.set_looping(args.looping);
        if let Some(start) = args.start {
            match CliApp::validate_seek_time(start, source.duration()) {
                Ok(start) if source.seek(start) => {}
                Ok(_) => eprintln!("{}: cannot start at {}", name, CliApp::format_duration(start)),
                Err(e) => eprintln!("{}: {}", name, e),
            }
        }

        if !source.play() {
            eprintln!("{}: no free voice", name);
            continue;
        }
        info!(
            "Playing {} as {} source",
            name,
            if kind == SourceKind::Stream { "a streaming" } else { "a static" }
        );
        sources.push((source, name));
    }
    sources
}

fn print_status(sources: &[(Source, String)]) {
    let line: Vec<String> = sources
        .iter()
        .filter(|(source, _)| !source.is_stopped())
        .map(|(source, name)| {
            let marker = if source.is_paused() { "||" } else { ">" };
            format!(
                "{} {} {}",
                marker,
                name,
                CliApp::format_position(source.tell(), source.duration())
            )
        })
        .collect();
    print!("\r{}\x1b[K", line.join("  "));
    let _ = io::stdout().flush();
}
