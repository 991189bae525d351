// blecast: advertise a service over BLE and discover peers advertising it
//
// Cross-platform command-line host for the blecast core. Ctrl-C acts as the
// host leaving the foreground: every outstanding session is stopped.

mod config;
mod radio;

use anyhow::{Context, Result};
use blecast_core::peer::ad_structure::{AdWriter, AD_FLAGS, AD_NAME_COMPLETE};
use blecast_core::session::EventReceiver;
use blecast_core::{
    BleSettings, CommandError, LifecycleCoordinator, PeerRecord, RadioControl, RawScanRecord,
    RawScanResult, SessionEvent, SimulatedRadio, UiNotifier,
};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blecast")]
#[command(about = "blecast: BLE service advertising and peer discovery", long_about = None)]
#[command(version)]
struct Cli {
    /// Use the in-process simulated radio instead of the system adapter
    #[arg(long, global = true)]
    simulate: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print discovered peers as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report Bluetooth LE capabilities
    Probe,
    /// Advertise the configured service
    Advertise {
        /// Stop after this many seconds instead of the configured timeout
        #[arg(long = "for")]
        duration: Option<u64>,
    },
    /// Scan for peers advertising the configured service
    Scan {
        /// Stop after this many seconds instead of the configured period
        #[arg(long = "for")]
        duration: Option<u64>,
    },
    /// Advertise and scan against simulated peers
    Demo {
        /// Scan period for the demo, in milliseconds
        #[arg(long, default_value = "3000")]
        scan_ms: u64,
        /// Number of simulated peers
        #[arg(long, default_value = "3")]
        peers: usize,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Path,
    Get { key: String },
    Set { key: String, value: String },
    Reset,
}

/// Which sessions a run waits on before returning
#[derive(Debug, Clone, Copy)]
struct Awaiting {
    advertising: bool,
    scanning: bool,
}

impl Awaiting {
    fn is_done(&self) -> bool {
        !self.advertising && !self.scanning
    }

    fn observe(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::AdvertisingFailed(_) | SessionEvent::AdvertisingStopped { .. } => {
                self.advertising = false
            }
            SessionEvent::ScanningFailed(_) | SessionEvent::ScanningStopped { .. } => {
                self.scanning = false
            }
            _ => {}
        }
    }
}

struct ConsoleNotifier;

impl UiNotifier for ConsoleNotifier {
    fn ble_unsupported(&self) {
        println!(
            "{}",
            "Bluetooth LE is not supported on this device".bright_red().bold()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    let settings_path = match &cli.settings {
        Some(path) => path.clone(),
        None => config::settings_file()?,
    };

    match cli.command {
        Commands::Probe => cmd_probe(cli.simulate).await,
        Commands::Advertise { duration } => {
            let settings = config::load(&settings_path)?;
            cmd_advertise(settings, cli.simulate, duration, cli.json).await
        }
        Commands::Scan { duration } => {
            let settings = config::load(&settings_path)?;
            cmd_scan(settings, cli.simulate, duration, cli.json).await
        }
        Commands::Demo { scan_ms, peers } => {
            let settings = config::load(&settings_path)?;
            cmd_demo(settings, scan_ms, peers, cli.json).await
        }
        Commands::Config { action } => cmd_config(action, &settings_path),
    }
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

async fn open_radio(simulate: bool) -> Arc<dyn RadioControl> {
    if simulate {
        Arc::new(SimulatedRadio::new(blecast_core::Capabilities::full()))
    } else {
        Arc::new(radio::BtleplugRadio::open().await)
    }
}

async fn cmd_probe(simulate: bool) -> Result<()> {
    let radio = open_radio(simulate).await;
    let caps = blecast_core::CapabilityProbe::new(radio).probe();

    println!("{}", "Bluetooth LE Capabilities".bold());
    println!("  BLE:        {}", mark(caps.ble_supported));
    println!("  Peripheral: {}", mark(caps.peripheral_supported));
    Ok(())
}

fn mark(supported: bool) -> ColoredString {
    if supported {
        "✓ supported".green()
    } else {
        "✗ unsupported".red()
    }
}

async fn cmd_advertise(
    settings: BleSettings,
    simulate: bool,
    duration: Option<u64>,
    json: bool,
) -> Result<()> {
    let radio = open_radio(simulate).await;
    let (coordinator, mut rx) =
        LifecycleCoordinator::new(radio, settings, Arc::new(ConsoleNotifier), Handle::current());

    if !coordinator.on_foreground_enter().ble_supported {
        return Ok(());
    }

    println!(
        "{} {}",
        "Advertising".bold(),
        coordinator.settings().service_uuid.to_string().bright_cyan()
    );
    if let Err(e) = coordinator.request_start_advertising() {
        report_command_error(&e);
        coordinator.on_foreground_exit();
        return Ok(());
    }

    let awaiting = Awaiting {
        advertising: true,
        scanning: false,
    };
    run_events(&coordinator, &mut rx, awaiting, duration.map(Duration::from_secs), json).await;
    Ok(())
}

async fn cmd_scan(
    settings: BleSettings,
    simulate: bool,
    duration: Option<u64>,
    json: bool,
) -> Result<()> {
    let radio = open_radio(simulate).await;
    let (coordinator, mut rx) =
        LifecycleCoordinator::new(radio, settings, Arc::new(ConsoleNotifier), Handle::current());

    if !coordinator.on_foreground_enter().ble_supported {
        return Ok(());
    }

    if !json {
        println!(
            "{} {} (auto-stop after {}ms)",
            "Scanning for".bold(),
            coordinator.settings().service_uuid.to_string().bright_cyan(),
            coordinator.settings().scan_period_ms
        );
    }
    if let Err(e) = coordinator.request_start_scanning() {
        report_command_error(&e);
        coordinator.on_foreground_exit();
        return Ok(());
    }

    let awaiting = Awaiting {
        advertising: false,
        scanning: true,
    };
    run_events(&coordinator, &mut rx, awaiting, duration.map(Duration::from_secs), json).await;
    Ok(())
}

async fn cmd_demo(mut settings: BleSettings, scan_ms: u64, peers: usize, json: bool) -> Result<()> {
    settings.scan_period_ms = scan_ms;
    settings.advertise_timeout_ms = scan_ms;
    settings.validate()?;

    let radio = Arc::new(SimulatedRadio::new(blecast_core::Capabilities::full()));
    let service = settings.service_uuid;
    let (coordinator, mut rx) = LifecycleCoordinator::new(
        radio.clone(),
        settings,
        Arc::new(ConsoleNotifier),
        Handle::current(),
    );

    coordinator.on_foreground_enter();
    let mut awaiting = Awaiting {
        advertising: true,
        scanning: true,
    };
    if let Err(e) = coordinator.request_start_advertising() {
        report_command_error(&e);
        awaiting.advertising = false;
    }
    if let Err(e) = coordinator.request_start_scanning() {
        report_command_error(&e);
        awaiting.scanning = false;
    }

    // simulated neighbours, plus one unrelated device the filter must drop
    let injector = {
        let radio = radio.clone();
        let spacing = injection_spacing(scan_ms, peers);
        tokio::spawn(async move {
            for i in 0..peers {
                tokio::time::sleep(spacing).await;
                let mut writer = AdWriter::new();
                writer.push(AD_FLAGS, &[0x06]);
                writer.push_service_uuid(&service);
                if i % 2 == 0 {
                    writer.push(AD_NAME_COMPLETE, format!("peer-{}", i).as_bytes());
                }
                writer.push_service_data(&service, format!("HI{}", i).as_bytes());
                let raw = RawScanResult::new(format!("02:00:00:00:00:{:02X}", i))
                    .with_record(RawScanRecord::from_bytes(writer.into_bytes()))
                    .with_rssi(-45 - (i as i16) * 7);
                radio.inject_scan_result(raw);
            }
            radio.inject_scan_result(
                RawScanResult::new("02:FF:FF:FF:FF:FF").with_device_name("stranger"),
            );
        })
    };

    run_events(&coordinator, &mut rx, awaiting, None, json).await;
    injector.abort();

    let calls = radio.calls();
    if !json {
        println!();
        println!("{}", "Radio calls".bold());
        println!(
            "  advertise start/stop: {}/{}",
            calls.advertise_start, calls.advertise_stop
        );
        println!("  scan start/stop:      {}/{}", calls.scan_start, calls.scan_stop);
    }
    Ok(())
}

/// Gap between simulated peers so all of them land inside the scan period
fn injection_spacing(scan_ms: u64, peers: usize) -> Duration {
    let slots = (peers as u64).saturating_add(2);
    Duration::from_millis(scan_ms / slots)
}

/// Pump session events until every awaited session has ended, the
/// deadline passes, or Ctrl-C is pressed. The last two leave the foreground.
async fn run_events(
    coordinator: &LifecycleCoordinator,
    rx: &mut EventReceiver,
    mut awaiting: Awaiting,
    deadline: Option<Duration>,
    json: bool,
) {
    let timeout = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => futures::future::pending::<()>().await,
        }
    };
    tokio::pin!(timeout);

    let mut discovered = 0usize;
    loop {
        if awaiting.is_done() {
            break;
        }
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                awaiting.observe(&event);
                if matches!(event, SessionEvent::PeerDiscovered(_)) {
                    discovered += 1;
                }
                print_event(&event, json);
            }
            _ = &mut timeout => {
                tracing::info!("Run duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                if !json {
                    println!("\n{}", "Interrupted".yellow());
                }
                break;
            }
        }
    }

    coordinator.on_foreground_exit();
    drain_stop_events(rx, json).await;

    if !json {
        println!("{} peer report(s) received", discovered.to_string().bold());
    }
}

/// Stop acknowledgements can arrive after the exit call returns
async fn drain_stop_events(rx: &mut EventReceiver, json: bool) {
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
        print_event(&event, json);
    }
}

fn print_event(event: &SessionEvent, json: bool) {
    if json {
        if let SessionEvent::PeerDiscovered(peer) = event {
            println!("{}", peer_json(peer));
        }
        return;
    }

    match event {
        SessionEvent::AdvertisingStarted { settings_in_effect } => println!(
            "  {} Advertising started ({:?}, {:?}, timeout {}s)",
            "✓".green(),
            settings_in_effect.mode,
            settings_in_effect.tx_power_level,
            settings_in_effect.timeout.as_secs()
        ),
        SessionEvent::AdvertisingFailed(e) => {
            println!("  {} Advertising failed: {}", "✗".red(), e)
        }
        SessionEvent::AdvertisingStopped { reason } => {
            println!("  {} Advertising stopped ({})", "•".bright_black(), reason)
        }
        SessionEvent::ScanningStarted => println!("  {} Scanning started", "✓".green()),
        SessionEvent::ScanningFailed(e) => println!("  {} Scanning failed: {}", "✗".red(), e),
        SessionEvent::ScanningStopped { reason } => {
            println!("  {} Scanning stopped ({})", "•".bright_black(), reason)
        }
        SessionEvent::PeerDiscovered(peer) => print_peer(peer),
    }
}

fn print_peer(peer: &PeerRecord) {
    let name = peer.device_name.as_deref().unwrap_or("<unnamed>");
    let rssi = peer
        .rssi
        .map(|r| format!("{} dBm", r))
        .unwrap_or_else(|| "?".to_string());
    println!(
        "  {} {} {} rssi {}",
        "→".bright_green(),
        peer.device_id.bright_cyan(),
        name.bold(),
        rssi
    );
    if let Some(tx) = peer.tx_power_level {
        println!("      tx power: {} dBm", tx);
    }
    if !peer.advertise_flags.is_empty() {
        println!("      flags:    {}", peer.advertise_flags);
    }
    for (uuid, data) in &peer.service_data {
        println!("      data:     {} = {}", uuid, hex::encode(data).bright_yellow());
    }
}

fn peer_json(peer: &PeerRecord) -> serde_json::Value {
    let service_data: serde_json::Map<String, serde_json::Value> = peer
        .service_data
        .iter()
        .map(|(uuid, data)| (uuid.to_string(), hex::encode(data).into()))
        .collect();
    serde_json::json!({
        "device_id": peer.device_id,
        "device_name": peer.device_name,
        "service_ids": peer.service_ids,
        "advertise_flags": peer.advertise_flags.bits(),
        "tx_power_level": peer.tx_power_level,
        "service_data": service_data,
        "rssi": peer.rssi,
    })
}

fn report_command_error(error: &CommandError) {
    println!("  {} {}", "✗".red(), error);
}

fn cmd_config(action: ConfigAction, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = config::load(path)?;
            println!("{}", "Settings".bold());
            for key in config::KEYS {
                let value = config::get(&settings, key).unwrap_or_default();
                println!("  {:<22} {}", key, value.bright_cyan());
            }
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Get { key } => {
            let settings = config::load(path)?;
            match config::get(&settings, &key) {
                Some(value) => println!("{}", value),
                None => anyhow::bail!("Unknown config key: {}", key),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut settings = config::load(path)?;
            config::set(&mut settings, &key, &value)?;
            config::save(&settings, path)?;
            println!("  {} {} = {}", "✓".green(), key, value.bright_cyan());
        }
        ConfigAction::Reset => {
            config::save(&BleSettings::default(), path)?;
            println!("  {} Settings reset to defaults", "✓".green());
        }
    }
    Ok(())
}
