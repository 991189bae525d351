// Configuration management for the blecast CLI
//
// Settings live next to the platform config directory:
// - macOS: ~/Library/Application Support/blecast/settings.json
// - Linux: ~/.config/blecast/settings.json
// - Windows: %APPDATA%\blecast\settings.json

use anyhow::{Context, Result};
use blecast_core::{AdvertiseMode, BleSettings, ScanMode, TxPowerLevel};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const KEYS: &[&str] = &[
    "service_uuid",
    "service_data",
    "include_device_name",
    "include_tx_power",
    "advertise_tx_power",
    "advertise_mode",
    "advertise_timeout_ms",
    "connectable",
    "scan_mode",
    "scan_period_ms",
];

/// Get the config directory path (cross-platform)
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Failed to determine config directory")?
        .join("blecast");

    std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

    Ok(config_dir)
}

pub fn settings_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.json"))
}

/// Load settings from `path`, or the defaults if it does not exist yet
pub fn load(path: &Path) -> Result<BleSettings> {
    if path.exists() {
        BleSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    } else {
        Ok(BleSettings::default())
    }
}

pub fn save(settings: &BleSettings, path: &Path) -> Result<()> {
    settings
        .save(path)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}

/// Set one value by key. The result is validated before it is returned.
pub fn set(settings: &mut BleSettings, key: &str, value: &str) -> Result<()> {
    match key {
        "service_uuid" => {
            settings.service_uuid = Uuid::parse_str(value).context("Invalid UUID")?;
        }
        "service_data" => settings.service_data = value.to_string(),
        "include_device_name" => {
            settings.include_device_name = value.parse().context("Invalid boolean value")?;
        }
        "include_tx_power" => {
            settings.include_tx_power = value.parse().context("Invalid boolean value")?;
        }
        "advertise_tx_power" => settings.advertise_tx_power = parse_tx_power(value)?,
        "advertise_mode" => settings.advertise_mode = parse_advertise_mode(value)?,
        "advertise_timeout_ms" => {
            settings.advertise_timeout_ms = value.parse().context("Invalid number")?;
        }
        "connectable" => {
            settings.connectable = value.parse().context("Invalid boolean value")?;
        }
        "scan_mode" => settings.scan_mode = parse_scan_mode(value)?,
        "scan_period_ms" => {
            settings.scan_period_ms = value.parse().context("Invalid number")?;
        }
        _ => anyhow::bail!("Unknown config key: {} (known: {})", key, KEYS.join(", ")),
    }
    settings.validate()?;
    Ok(())
}

/// Get a config value
pub fn get(settings: &BleSettings, key: &str) -> Option<String> {
    match key {
        "service_uuid" => Some(settings.service_uuid.to_string()),
        "service_data" => Some(settings.service_data.clone()),
        "include_device_name" => Some(settings.include_device_name.to_string()),
        "include_tx_power" => Some(settings.include_tx_power.to_string()),
        "advertise_tx_power" => Some(format!("{:?}", settings.advertise_tx_power)),
        "advertise_mode" => Some(format!("{:?}", settings.advertise_mode)),
        "advertise_timeout_ms" => Some(settings.advertise_timeout_ms.to_string()),
        "connectable" => Some(settings.connectable.to_string()),
        "scan_mode" => Some(settings.scan_mode.to_string()),
        "scan_period_ms" => Some(settings.scan_period_ms.to_string()),
        _ => None,
    }
}

fn parse_tx_power(value: &str) -> Result<TxPowerLevel> {
    match value.to_ascii_lowercase().as_str() {
        "low" => Ok(TxPowerLevel::Low),
        "medium" => Ok(TxPowerLevel::Medium),
        "high" => Ok(TxPowerLevel::High),
        _ => anyhow::bail!("Invalid tx power level: {} (low, medium, high)", value),
    }
}

fn parse_advertise_mode(value: &str) -> Result<AdvertiseMode> {
    match value.to_ascii_lowercase().as_str() {
        "low_power" | "lowpower" => Ok(AdvertiseMode::LowPower),
        "balanced" => Ok(AdvertiseMode::Balanced),
        "low_latency" | "lowlatency" => Ok(AdvertiseMode::LowLatency),
        _ => anyhow::bail!(
            "Invalid advertise mode: {} (low_power, balanced, low_latency)",
            value
        ),
    }
}

fn parse_scan_mode(value: &str) -> Result<ScanMode> {
    match value.to_ascii_lowercase().as_str() {
        "low_power" | "lowpower" => Ok(ScanMode::LowPower),
        "balanced" => Ok(ScanMode::Balanced),
        "low_latency" | "lowlatency" => Ok(ScanMode::LowLatency),
        _ => anyhow::bail!(
            "Invalid scan mode: {} (low_power, balanced, low_latency)",
            value
        ),
    }
}
