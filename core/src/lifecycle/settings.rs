//! Session settings
//!
//! Serialized to/from JSON. Produces the payload, configs and filters the
//! coordinator hands to each session.

use crate::peer::LEGACY_ADVERTISING_MAX_LEN;
use crate::session::{
    AdvertiseConfig, AdvertiseMode, AdvertisePayload, ScanConfig, ScanFilterSpec, ScanMode,
    TxPowerLevel,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Service identifier shared by the advertiser and the scan filter
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000FE00_0000_1000_8000_00805F9B34FB);
pub const DEFAULT_SERVICE_DATA: &str = "HELLO";
pub const DEFAULT_ADVERTISE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SCAN_PERIOD_MS: u64 = 25_000;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleSettings {
    /// Advertised service and scan filter
    pub service_uuid: Uuid,

    /// ASCII service data attached to the advertised service
    pub service_data: String,

    pub include_device_name: bool,
    pub include_tx_power: bool,

    pub advertise_tx_power: TxPowerLevel,
    pub advertise_mode: AdvertiseMode,

    /// 0 disables the scheduled stop
    pub advertise_timeout_ms: u64,

    pub connectable: bool,

    pub scan_mode: ScanMode,

    /// Scan auto-stop period
    pub scan_period_ms: u64,
}

impl Default for BleSettings {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID,
            service_data: DEFAULT_SERVICE_DATA.to_string(),
            include_device_name: true,
            include_tx_power: true,
            advertise_tx_power: TxPowerLevel::High,
            advertise_mode: AdvertiseMode::LowLatency,
            advertise_timeout_ms: DEFAULT_ADVERTISE_TIMEOUT_MS,
            connectable: false,
            scan_mode: ScanMode::LowLatency,
            scan_period_ms: DEFAULT_SCAN_PERIOD_MS,
        }
    }
}

impl BleSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    ///
    /// The payload check excludes the device name, which only the radio knows.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.scan_period_ms == 0 {
            return Err(SettingsError::ConfigError(
                "scan_period_ms must be > 0".to_string(),
            ));
        }

        if !self.service_data.is_ascii() {
            return Err(SettingsError::ConfigError(
                "service_data must be ASCII".to_string(),
            ));
        }

        let encoded = self.advertise_payload().encoded_len(None);
        if encoded > LEGACY_ADVERTISING_MAX_LEN {
            return Err(SettingsError::ConfigError(format!(
                "advertise payload is {} bytes, limit is {}",
                encoded, LEGACY_ADVERTISING_MAX_LEN
            )));
        }

        Ok(())
    }

    /// Fresh payload for one advertising attempt
    pub fn advertise_payload(&self) -> AdvertisePayload {
        AdvertisePayload::builder(self.service_uuid)
            .service_data(self.service_data.as_bytes().to_vec())
            .include_device_name(self.include_device_name)
            .include_tx_power(self.include_tx_power)
            .build()
    }

    pub fn advertise_config(&self) -> AdvertiseConfig {
        AdvertiseConfig {
            tx_power_level: self.advertise_tx_power,
            mode: self.advertise_mode,
            timeout: Duration::from_millis(self.advertise_timeout_ms),
            connectable: self.connectable,
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            mode: self.scan_mode,
            auto_stop_after: Duration::from_millis(self.scan_period_ms),
        }
    }

    pub fn scan_filters(&self) -> Vec<ScanFilterSpec> {
        vec![ScanFilterSpec::new(self.service_uuid)]
    }

    /// Load settings from JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings: BleSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = BleSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.service_uuid.to_string(),
            "0000fe00-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_derived_configs() {
        let settings = BleSettings::default();

        let adv = settings.advertise_config();
        assert_eq!(adv.tx_power_level, TxPowerLevel::High);
        assert_eq!(adv.mode, AdvertiseMode::LowLatency);
        assert_eq!(adv.timeout, Duration::from_secs(10));
        assert!(!adv.connectable);

        let scan = settings.scan_config();
        assert_eq!(scan.mode, ScanMode::LowLatency);
        assert_eq!(scan.auto_stop_after, Duration::from_secs(25));

        assert_eq!(settings.scan_filters(), vec![ScanFilterSpec::new(DEFAULT_SERVICE_UUID)]);

        let payload = settings.advertise_payload();
        assert_eq!(payload.service_data(), b"HELLO");
        assert!(payload.include_device_name());
        assert!(payload.include_tx_power());
    }

    #[test]
    fn test_zero_scan_period_rejected() {
        let settings = BleSettings {
            scan_period_ms: 0,
            ..BleSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_oversized_service_data_rejected() {
        let settings = BleSettings {
            service_data: "x".repeat(40),
            ..BleSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ConfigError(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let settings = BleSettings {
            scan_period_ms: 5_000,
            scan_mode: ScanMode::Balanced,
            ..BleSettings::default()
        };
        settings.save(&path).expect("save");

        let loaded = BleSettings::load(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: BleSettings =
            serde_json::from_str(r#"{"scan_period_ms": 1000}"#).expect("parse");
        assert_eq!(settings.scan_period_ms, 1000);
        assert_eq!(settings.service_data, DEFAULT_SERVICE_DATA);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"scan_period_ms": 0}"#).expect("write");

        assert!(BleSettings::load(&path).is_err());
    }
}
