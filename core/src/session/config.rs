//! Advertising and scanning parameters

use crate::peer::ad_structure::{AdWriter, AD_FLAGS, AD_NAME_COMPLETE, AD_TX_POWER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxPowerLevel {
    Low,
    Medium,
    High,
}

impl TxPowerLevel {
    /// Nominal output in dBm, as advertised in the tx power field
    pub fn dbm(&self) -> i8 {
        match self {
            TxPowerLevel::Low => -15,
            TxPowerLevel::Medium => -7,
            TxPowerLevel::High => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    LowPower,
    Balanced,
    LowLatency,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::LowPower => write!(f, "LowPower"),
            ScanMode::Balanced => write!(f, "Balanced"),
            ScanMode::LowLatency => write!(f, "LowLatency"),
        }
    }
}

/// Advertising settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseConfig {
    pub tx_power_level: TxPowerLevel,
    pub mode: AdvertiseMode,
    /// Zero means no automatic stop
    pub timeout: Duration,
    pub connectable: bool,
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            tx_power_level: TxPowerLevel::High,
            mode: AdvertiseMode::LowLatency,
            timeout: Duration::from_secs(10),
            connectable: false,
        }
    }
}

/// Outbound advertisement contents. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisePayload {
    service_id: Uuid,
    service_data: Vec<u8>,
    include_device_name: bool,
    include_tx_power: bool,
}

impl AdvertisePayload {
    pub fn builder(service_id: Uuid) -> AdvertisePayloadBuilder {
        AdvertisePayloadBuilder {
            service_id,
            service_data: Vec::new(),
            include_device_name: false,
            include_tx_power: false,
        }
    }

    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    pub fn service_data(&self) -> &[u8] {
        &self.service_data
    }

    pub fn include_device_name(&self) -> bool {
        self.include_device_name
    }

    pub fn include_tx_power(&self) -> bool {
        self.include_tx_power
    }

    /// Encode as AD structures.
    ///
    /// Flags are only present for connectable advertising; the device name
    /// only when requested and known to the caller.
    pub fn encode(&self, config: &AdvertiseConfig, device_name: Option<&str>) -> Vec<u8> {
        let mut writer = AdWriter::new();
        if config.connectable {
            writer.push(AD_FLAGS, &[0x06]);
        }
        writer.push_service_uuid(&self.service_id);
        if !self.service_data.is_empty() {
            writer.push_service_data(&self.service_id, &self.service_data);
        }
        if self.include_tx_power {
            writer.push(AD_TX_POWER, &[config.tx_power_level.dbm() as u8]);
        }
        if self.include_device_name {
            if let Some(name) = device_name {
                writer.push(AD_NAME_COMPLETE, name.as_bytes());
            }
        }
        writer.into_bytes()
    }

    /// Encoded size for non-connectable advertising
    pub fn encoded_len(&self, device_name: Option<&str>) -> usize {
        let config = AdvertiseConfig {
            connectable: false,
            ..AdvertiseConfig::default()
        };
        self.encode(&config, device_name).len()
    }
}

pub struct AdvertisePayloadBuilder {
    service_id: Uuid,
    service_data: Vec<u8>,
    include_device_name: bool,
    include_tx_power: bool,
}

impl AdvertisePayloadBuilder {
    pub fn service_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.service_data = data.into();
        self
    }

    pub fn include_device_name(mut self, include: bool) -> Self {
        self.include_device_name = include;
        self
    }

    pub fn include_tx_power(mut self, include: bool) -> Self {
        self.include_tx_power = include;
        self
    }

    pub fn build(self) -> AdvertisePayload {
        AdvertisePayload {
            service_id: self.service_id,
            service_data: self.service_data,
            include_device_name: self.include_device_name,
            include_tx_power: self.include_tx_power,
        }
    }
}

/// Radio-level scan filter: peers not advertising `service_id` are dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanFilterSpec {
    pub service_id: Uuid,
}

impl ScanFilterSpec {
    pub fn new(service_id: Uuid) -> Self {
        Self { service_id }
    }
}

impl fmt::Display for ScanFilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service_uuid={}", self.service_id)
    }
}

/// Scanning settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub mode: ScanMode,
    /// Zero disables the auto-stop timer; the scan then runs until stopped
    pub auto_stop_after: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::LowLatency,
            auto_stop_after: Duration::from_secs(25),
        }
    }
}
