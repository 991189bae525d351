//! Radio-control collaborator contract
//!
//! The session layer never touches the physical radio. Everything it needs is
//! expressed by [`RadioControl`]; completions come back through the observer
//! traits, asynchronously and exactly once per start/stop invocation (scan
//! results zero or more times while a scan is active).

pub mod probe;
pub mod simulated;

use crate::peer::RawScanResult;
use crate::session::{AdvertiseConfig, AdvertisePayload, ScanConfig, ScanFilterSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use probe::CapabilityProbe;
pub use simulated::SimulatedRadio;

/// What the local radio can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// BLE is present at all (central role)
    pub ble_supported: bool,
    /// Peripheral-mode advertising is available
    pub peripheral_supported: bool,
}

impl Capabilities {
    pub fn unsupported() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            ble_supported: true,
            peripheral_supported: true,
        }
    }

    pub fn central_only() -> Self {
        Self {
            ble_supported: true,
            peripheral_supported: false,
        }
    }
}

/// Advertise start failure as reported by the radio stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseFailure {
    DataTooLarge,
    TooManyAdvertisers,
    AlreadyStarted,
    InternalError,
    FeatureUnsupported,
    Unknown(i32),
}

impl AdvertiseFailure {
    /// Map a platform error code onto a failure
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AdvertiseFailure::DataTooLarge,
            2 => AdvertiseFailure::TooManyAdvertisers,
            3 => AdvertiseFailure::AlreadyStarted,
            4 => AdvertiseFailure::InternalError,
            5 => AdvertiseFailure::FeatureUnsupported,
            other => AdvertiseFailure::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AdvertiseFailure::DataTooLarge => 1,
            AdvertiseFailure::TooManyAdvertisers => 2,
            AdvertiseFailure::AlreadyStarted => 3,
            AdvertiseFailure::InternalError => 4,
            AdvertiseFailure::FeatureUnsupported => 5,
            AdvertiseFailure::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for AdvertiseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvertiseFailure::DataTooLarge => write!(f, "ADVERTISE_FAILED_DATA_TOO_LARGE"),
            AdvertiseFailure::TooManyAdvertisers => {
                write!(f, "ADVERTISE_FAILED_TOO_MANY_ADVERTISERS")
            }
            AdvertiseFailure::AlreadyStarted => write!(f, "ADVERTISE_FAILED_ALREADY_STARTED"),
            AdvertiseFailure::InternalError => write!(f, "ADVERTISE_FAILED_INTERNAL_ERROR"),
            AdvertiseFailure::FeatureUnsupported => {
                write!(f, "ADVERTISE_FAILED_FEATURE_UNSUPPORTED")
            }
            AdvertiseFailure::Unknown(code) => write!(f, "Unknown error code {}", code),
        }
    }
}

/// Scan start failure as reported by the radio stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFailure {
    AlreadyStarted,
    ApplicationRegistrationFailed,
    InternalError,
    FeatureUnsupported,
    Unknown(i32),
}

impl ScanFailure {
    /// Map a platform error code onto a failure
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ScanFailure::AlreadyStarted,
            2 => ScanFailure::ApplicationRegistrationFailed,
            3 => ScanFailure::InternalError,
            4 => ScanFailure::FeatureUnsupported,
            other => ScanFailure::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ScanFailure::AlreadyStarted => 1,
            ScanFailure::ApplicationRegistrationFailed => 2,
            ScanFailure::InternalError => 3,
            ScanFailure::FeatureUnsupported => 4,
            ScanFailure::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanFailure::AlreadyStarted => write!(f, "SCAN_FAILED_ALREADY_STARTED"),
            ScanFailure::ApplicationRegistrationFailed => {
                write!(f, "SCAN_FAILED_APPLICATION_REGISTRATION_FAILED")
            }
            ScanFailure::InternalError => write!(f, "SCAN_FAILED_INTERNAL_ERROR"),
            ScanFailure::FeatureUnsupported => write!(f, "SCAN_FAILED_FEATURE_UNSUPPORTED"),
            ScanFailure::Unknown(code) => write!(f, "Unknown error code {}", code),
        }
    }
}

/// Callbacks for one advertising session
pub trait AdvertiseObserver: Send + Sync {
    fn on_start_success(&self, settings_in_effect: AdvertiseConfig);
    fn on_start_failure(&self, failure: AdvertiseFailure);
    fn on_stop_ack(&self);
    /// The radio stack expired the advertisement on its own
    fn on_timeout(&self);
}

/// Callbacks for one scanning session
pub trait ScanObserver: Send + Sync {
    fn on_scan_result(&self, result: RawScanResult);
    fn on_batch_scan_results(&self, results: Vec<RawScanResult>);
    fn on_scan_failed(&self, failure: ScanFailure);
    fn on_stop_ack(&self);
}

/// The only component allowed to drive the physical radio.
///
/// Calls must return promptly; outcomes are delivered through the observer,
/// possibly before the call itself has returned.
pub trait RadioControl: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn advertise_start(
        &self,
        payload: &AdvertisePayload,
        config: &AdvertiseConfig,
        observer: Arc<dyn AdvertiseObserver>,
    );

    fn advertise_stop(&self, observer: Arc<dyn AdvertiseObserver>);

    fn scan_start(
        &self,
        filters: &[ScanFilterSpec],
        config: &ScanConfig,
        observer: Arc<dyn ScanObserver>,
    );

    fn scan_stop(&self, observer: Arc<dyn ScanObserver>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertise_failure_codes() {
        for code in 1..=5 {
            assert_eq!(AdvertiseFailure::from_code(code).code(), code);
        }
        assert_eq!(AdvertiseFailure::from_code(42), AdvertiseFailure::Unknown(42));
    }

    #[test]
    fn test_scan_failure_codes() {
        assert_eq!(ScanFailure::from_code(2), ScanFailure::ApplicationRegistrationFailed);
        assert_eq!(ScanFailure::from_code(0), ScanFailure::Unknown(0));
    }

    #[test]
    fn test_failure_display_names() {
        assert_eq!(
            AdvertiseFailure::TooManyAdvertisers.to_string(),
            "ADVERTISE_FAILED_TOO_MANY_ADVERTISERS"
        );
        assert_eq!(
            ScanFailure::Unknown(9).to_string(),
            "Unknown error code 9"
        );
    }

    #[test]
    fn test_capability_presets() {
        assert!(!Capabilities::unsupported().ble_supported);
        assert!(Capabilities::full().peripheral_supported);
        let central = Capabilities::central_only();
        assert!(central.ble_supported && !central.peripheral_supported);
    }
}
