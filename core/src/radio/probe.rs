//! Capability probe

use super::{Capabilities, RadioControl};
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only view over the radio's capabilities.
///
/// Absence of a capability is a normal answer, never an error.
pub struct CapabilityProbe {
    radio: Arc<dyn RadioControl>,
}

impl CapabilityProbe {
    pub fn new(radio: Arc<dyn RadioControl>) -> Self {
        Self { radio }
    }

    pub fn probe(&self) -> Capabilities {
        let mut caps = self.radio.capabilities();

        // Peripheral mode is meaningless without BLE itself
        if !caps.ble_supported && caps.peripheral_supported {
            debug!("Radio reported peripheral support without BLE; ignoring");
            caps.peripheral_supported = false;
        }

        info!(
            "Capability probe: ble={} peripheral={}",
            caps.ble_supported, caps.peripheral_supported
        );
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::SimulatedRadio;

    #[test]
    fn test_probe_reports_radio_capabilities() {
        let radio = Arc::new(SimulatedRadio::new(Capabilities::central_only()));
        let probe = CapabilityProbe::new(radio.clone());

        let caps = probe.probe();
        assert!(caps.ble_supported);
        assert!(!caps.peripheral_supported);
        assert_eq!(radio.calls().total_radio_calls(), 0);
    }

    #[test]
    fn test_probe_normalizes_peripheral_without_ble() {
        let radio = Arc::new(SimulatedRadio::new(Capabilities {
            ble_supported: false,
            peripheral_supported: true,
        }));

        let caps = CapabilityProbe::new(radio).probe();
        assert_eq!(caps, Capabilities::unsupported());
    }
}
