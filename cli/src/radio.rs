// btleplug-backed radio for desktop hosts
//
// btleplug only exposes the central role, so this radio reports peripheral
// mode as unsupported and scanning is the only live operation.

use blecast_core::peer::{RawDevice, FLAGS_ABSENT, TX_POWER_ABSENT};
use blecast_core::{
    AdvertiseConfig, AdvertiseFailure, AdvertiseObserver, AdvertisePayload, Capabilities,
    RadioControl, RawScanRecord, RawScanResult, ScanConfig, ScanFailure, ScanFilterSpec,
    ScanObserver,
};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct BtleplugRadio {
    adapter: Option<Adapter>,
    runtime: Handle,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugRadio {
    /// Open the first system adapter. A missing adapter or Bluetooth stack
    /// is reported through [`capabilities`](RadioControl::capabilities).
    pub async fn open() -> Self {
        let adapter = match Self::first_adapter().await {
            Ok(Some(adapter)) => {
                let info = adapter
                    .adapter_info()
                    .await
                    .unwrap_or_else(|_| "unknown adapter".to_string());
                info!("Using Bluetooth adapter: {}", info);
                Some(adapter)
            }
            Ok(None) => {
                warn!("No Bluetooth adapters found");
                None
            }
            Err(e) => {
                warn!("Bluetooth unavailable: {}", e);
                None
            }
        };

        Self {
            adapter,
            runtime: Handle::current(),
            scan_task: Mutex::new(None),
        }
    }

    async fn first_adapter() -> btleplug::Result<Option<Adapter>> {
        let manager = Manager::new().await?;
        Ok(manager.adapters().await?.into_iter().next())
    }
}

impl RadioControl for BtleplugRadio {
    fn capabilities(&self) -> Capabilities {
        if self.adapter.is_some() {
            Capabilities::central_only()
        } else {
            Capabilities::unsupported()
        }
    }

    fn advertise_start(
        &self,
        _payload: &AdvertisePayload,
        _config: &AdvertiseConfig,
        observer: Arc<dyn AdvertiseObserver>,
    ) {
        observer.on_start_failure(AdvertiseFailure::FeatureUnsupported);
    }

    fn advertise_stop(&self, observer: Arc<dyn AdvertiseObserver>) {
        observer.on_stop_ack();
    }

    fn scan_start(
        &self,
        filters: &[ScanFilterSpec],
        config: &ScanConfig,
        observer: Arc<dyn ScanObserver>,
    ) {
        let Some(adapter) = self.adapter.clone() else {
            observer.on_scan_failed(ScanFailure::FeatureUnsupported);
            return;
        };

        let services: Vec<Uuid> = filters.iter().map(|f| f.service_id).collect();
        let rejected = {
            let mut task = self.scan_task.lock();
            if task.as_ref().is_some_and(|t| !t.is_finished()) {
                true
            } else {
                debug!("Starting btleplug scan ({}, {:?})", config.mode, services);
                *task = Some(
                    self.runtime
                        .spawn(run_scan(adapter, services, observer.clone())),
                );
                false
            }
        };

        if rejected {
            observer.on_scan_failed(ScanFailure::AlreadyStarted);
        }
    }

    fn scan_stop(&self, observer: Arc<dyn ScanObserver>) {
        if let Some(task) = self.scan_task.lock().take() {
            task.abort();
        }

        match self.adapter.clone() {
            Some(adapter) => {
                self.runtime.spawn(async move {
                    if let Err(e) = adapter.stop_scan().await {
                        warn!("stop_scan failed: {}", e);
                    }
                    observer.on_stop_ack();
                });
            }
            None => observer.on_stop_ack(),
        }
    }
}

async fn run_scan(adapter: Adapter, services: Vec<Uuid>, observer: Arc<dyn ScanObserver>) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Failed to subscribe to adapter events: {}", e);
            observer.on_scan_failed(ScanFailure::InternalError);
            return;
        }
    };

    let filter = ScanFilter {
        services: services.clone(),
    };
    if let Err(e) = adapter.start_scan(filter).await {
        warn!("start_scan failed: {}", e);
        observer.on_scan_failed(ScanFailure::InternalError);
        return;
    }

    while let Some(event) = events.next().await {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };
        let Some(raw) = raw_result(&adapter, &id).await else {
            continue;
        };
        // some backends ignore the service filter
        if matches_filter(&raw, &services) {
            observer.on_scan_result(raw);
        }
    }
    debug!("Adapter event stream ended");
}

async fn raw_result(adapter: &Adapter, id: &PeripheralId) -> Option<RawScanResult> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let props = peripheral.properties().await.ok()??;

    let record = RawScanRecord {
        advertise_flags: FLAGS_ABSENT,
        tx_power_level: props
            .tx_power_level
            .map(i32::from)
            .unwrap_or(TX_POWER_ABSENT),
        device_name: props.local_name.clone(),
        service_uuids: Some(props.services.clone()),
        service_data: Some(props.service_data.clone()),
        bytes: Vec::new(),
    };

    Some(RawScanResult {
        device: RawDevice {
            address: props.address.to_string(),
            name: props.local_name,
            uuids: None,
        },
        record: Some(record),
        rssi: props.rssi,
    })
}

fn matches_filter(raw: &RawScanResult, services: &[Uuid]) -> bool {
    if services.is_empty() {
        return true;
    }
    raw.record
        .as_ref()
        .and_then(|r| r.service_uuids.as_ref())
        .is_some_and(|uuids| uuids.iter().any(|u| services.contains(u)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(uuids: Option<Vec<Uuid>>) -> RawScanResult {
        RawScanResult::new("AA:BB:CC:DD:EE:FF").with_record(RawScanRecord {
            service_uuids: uuids,
            ..RawScanRecord::default()
        })
    }

    #[test]
    fn test_filter_matching() {
        let wanted = blecast_core::lifecycle::DEFAULT_SERVICE_UUID;
        let other = Uuid::from_u128(0x0000180F_0000_1000_8000_00805F9B34FB);

        assert!(matches_filter(&result_with(None), &[]));
        assert!(matches_filter(&result_with(Some(vec![other, wanted])), &[wanted]));
        assert!(!matches_filter(&result_with(Some(vec![other])), &[wanted]));
        assert!(!matches_filter(&result_with(None), &[wanted]));
    }
}
