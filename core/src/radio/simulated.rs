//! In-process radio used by tests and the CLI's `--simulate` mode.
//!
//! Callbacks are delivered on the caller's thread after the simulator has
//! released its own lock, so sessions see them re-entrantly from inside
//! their radio calls, the harshest ordering a real stack can produce.

use super::{
    AdvertiseFailure, AdvertiseObserver, Capabilities, RadioControl, ScanFailure, ScanObserver,
};
use crate::peer::{RawScanResult, ResultProcessor};
use crate::session::{AdvertiseConfig, AdvertisePayload, ScanConfig, ScanFilterSpec};
use crate::peer::ad_structure::LEGACY_ADVERTISING_MAX_LEN;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Per-operation call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioCalls {
    pub advertise_start: usize,
    pub advertise_stop: usize,
    pub scan_start: usize,
    pub scan_stop: usize,
}

impl RadioCalls {
    pub fn total_radio_calls(&self) -> usize {
        self.advertise_start + self.advertise_stop + self.scan_start + self.scan_stop
    }
}

#[derive(Default)]
struct SimState {
    calls: RadioCalls,
    advertiser: Option<Arc<dyn AdvertiseObserver>>,
    scanner: Option<Arc<dyn ScanObserver>>,
    filters: Vec<ScanFilterSpec>,
    next_advertise_failure: Option<AdvertiseFailure>,
    next_scan_failure: Option<ScanFailure>,
    hold_stop_acks: bool,
    held_advertise_acks: Vec<Arc<dyn AdvertiseObserver>>,
    held_scan_acks: Vec<Arc<dyn ScanObserver>>,
}

pub struct SimulatedRadio {
    capabilities: Capabilities,
    device_name: Option<String>,
    state: Mutex<SimState>,
}

impl SimulatedRadio {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            device_name: Some("blecast-sim".to_string()),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Name the simulated adapter would put in advertisements
    pub fn with_device_name(mut self, name: Option<String>) -> Self {
        self.device_name = name;
        self
    }

    pub fn calls(&self) -> RadioCalls {
        self.state.lock().calls
    }

    pub fn is_advertising(&self) -> bool {
        self.state.lock().advertiser.is_some()
    }

    pub fn is_scanning(&self) -> bool {
        self.state.lock().scanner.is_some()
    }

    /// Filters passed to the most recent scan start
    pub fn active_filters(&self) -> Vec<ScanFilterSpec> {
        self.state.lock().filters.clone()
    }

    /// Make the next advertise start fail with `failure`
    pub fn fail_next_advertise(&self, failure: AdvertiseFailure) {
        self.state.lock().next_advertise_failure = Some(failure);
    }

    /// Make the next scan start fail with `failure`
    pub fn fail_next_scan(&self, failure: ScanFailure) {
        self.state.lock().next_scan_failure = Some(failure);
    }

    /// Withhold stop acknowledgements until [`release_stop_acks`](Self::release_stop_acks)
    pub fn hold_stop_acks(&self, hold: bool) {
        self.state.lock().hold_stop_acks = hold;
    }

    pub fn release_stop_acks(&self) {
        let (adv, scan) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.held_advertise_acks),
                std::mem::take(&mut state.held_scan_acks),
            )
        };
        for observer in adv {
            observer.on_stop_ack();
        }
        for observer in scan {
            observer.on_stop_ack();
        }
    }

    /// Expire the current advertisement as a stack-enforced timeout would
    pub fn expire_advertising(&self) -> bool {
        let observer = self.state.lock().advertiser.take();
        match observer {
            Some(observer) => {
                debug!("Simulated radio: advertising timed out");
                observer.on_timeout();
                true
            }
            None => false,
        }
    }

    /// Deliver one raw result to the active scan, applying its filters.
    ///
    /// Returns false when no scan is active or the result was filtered out.
    pub fn inject_scan_result(&self, result: RawScanResult) -> bool {
        let Some((observer, filters)) = self.active_scan() else {
            return false;
        };
        if !passes_filters(&result, &filters) {
            debug!("Simulated radio: result from {} filtered", result.device.address);
            return false;
        }
        observer.on_scan_result(result);
        true
    }

    /// Deliver a batch to the active scan; returns how many passed the filters
    pub fn inject_batch(&self, results: Vec<RawScanResult>) -> usize {
        let Some((observer, filters)) = self.active_scan() else {
            return 0;
        };
        let passing: Vec<RawScanResult> = results
            .into_iter()
            .filter(|r| passes_filters(r, &filters))
            .collect();
        let delivered = passing.len();
        observer.on_batch_scan_results(passing);
        delivered
    }

    fn active_scan(&self) -> Option<(Arc<dyn ScanObserver>, Vec<ScanFilterSpec>)> {
        let state = self.state.lock();
        state
            .scanner
            .as_ref()
            .map(|observer| (observer.clone(), state.filters.clone()))
    }
}

fn passes_filters(result: &RawScanResult, filters: &[ScanFilterSpec]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let record = ResultProcessor::process(result);
    filters
        .iter()
        .any(|f| record.service_ids.contains(&f.service_id))
}

impl RadioControl for SimulatedRadio {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn advertise_start(
        &self,
        payload: &AdvertisePayload,
        config: &AdvertiseConfig,
        observer: Arc<dyn AdvertiseObserver>,
    ) {
        let failure = {
            let mut state = self.state.lock();
            state.calls.advertise_start += 1;

            if let Some(failure) = state.next_advertise_failure.take() {
                Some(failure)
            } else if !self.capabilities.peripheral_supported {
                Some(AdvertiseFailure::FeatureUnsupported)
            } else if state.advertiser.is_some() {
                Some(AdvertiseFailure::AlreadyStarted)
            } else if payload.encoded_len(self.device_name.as_deref())
                > LEGACY_ADVERTISING_MAX_LEN
            {
                Some(AdvertiseFailure::DataTooLarge)
            } else {
                state.advertiser = Some(observer.clone());
                None
            }
        };

        match failure {
            Some(failure) => observer.on_start_failure(failure),
            None => observer.on_start_success(config.clone()),
        }
    }

    fn advertise_stop(&self, observer: Arc<dyn AdvertiseObserver>) {
        {
            let mut state = self.state.lock();
            state.calls.advertise_stop += 1;
            state.advertiser = None;
            if state.hold_stop_acks {
                state.held_advertise_acks.push(observer);
                return;
            }
        }
        observer.on_stop_ack();
    }

    fn scan_start(
        &self,
        filters: &[ScanFilterSpec],
        _config: &ScanConfig,
        observer: Arc<dyn ScanObserver>,
    ) {
        let failure = {
            let mut state = self.state.lock();
            state.calls.scan_start += 1;

            if let Some(failure) = state.next_scan_failure.take() {
                Some(failure)
            } else if !self.capabilities.ble_supported {
                Some(ScanFailure::FeatureUnsupported)
            } else if state.scanner.is_some() {
                Some(ScanFailure::AlreadyStarted)
            } else {
                state.scanner = Some(observer.clone());
                state.filters = filters.to_vec();
                None
            }
        };

        if let Some(failure) = failure {
            observer.on_scan_failed(failure);
        }
    }

    fn scan_stop(&self, observer: Arc<dyn ScanObserver>) {
        {
            let mut state = self.state.lock();
            state.calls.scan_stop += 1;
            state.scanner = None;
            if state.hold_stop_acks {
                state.held_scan_acks.push(observer);
                return;
            }
        }
        observer.on_stop_ack();
    }
}
