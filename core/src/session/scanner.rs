//! Scanning session with auto-stop
//!
//! Scanning has no start acknowledgement: `start` moves straight to
//! `Active` and arms the auto-stop timer. Only failure arrives later.

use super::config::{ScanConfig, ScanFilterSpec};
use super::events::{emit, EventSender, SessionEvent, StopReason};
use super::state::SessionState;
use super::timer::ScheduledStop;
use crate::peer::{RawScanResult, ResultProcessor};
use crate::radio::{RadioControl, ScanFailure, ScanObserver};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    #[error("BLE scanning is not supported")]
    Unsupported,
    #[error("Scanning is already active")]
    AlreadyActive,
    #[error("Scanner registration failed")]
    RegistrationFailed,
    #[error("Radio internal error")]
    RadioInternalError,
}

impl From<ScanFailure> for ScanError {
    fn from(failure: ScanFailure) -> Self {
        match failure {
            ScanFailure::AlreadyStarted => ScanError::AlreadyActive,
            ScanFailure::ApplicationRegistrationFailed => ScanError::RegistrationFailed,
            ScanFailure::FeatureUnsupported => ScanError::Unsupported,
            ScanFailure::InternalError => ScanError::RadioInternalError,
            ScanFailure::Unknown(_) => ScanError::RadioInternalError,
        }
    }
}

struct ScanInner {
    state: SessionState,
    generation: u64,
    attempt: Option<Arc<ScanAttempt>>,
    timer: Option<ScheduledStop>,
    stop_reason: StopReason,
    results_forwarded: u64,
}

struct ScanShared {
    radio: Arc<dyn RadioControl>,
    runtime: Handle,
    events: EventSender,
    inner: Mutex<ScanInner>,
}

struct ScanAttempt {
    session: Weak<ScanShared>,
    generation: u64,
}

/// Owner of the single scan operation. Cloning yields another handle to
/// the same session.
#[derive(Clone)]
pub struct ScanningSession {
    shared: Arc<ScanShared>,
}

impl ScanningSession {
    pub fn new(radio: Arc<dyn RadioControl>, events: EventSender, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(ScanShared {
                radio,
                runtime,
                events,
                inner: Mutex::new(ScanInner {
                    state: SessionState::Idle,
                    generation: 0,
                    attempt: None,
                    timer: None,
                    stop_reason: StopReason::Requested,
                    results_forwarded: 0,
                }),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    /// Peer records forwarded since the session was created
    pub fn results_forwarded(&self) -> u64 {
        self.shared.inner.lock().results_forwarded
    }

    /// Start scanning and arm the auto-stop for `config.auto_stop_after`.
    ///
    /// A zero `auto_stop_after` arms no timer: the scan runs until `stop()`.
    /// Settings-derived configs never carry zero (`BleSettings::validate`).
    pub fn start(&self, filters: Vec<ScanFilterSpec>, config: ScanConfig) -> Result<(), ScanError> {
        let attempt = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.is_idle() {
                debug!("Scan start rejected: session is {}", inner.state);
                return Err(ScanError::AlreadyActive);
            }
            inner.generation += 1;
            let generation = inner.generation;
            inner.state = SessionState::Active;
            inner.stop_reason = StopReason::Requested;

            let attempt = Arc::new(ScanAttempt {
                session: Arc::downgrade(&self.shared),
                generation,
            });
            inner.attempt = Some(attempt.clone());

            if !config.auto_stop_after.is_zero() {
                let session = Arc::downgrade(&self.shared);
                inner.timer = Some(ScheduledStop::schedule(
                    &self.shared.runtime,
                    config.auto_stop_after,
                    move || {
                        if let Some(session) = session.upgrade() {
                            session.stop(StopReason::AutoStop, Some(generation));
                        }
                    },
                ));
            }

            emit(&self.shared.events, SessionEvent::ScanningStarted);
            attempt
        };

        let filter_list: Vec<String> = filters.iter().map(ToString::to_string).collect();
        info!(
            "Starting scanning: mode={} auto_stop={:?} filters={:?}",
            config.mode, config.auto_stop_after, filter_list
        );
        self.shared.radio.scan_start(&filters, &config, attempt);
        Ok(())
    }

    /// Idempotent; cancels any pending auto-stop.
    pub fn stop(&self) -> Result<(), ScanError> {
        self.shared.stop(StopReason::Requested, None);
        Ok(())
    }
}

impl ScanShared {
    fn stop(self: &Arc<Self>, reason: StopReason, only_generation: Option<u64>) {
        let attempt = {
            let mut inner = self.inner.lock();
            if let Some(generation) = only_generation {
                if inner.generation != generation || inner.state != SessionState::Active {
                    debug!("Auto-stop absorbed (state {})", inner.state);
                    return;
                }
            }
            if !inner.state.is_busy() {
                debug!("Scan stop is a no-op in state {}", inner.state);
                return;
            }
            if let Some(timer) = inner.timer.take() {
                timer.cancel();
            }
            let Some(attempt) = inner.attempt.clone() else {
                inner.state = SessionState::Idle;
                return;
            };
            inner.state = SessionState::Stopping;
            inner.stop_reason = reason;
            attempt
        };

        info!("Stopping scanning ({})", reason);
        self.radio.scan_stop(attempt);
    }

    fn on_scan_failed(&self, generation: u64, failure: ScanFailure) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != SessionState::Active {
            debug!("Ignoring scan failure {} in state {}", failure, inner.state);
            return;
        }
        let error = ScanError::from(failure);
        warn!("onScanFailed: {} -> {}", failure, error);
        inner.state = SessionState::Idle;
        inner.attempt = None;
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        emit(&self.events, SessionEvent::ScanningFailed(error));
    }

    fn on_results(&self, generation: u64, results: Vec<RawScanResult>) {
        // held across the whole batch so concurrent deliveries cannot interleave
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != SessionState::Active {
            debug!(
                "Dropping {} late scan result(s) in state {}",
                results.len(),
                inner.state
            );
            return;
        }
        for raw in &results {
            let peer = ResultProcessor::process(raw);
            emit(&self.events, SessionEvent::PeerDiscovered(peer));
            inner.results_forwarded += 1;
        }
    }

    fn on_stop_ack(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != SessionState::Stopping {
            debug!("Ignoring scan stop ack in state {}", inner.state);
            return;
        }
        inner.state = SessionState::Idle;
        inner.attempt = None;
        let reason = inner.stop_reason;
        info!("Scanning stopped ({})", reason);
        emit(&self.events, SessionEvent::ScanningStopped { reason });
    }
}

impl ScanObserver for ScanAttempt {
    fn on_scan_result(&self, result: RawScanResult) {
        if let Some(session) = self.session.upgrade() {
            session.on_results(self.generation, vec![result]);
        }
    }

    fn on_batch_scan_results(&self, results: Vec<RawScanResult>) {
        if let Some(session) = self.session.upgrade() {
            session.on_results(self.generation, results);
        }
    }

    fn on_scan_failed(&self, failure: ScanFailure) {
        if let Some(session) = self.session.upgrade() {
            session.on_scan_failed(self.generation, failure);
        }
    }

    fn on_stop_ack(&self) {
        if let Some(session) = self.session.upgrade() {
            session.on_stop_ack(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::RawScanRecord;
    use crate::radio::{Capabilities, SimulatedRadio};
    use crate::session::events::{event_channel, EventReceiver};
    use std::time::Duration;
    use uuid::Uuid;

    fn service_id() -> Uuid {
        Uuid::parse_str("0000FE00-0000-1000-8000-00805F9B34FB").expect("valid uuid")
    }

    fn filters() -> Vec<ScanFilterSpec> {
        vec![ScanFilterSpec::new(service_id())]
    }

    fn manual() -> ScanConfig {
        ScanConfig {
            auto_stop_after: Duration::ZERO,
            ..ScanConfig::default()
        }
    }

    fn new_session() -> (ScanningSession, Arc<SimulatedRadio>, EventReceiver) {
        let radio = Arc::new(SimulatedRadio::new(Capabilities::central_only()));
        let (tx, rx) = event_channel();
        let session = ScanningSession::new(radio.clone(), tx, Handle::current());
        (session, radio, rx)
    }

    fn matching_result(address: &str) -> RawScanResult {
        RawScanResult::new(address).with_record(RawScanRecord {
            service_uuids: Some(vec![service_id()]),
            ..RawScanRecord::default()
        })
    }

    #[tokio::test]
    async fn test_start_goes_straight_to_active() {
        let (session, radio, mut rx) = new_session();

        session.start(filters(), manual()).expect("start");
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(radio.calls().scan_start, 1);
        assert_eq!(radio.active_filters(), filters());
        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::ScanningStarted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_runs_until_stopped() {
        let (session, radio, _rx) = new_session();

        session.start(filters(), manual()).expect("start");
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(radio.calls().scan_stop, 0);

        session.stop().expect("stop");
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(radio.calls().scan_stop, 1);
    }

    #[tokio::test]
    async fn test_second_start_is_already_active() {
        let (session, radio, _rx) = new_session();

        session.start(filters(), manual()).expect("start");
        assert_eq!(session.start(filters(), manual()), Err(ScanError::AlreadyActive));
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(radio.calls().scan_start, 1);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let (session, radio, _rx) = new_session();
        assert!(session.stop().is_ok());
        assert_eq!(radio.calls().total_radio_calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_mapping_returns_to_idle() {
        let cases = [
            (ScanFailure::AlreadyStarted, ScanError::AlreadyActive),
            (ScanFailure::ApplicationRegistrationFailed, ScanError::RegistrationFailed),
            (ScanFailure::FeatureUnsupported, ScanError::Unsupported),
            (ScanFailure::InternalError, ScanError::RadioInternalError),
        ];

        for (failure, expected) in cases {
            let (session, radio, mut rx) = new_session();
            radio.fail_next_scan(failure);

            session.start(filters(), ScanConfig::default()).expect("accepted");
            assert_eq!(session.state(), SessionState::Idle);
            assert_eq!(rx.try_recv().ok(), Some(SessionEvent::ScanningStarted));
            assert_eq!(rx.try_recv().ok(), Some(SessionEvent::ScanningFailed(expected)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cancels_auto_stop() {
        let (session, radio, _rx) = new_session();
        radio.fail_next_scan(ScanFailure::InternalError);

        session.start(filters(), ScanConfig::default()).expect("accepted");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(radio.calls().scan_stop, 0);
    }

    #[tokio::test]
    async fn test_results_forwarded_while_active() {
        let (session, radio, mut rx) = new_session();
        session.start(filters(), manual()).expect("start");
        let _ = rx.try_recv();

        assert!(radio.inject_scan_result(matching_result("11:22:33:44:55:66")));
        match rx.try_recv() {
            Ok(SessionEvent::PeerDiscovered(peer)) => {
                assert_eq!(peer.device_id, "11:22:33:44:55:66");
                assert!(peer.advertises(&service_id()));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(session.results_forwarded(), 1);
    }

    #[tokio::test]
    async fn test_filtered_results_never_reach_consumer() {
        let (session, radio, mut rx) = new_session();
        session.start(filters(), manual()).expect("start");
        let _ = rx.try_recv();

        assert!(!radio.inject_scan_result(RawScanResult::new("AA")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_results_after_stop_are_dropped() {
        let (session, radio, mut rx) = new_session();
        radio.hold_stop_acks(true);
        session.start(filters(), manual()).expect("start");
        let _ = rx.try_recv();

        // the radio deregisters the scan on stop, before the ack arrives
        session.stop().expect("stop");
        assert!(!radio.inject_scan_result(matching_result("AA")));
        assert_eq!(session.results_forwarded(), 0);
        assert_eq!(session.state(), SessionState::Stopping);

        radio.release_stop_acks();
        assert_eq!(
            rx.try_recv().ok(),
            Some(SessionEvent::ScanningStopped {
                reason: StopReason::Requested
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_stop_before_timer_is_single_stop() {
        let (session, radio, _rx) = new_session();

        session.start(filters(), ScanConfig::default()).expect("start");
        tokio::time::sleep(Duration::from_secs(5)).await;
        session.stop().expect("stop");
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(radio.calls().scan_stop, 1);
        assert_eq!(session.state(), SessionState::Idle);
    }
}
