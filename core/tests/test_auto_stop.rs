// Integration test for scan auto-stop timing
//
// Runs on a paused tokio clock so the 25s scan period elapses instantly
// and deterministically.

use blecast_core::{
    BleSettings, Capabilities, CommandOutcome, LifecycleCoordinator, ScanConfig, ScanFilterSpec,
    ScanningSession, SessionEvent, SessionState, SimulatedRadio, StopReason, UiNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use uuid::Uuid;

struct SilentNotifier;

impl UiNotifier for SilentNotifier {
    fn ble_unsupported(&self) {}
}

fn sample_filter() -> ScanFilterSpec {
    ScanFilterSpec::new(
        Uuid::parse_str("0000FE00-0000-1000-8000-00805F9B34FB").expect("valid uuid"),
    )
}

#[tokio::test(start_paused = true)]
async fn test_scan_auto_stops_after_period() {
    let radio = Arc::new(SimulatedRadio::new(Capabilities::central_only()));
    let (tx, mut rx) = blecast_core::session::event_channel();
    let session = ScanningSession::new(radio.clone(), tx, Handle::current());

    let config = ScanConfig {
        auto_stop_after: Duration::from_secs(25),
        ..ScanConfig::default()
    };
    session.start(vec![sample_filter()], config).expect("start");
    assert_eq!(radio.active_filters(), vec![sample_filter()]);

    tokio::time::sleep(Duration::from_millis(24_900)).await;
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(radio.calls().scan_stop, 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(radio.calls().scan_stop, 1);

    assert_eq!(rx.try_recv().ok(), Some(SessionEvent::ScanningStarted));
    assert_eq!(
        rx.try_recv().ok(),
        Some(SessionEvent::ScanningStopped {
            reason: StopReason::AutoStop
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_auto_stop_fires_at_most_once() {
    let radio = Arc::new(SimulatedRadio::new(Capabilities::central_only()));
    let (tx, _rx) = blecast_core::session::event_channel();
    let session = ScanningSession::new(radio.clone(), tx, Handle::current());

    session
        .start(vec![sample_filter()], ScanConfig::default())
        .expect("start");
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(radio.calls().scan_stop, 1);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_does_not_stop_next_scan() {
    let radio = Arc::new(SimulatedRadio::new(Capabilities::central_only()));
    let (tx, _rx) = blecast_core::session::event_channel();
    let session = ScanningSession::new(radio.clone(), tx, Handle::current());

    session
        .start(vec![sample_filter()], ScanConfig::default())
        .expect("first scan");
    tokio::time::sleep(Duration::from_secs(20)).await;
    session.stop().expect("manual stop");

    // second scan starts 5s before the first one's timer would have fired
    session
        .start(vec![sample_filter()], ScanConfig::default())
        .expect("second scan");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(radio.calls().scan_stop, 1);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(radio.calls().scan_stop, 2);
}

#[tokio::test(start_paused = true)]
async fn test_timer_racing_slow_stop_ack_is_absorbed() {
    let radio = Arc::new(SimulatedRadio::new(Capabilities::central_only()));
    let (tx, _rx) = blecast_core::session::event_channel();
    let session = ScanningSession::new(radio.clone(), tx, Handle::current());
    radio.hold_stop_acks(true);

    session
        .start(vec![sample_filter()], ScanConfig::default())
        .expect("start");
    tokio::time::sleep(Duration::from_secs(24)).await;
    session.stop().expect("stop");
    assert_eq!(session.state(), SessionState::Stopping);

    // the auto-stop deadline passes while the stop is still outstanding
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(radio.calls().scan_stop, 1);

    radio.release_stop_acks();
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_coordinator_scan_uses_default_period() {
    let radio = Arc::new(SimulatedRadio::new(Capabilities::full()));
    let (coordinator, _rx) = LifecycleCoordinator::new(
        radio.clone(),
        BleSettings::default(),
        Arc::new(SilentNotifier),
        Handle::current(),
    );
    coordinator.on_foreground_enter();

    assert_eq!(
        coordinator.request_start_scanning(),
        Ok(CommandOutcome::Pending)
    );
    assert_eq!(radio.active_filters(), vec![sample_filter()]);

    tokio::time::sleep(Duration::from_secs(26)).await;

    let scanner = coordinator.scanning_session().expect("foreground session");
    assert_eq!(scanner.state(), SessionState::Idle);
    assert_eq!(radio.calls().scan_stop, 1);
}
