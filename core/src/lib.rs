// blecast core: BLE advertise/scan session orchestration
//
// One radio, two roles. The sessions here decide when the radio may be
// asked to advertise or scan; the radio itself lives behind `RadioControl`.

pub mod lifecycle;
pub mod peer;
pub mod radio;
pub mod session;

pub use lifecycle::{
    BleSettings, CommandError, CommandOutcome, LifecycleCoordinator, LifecycleSignal,
    SettingsError, UiNotifier,
};
pub use peer::{AdvertiseFlags, PeerRecord, RawScanRecord, RawScanResult, ResultProcessor};
pub use radio::{
    AdvertiseFailure, AdvertiseObserver, Capabilities, CapabilityProbe, RadioControl,
    ScanFailure, ScanObserver, SimulatedRadio,
};
pub use session::{
    AdvertiseConfig, AdvertiseError, AdvertiseMode, AdvertisePayload, AdvertisingSession,
    ScanConfig, ScanError, ScanFilterSpec, ScanMode, ScanningSession, SessionEvent,
    SessionState, StopReason, TxPowerLevel,
};
