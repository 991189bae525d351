//! Host lifecycle integration
//!
//! Binds session creation/teardown to foreground transitions and exposes
//! the command surface the host UI drives.

pub mod coordinator;
pub mod settings;

pub use coordinator::{
    CommandError, CommandOutcome, LifecycleCoordinator, LifecycleSignal, UiNotifier,
};
pub use settings::{BleSettings, SettingsError, DEFAULT_SERVICE_UUID};
