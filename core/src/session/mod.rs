//! Radio role sessions
//!
//! Each session is a singleton per radio role; its own state machine keeps
//! it from double-starting the radio:
//!
//! - **advertiser**: peripheral advertising with optional scheduled stop
//! - **scanner**: central scanning with a mandatory-cancel auto-stop timer
//! - **config**: payload and settings values handed to the radio
//! - **events**: ordered completion/discovery stream

pub mod advertiser;
pub mod config;
pub mod events;
pub mod scanner;
pub mod state;
mod timer;

pub use advertiser::{AdvertiseError, AdvertisingSession};
pub use config::{
    AdvertiseConfig, AdvertiseMode, AdvertisePayload, AdvertisePayloadBuilder, ScanConfig,
    ScanFilterSpec, ScanMode, TxPowerLevel,
};
pub use events::{event_channel, EventReceiver, EventSender, SessionEvent, StopReason};
pub use scanner::{ScanError, ScanningSession};
pub use state::SessionState;
