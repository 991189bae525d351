use super::advertiser::AdvertiseError;
use super::config::AdvertiseConfig;
use super::scanner::ScanError;
use crate::peer::PeerRecord;
use std::fmt;
use tokio::sync::mpsc;

/// Why a session left the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` from a command or the lifecycle coordinator
    Requested,
    /// The session's own scheduled stop fired
    AutoStop,
    /// The radio stack expired the advertisement itself
    RadioTimeout,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => write!(f, "requested"),
            StopReason::AutoStop => write!(f, "auto-stop"),
            StopReason::RadioTimeout => write!(f, "radio timeout"),
        }
    }
}

/// Completion and discovery events, delivered in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AdvertisingStarted { settings_in_effect: AdvertiseConfig },
    AdvertisingFailed(AdvertiseError),
    AdvertisingStopped { reason: StopReason },
    ScanningStarted,
    ScanningFailed(ScanError),
    ScanningStopped { reason: StopReason },
    PeerDiscovered(PeerRecord),
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

pub(crate) fn emit(events: &EventSender, event: SessionEvent) {
    if events.send(event).is_err() {
        tracing::trace!("Event consumer gone; dropping session event");
    }
}
