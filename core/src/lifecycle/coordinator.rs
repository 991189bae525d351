//! Foreground-bound session ownership and the UI command surface

use super::settings::BleSettings;
use crate::radio::{Capabilities, CapabilityProbe, RadioControl};
use crate::session::{
    event_channel, AdvertiseConfig, AdvertiseError, AdvertisingSession, EventReceiver,
    EventSender, ScanConfig, ScanError, ScanningSession, SessionState,
};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Host UI collaborator
#[cfg_attr(test, mockall::automock)]
pub trait UiNotifier: Send + Sync {
    /// BLE is absent; terminal for this foreground period
    fn ble_unsupported(&self);
}

/// Host lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    ForegroundEnter,
    ForegroundExit,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Advertise(#[from] AdvertiseError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Not in the foreground")]
    NotInForeground,
    #[error("Bluetooth LE is not supported on this device")]
    BleUnsupported,
}

/// Accepted command result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Issued to the radio; completion arrives on the event stream
    Pending,
    /// Nothing left outstanding
    Done,
}

struct ForegroundSessions {
    capabilities: Capabilities,
    advertiser: AdvertisingSession,
    scanner: ScanningSession,
    advertise_config: AdvertiseConfig,
    scan_config: ScanConfig,
}

enum Foreground {
    Background,
    Unsupported(Capabilities),
    Active(ForegroundSessions),
}

/// Sessions released by a foreground exit. Kept alive so late stop
/// acknowledgements still land and a role stays blocked until they do.
struct ParkedSessions {
    advertiser: AdvertisingSession,
    scanner: ScanningSession,
}

/// Creates sessions on foreground entry and stops them on exit, so no
/// session stays active outside the foreground period. A session whose stop
/// is still unacknowledged is carried into the next foreground period.
pub struct LifecycleCoordinator {
    radio: Arc<dyn RadioControl>,
    settings: BleSettings,
    notifier: Arc<dyn UiNotifier>,
    events: EventSender,
    runtime: Handle,
    foreground: Mutex<Foreground>,
    parked: Mutex<Option<ParkedSessions>>,
}

impl LifecycleCoordinator {
    /// Returns the coordinator and the receiving end of its event stream
    pub fn new(
        radio: Arc<dyn RadioControl>,
        settings: BleSettings,
        notifier: Arc<dyn UiNotifier>,
        runtime: Handle,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let coordinator = Self {
            radio,
            settings,
            notifier,
            events,
            runtime,
            foreground: Mutex::new(Foreground::Background),
            parked: Mutex::new(None),
        };
        (coordinator, receiver)
    }

    pub fn settings(&self) -> &BleSettings {
        &self.settings
    }

    pub fn is_foreground(&self) -> bool {
        !matches!(*self.foreground.lock(), Foreground::Background)
    }

    /// Capabilities probed on the current foreground entry
    pub fn capabilities(&self) -> Option<Capabilities> {
        match &*self.foreground.lock() {
            Foreground::Background => None,
            Foreground::Unsupported(caps) => Some(*caps),
            Foreground::Active(sessions) => Some(sessions.capabilities),
        }
    }

    pub fn advertising_session(&self) -> Option<AdvertisingSession> {
        match &*self.foreground.lock() {
            Foreground::Active(sessions) => Some(sessions.advertiser.clone()),
            _ => None,
        }
    }

    pub fn scanning_session(&self) -> Option<ScanningSession> {
        match &*self.foreground.lock() {
            Foreground::Active(sessions) => Some(sessions.scanner.clone()),
            _ => None,
        }
    }

    pub fn on_signal(&self, signal: LifecycleSignal) {
        match signal {
            LifecycleSignal::ForegroundEnter => {
                self.on_foreground_enter();
            }
            LifecycleSignal::ForegroundExit => self.on_foreground_exit(),
        }
    }

    /// Probe capabilities and build the sessions. Neither session is started.
    pub fn on_foreground_enter(&self) -> Capabilities {
        let mut foreground = self.foreground.lock();
        match &*foreground {
            Foreground::Active(sessions) => {
                debug!("Already in the foreground");
                return sessions.capabilities;
            }
            Foreground::Unsupported(caps) => {
                debug!("Already in the foreground (BLE unsupported)");
                return *caps;
            }
            Foreground::Background => {}
        }

        let caps = CapabilityProbe::new(self.radio.clone()).probe();
        if !caps.ble_supported {
            warn!("BLE not supported; no sessions created");
            *foreground = Foreground::Unsupported(caps);
            drop(foreground);
            self.notifier.ble_unsupported();
            return caps;
        }

        let parked = self.parked.lock().take();
        let (parked_advertiser, parked_scanner) = match parked {
            Some(p) => (Some(p.advertiser), Some(p.scanner)),
            None => (None, None),
        };

        // a role whose stop is still outstanding keeps its session
        let advertiser = match parked_advertiser.filter(|s| !s.state().is_idle()) {
            Some(session) => {
                debug!("Reusing advertising session ({})", session.state());
                session
            }
            None => AdvertisingSession::new(
                self.radio.clone(),
                caps.peripheral_supported,
                self.events.clone(),
                self.runtime.clone(),
            ),
        };
        let scanner = match parked_scanner.filter(|s| !s.state().is_idle()) {
            Some(session) => {
                debug!("Reusing scanning session ({})", session.state());
                session
            }
            None => ScanningSession::new(
                self.radio.clone(),
                self.events.clone(),
                self.runtime.clone(),
            ),
        };

        *foreground = Foreground::Active(ForegroundSessions {
            capabilities: caps,
            advertiser,
            scanner,
            advertise_config: self.settings.advertise_config(),
            scan_config: self.settings.scan_config(),
        });
        info!("Entered foreground; sessions ready");
        caps
    }

    /// Stop both sessions unconditionally. They stay parked until their stops
    /// are acknowledged.
    pub fn on_foreground_exit(&self) {
        let previous = std::mem::replace(&mut *self.foreground.lock(), Foreground::Background);

        if let Foreground::Active(sessions) = previous {
            if let Err(e) = sessions.advertiser.stop() {
                warn!("Advertising stop on background failed: {}", e);
            }
            if let Err(e) = sessions.scanner.stop() {
                warn!("Scanning stop on background failed: {}", e);
            }
            info!(
                "Left foreground (advertising {}, scanning {})",
                sessions.advertiser.state(),
                sessions.scanner.state()
            );
            *self.parked.lock() = Some(ParkedSessions {
                advertiser: sessions.advertiser,
                scanner: sessions.scanner,
            });
        }
    }

    pub fn request_start_advertising(&self) -> Result<CommandOutcome, CommandError> {
        let (session, config) =
            self.with_sessions(|s| (s.advertiser.clone(), s.advertise_config.clone()))?;
        session.start(self.settings.advertise_payload(), config)?;
        Ok(CommandOutcome::Pending)
    }

    pub fn request_stop_advertising(&self) -> Result<CommandOutcome, CommandError> {
        let session = self.with_sessions(|s| s.advertiser.clone())?;
        session.stop()?;
        Ok(Self::outcome(session.state()))
    }

    pub fn request_start_scanning(&self) -> Result<CommandOutcome, CommandError> {
        let (session, config) =
            self.with_sessions(|s| (s.scanner.clone(), s.scan_config.clone()))?;
        session.start(self.settings.scan_filters(), config)?;
        Ok(CommandOutcome::Pending)
    }

    pub fn request_stop_scanning(&self) -> Result<CommandOutcome, CommandError> {
        let session = self.with_sessions(|s| s.scanner.clone())?;
        session.stop()?;
        Ok(Self::outcome(session.state()))
    }

    fn outcome(state: SessionState) -> CommandOutcome {
        if state.is_idle() {
            CommandOutcome::Done
        } else {
            CommandOutcome::Pending
        }
    }

    fn with_sessions<T>(
        &self,
        f: impl FnOnce(&ForegroundSessions) -> T,
    ) -> Result<T, CommandError> {
        match &*self.foreground.lock() {
            Foreground::Active(sessions) => Ok(f(sessions)),
            Foreground::Unsupported(_) => Err(CommandError::BleUnsupported),
            Foreground::Background => Err(CommandError::NotInForeground),
        }
    }
}
