//! Advertising session
//!
//! ```text
//! Idle --start--> Starting --success--> Active --stop--> Stopping --ack--> Idle
//! Starting --failure--> Idle
//! Starting/Active --radio timeout--> Idle
//! Active --scheduled stop--> Stopping
//! ```

use super::config::{AdvertiseConfig, AdvertisePayload};
use super::events::{emit, EventSender, SessionEvent, StopReason};
use super::state::SessionState;
use super::timer::ScheduledStop;
use crate::radio::{AdvertiseFailure, AdvertiseObserver, RadioControl};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseError {
    #[error("Peripheral mode advertising is not supported")]
    Unsupported,
    #[error("Advertising is already active")]
    AlreadyActive,
    #[error("Advertise payload is too large")]
    PayloadTooLarge,
    #[error("Too many advertisers")]
    ResourceExhausted,
    #[error("Radio internal error")]
    RadioInternalError,
}

impl From<AdvertiseFailure> for AdvertiseError {
    fn from(failure: AdvertiseFailure) -> Self {
        match failure {
            AdvertiseFailure::AlreadyStarted => AdvertiseError::AlreadyActive,
            AdvertiseFailure::DataTooLarge => AdvertiseError::PayloadTooLarge,
            AdvertiseFailure::FeatureUnsupported => AdvertiseError::Unsupported,
            AdvertiseFailure::InternalError => AdvertiseError::RadioInternalError,
            AdvertiseFailure::TooManyAdvertisers => AdvertiseError::ResourceExhausted,
            AdvertiseFailure::Unknown(_) => AdvertiseError::RadioInternalError,
        }
    }
}

struct AdvertiseInner {
    state: SessionState,
    generation: u64,
    attempt: Option<Arc<AdvertiseAttempt>>,
    timer: Option<ScheduledStop>,
    stop_reason: StopReason,
}

struct AdvertiseShared {
    radio: Arc<dyn RadioControl>,
    runtime: Handle,
    peripheral_supported: bool,
    events: EventSender,
    inner: Mutex<AdvertiseInner>,
}

/// Callback target handed to the radio for one start attempt.
///
/// Callbacks carrying an older generation than the session's are stale and
/// ignored.
struct AdvertiseAttempt {
    session: Weak<AdvertiseShared>,
    generation: u64,
}

/// Owner of the single outbound advertisement. Cloning yields another
/// handle to the same session.
#[derive(Clone)]
pub struct AdvertisingSession {
    shared: Arc<AdvertiseShared>,
}

impl AdvertisingSession {
    pub fn new(
        radio: Arc<dyn RadioControl>,
        peripheral_supported: bool,
        events: EventSender,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(AdvertiseShared {
                radio,
                runtime,
                peripheral_supported,
                events,
                inner: Mutex::new(AdvertiseInner {
                    state: SessionState::Idle,
                    generation: 0,
                    attempt: None,
                    timer: None,
                    stop_reason: StopReason::Requested,
                }),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    /// Request advertising; success is reported as
    /// [`SessionEvent::AdvertisingStarted`].
    pub fn start(
        &self,
        payload: AdvertisePayload,
        config: AdvertiseConfig,
    ) -> Result<(), AdvertiseError> {
        if !self.shared.peripheral_supported {
            warn!("Advertise start rejected: peripheral mode unsupported");
            return Err(AdvertiseError::Unsupported);
        }

        let attempt = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.is_idle() {
                debug!("Advertise start rejected: session is {}", inner.state);
                return Err(AdvertiseError::AlreadyActive);
            }
            inner.generation += 1;
            inner.state = SessionState::Starting;
            inner.stop_reason = StopReason::Requested;
            let attempt = Arc::new(AdvertiseAttempt {
                session: Arc::downgrade(&self.shared),
                generation: inner.generation,
            });
            inner.attempt = Some(attempt.clone());
            attempt
        };

        info!(
            "Starting advertising: service={} data_len={} config={:?}",
            payload.service_id(),
            payload.service_data().len(),
            config
        );
        self.shared.radio.advertise_start(&payload, &config, attempt);
        Ok(())
    }

    /// Idempotent. No radio call when already idle or stopping.
    pub fn stop(&self) -> Result<(), AdvertiseError> {
        self.shared.stop(StopReason::Requested, None);
        Ok(())
    }
}

impl AdvertiseShared {
    /// Begin stopping. With `only_generation`, act only if that attempt is
    /// still the active one (used by the scheduled stop).
    fn stop(self: &Arc<Self>, reason: StopReason, only_generation: Option<u64>) {
        let attempt = {
            let mut inner = self.inner.lock();
            if let Some(generation) = only_generation {
                if inner.generation != generation || inner.state != SessionState::Active {
                    debug!("Scheduled advertise stop absorbed (state {})", inner.state);
                    return;
                }
            }
            match inner.state {
                SessionState::Idle | SessionState::Stopping => {
                    debug!("Advertise stop is a no-op in state {}", inner.state);
                    return;
                }
                SessionState::Starting | SessionState::Active => {}
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

        info!("Stopping advertising ({})", reason);
        self.radio.advertise_stop(attempt);
    }

    fn on_start_success(self: &Arc<Self>, generation: u64, settings: AdvertiseConfig) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != SessionState::Starting {
            debug!("Ignoring advertise start success in state {}", inner.state);
            return;
        }
        inner.state = SessionState::Active;
        info!("Advertising started: {:?}", settings);

        if !settings.timeout.is_zero() {
            let session = Arc::downgrade(self);
            inner.timer = Some(ScheduledStop::schedule(
                &self.runtime,
                settings.timeout,
                move || {
                    if let Some(session) = session.upgrade() {
                        session.stop(StopReason::AutoStop, Some(generation));
                    }
                },
            ));
        }

        emit(
            &self.events,
            SessionEvent::AdvertisingStarted {
                settings_in_effect: settings,
            },
        );
    }

    fn on_start_failure(&self, generation: u64, failure: AdvertiseFailure) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != SessionState::Starting {
            debug!("Ignoring advertise start failure {} in state {}", failure, inner.state);
            return;
        }
        let error = AdvertiseError::from(failure);
        warn!("onStartFailure: {} -> {}", failure, error);
        inner.state = SessionState::Idle;
        inner.attempt = None;
        inner.timer = None;
        emit(&self.events, SessionEvent::AdvertisingFailed(error));
    }

    fn on_timeout(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || !inner.state.is_busy() {
            debug!("Ignoring advertise timeout in state {}", inner.state);
            return;
        }
        info!("Advertising expired by the radio stack");
        inner.state = SessionState::Idle;
        inner.attempt = None;
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        emit(
            &self.events,
            SessionEvent::AdvertisingStopped {
                reason: StopReason::RadioTimeout,
            },
        );
    }

    fn on_stop_ack(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state != SessionState::Stopping {
            debug!("Ignoring advertise stop ack in state {}", inner.state);
            return;
        }
        inner.state = SessionState::Idle;
        inner.attempt = None;
        let reason = inner.stop_reason;
        info!("Advertising stopped ({})", reason);
        emit(&self.events, SessionEvent::AdvertisingStopped { reason });
    }
}

impl AdvertiseObserver for AdvertiseAttempt {
    fn on_start_success(&self, settings_in_effect: AdvertiseConfig) {
        if let Some(session) = self.session.upgrade() {
            session.on_start_success(self.generation, settings_in_effect);
        }
    }

    fn on_start_failure(&self, failure: AdvertiseFailure) {
        if let Some(session) = self.session.upgrade() {
            session.on_start_failure(self.generation, failure);
        }
    }

    fn on_stop_ack(&self) {
        if let Some(session) = self.session.upgrade() {
            session.on_stop_ack(self.generation);
        }
    }

    fn on_timeout(&self) {
        if let Some(session) = self.session.upgrade() {
            session.on_timeout(self.generation);
        }
    }
}
