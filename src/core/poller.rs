use crate::common::config::PollConfig;
use crate::common::Result;
use crate::core::access::{FaceAuthenticator, FaceObservation};
use crate::core::clock::Clock;
use crate::core::handler::DoorLockHandler;
use crate::core::lock_state::FaceUnlock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Shared stop flag checked once per poll tick.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What a single poll tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    NoFace,
    /// Face seen again inside the debounce window
    Debounced,
    Authorized(FaceUnlock),
    IntruderReported,
    /// Intruder seen again inside the alert interval
    IntruderSuppressed,
    /// Unauthorized face while the door is open
    Ignored,
}

/// Background loop fusing face results into the lock handler.
pub struct AuthPoller {
    handler: Arc<DoorLockHandler>,
    authenticator: Box<dyn FaceAuthenticator>,
    clock: Arc<dyn Clock>,
    settings: PollConfig,
    last_detection: Option<Instant>,
    last_alert: Option<Instant>,
}

impl AuthPoller {
    pub fn new(
        handler: Arc<DoorLockHandler>,
        authenticator: Box<dyn FaceAuthenticator>,
        settings: PollConfig,
    ) -> Self {
        let clock = handler.clock();
        Self {
            handler,
            authenticator,
            clock,
            settings,
            last_detection: None,
            last_alert: None,
        }
    }

    /// One iteration: query the authenticator, evaluate a fresh detection,
    /// then give the handler a chance to auto-lock.
    pub fn tick(&mut self) -> PollEvent {
        let event = match self.authenticator.check_authentication() {
            Ok(Some(observation)) => self.on_face(observation),
            Ok(None) => PollEvent::NoFace,
            Err(e) => {
                debug!("No frame this cycle: {}", e);
                PollEvent::NoFace
            }
        };

        self.handler.check_status();
        event
    }

    fn on_face(&mut self, observation: FaceObservation) -> PollEvent {
        let now = self.clock.now();
        if let Some(last) = self.last_detection {
            if now.saturating_duration_since(last) < self.settings.debounce() {
                return PollEvent::Debounced;
            }
        }
        self.last_detection = Some(now);

        if observation.authorized {
            let outcome = self.handler.unlock_with_face(&observation.identity);
            if outcome == FaceUnlock::CoolingDown {
                debug!("Authorized face {} ignored during relock cooldown", observation.identity);
            }
            return PollEvent::Authorized(outcome);
        }

        if !self.handler.is_locked() {
            return PollEvent::Ignored;
        }

        let alert_due = self
            .last_alert
            .map_or(true, |last| {
                now.saturating_duration_since(last) >= self.settings.alert_interval()
            });
        if !alert_due {
            return PollEvent::IntruderSuppressed;
        }

        let evidence = match self.authenticator.capture_evidence() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to capture evidence frame: {}", e);
                None
            }
        };
        self.handler.report_unauthorized(&observation.identity, evidence);
        self.last_alert = Some(now);
        PollEvent::IntruderReported
    }

    pub fn run(mut self, token: CancellationToken) {
        let tick = self.settings.tick();
        info!("Face authentication loop started (tick {:?})", tick);
        while !token.is_cancelled() {
            self.tick();
            thread::sleep(tick);
        }
        info!("Face authentication loop exited");
    }

    pub fn spawn(self) -> Result<PollerHandle> {
        let token = CancellationToken::new();
        let join_timeout = self.settings.join_timeout();
        let loop_token = token.clone();
        let thread = thread::Builder::new()
            .name("face-auth-poll".into())
            .spawn(move || self.run(loop_token))?;

        Ok(PollerHandle { token, thread, join_timeout })
    }
}

pub struct PollerHandle {
    token: CancellationToken,
    thread: JoinHandle<()>,
    join_timeout: Duration,
}

impl PollerHandle {
    /// Cancels and waits up to the join timeout. A loop stuck in a
    /// collaborator call past that point is detached.
    pub fn stop(self) -> bool {
        self.token.cancel();
        join_with_timeout(self.thread, self.join_timeout, "Face authentication loop")
    }
}

/// Waits for `thread` until `timeout`, detaching it if it is still busy.
pub fn join_with_timeout(thread: JoinHandle<()>, timeout: Duration, what: &str) -> bool {
    let deadline = Instant::now() + timeout;
    while !thread.is_finished() {
        if Instant::now() >= deadline {
            warn!("{} did not stop within {:?}, detaching", what, timeout);
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }

    if thread.join().is_err() {
        error!("{} panicked", what);
        return false;
    }
    true
}
