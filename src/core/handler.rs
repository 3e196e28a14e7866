use crate::common::config::{LockConfig, PollConfig};
use crate::common::{DoorError, Result};
use crate::core::access::{
    AccessAttempt, AccessLogStore, DoorCommand, FaceAuthenticator, NotificationSink, PinValidator,
};
use crate::core::clock::{Clock, SystemClock};
use crate::core::lock_state::{FaceUnlock, LockMode, LockState, PinUnlock};
use crate::core::poller::{AuthPoller, PollerHandle};
use image::DynamicImage;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Snapshot for the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorStatus {
    pub mode: LockMode,
    pub remaining: Option<Duration>,
}

impl fmt::Display for DoorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.mode, self.remaining) {
            (LockMode::Locked, _) => write!(f, "locked"),
            (LockMode::UnlockedIndefinite, _) => write!(f, "unlocked (by PIN)"),
            (LockMode::UnlockedTimed, Some(left)) => {
                write!(f, "unlocked (relocks in {}s)", left.as_secs())
            }
            (LockMode::UnlockedTimed, None) => write!(f, "unlocked"),
        }
    }
}

/// Single owner of the door's lock state.
///
/// Every mutation happens under one mutex that is released before the
/// access log or the notification sink is touched. Collaborator failures
/// are logged and never undo a transition.
///
/// Each transition takes a sequence number while the state is still held.
/// Door commands are handed to the sink in sequence order, and a command
/// overtaken by a newer one is dropped, so the last command the sink sees
/// always matches the lock state.
pub struct DoorLockHandler {
    state: Mutex<LockState>,
    next_seq: AtomicU64,
    /// Sequence of the last command given to the sink, held across the publish
    published_seq: Mutex<u64>,
    settings: LockConfig,
    clock: Arc<dyn Clock>,
    pins: Arc<dyn PinValidator>,
    notifier: Arc<dyn NotificationSink>,
    access_log: Arc<dyn AccessLogStore>,
    poller: Mutex<Option<PollerHandle>>,
}

impl DoorLockHandler {
    pub fn new(
        settings: LockConfig,
        pins: Arc<dyn PinValidator>,
        notifier: Arc<dyn NotificationSink>,
        access_log: Arc<dyn AccessLogStore>,
    ) -> Self {
        Self::with_clock(settings, pins, notifier, access_log, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: LockConfig,
        pins: Arc<dyn PinValidator>,
        notifier: Arc<dyn NotificationSink>,
        access_log: Arc<dyn AccessLogStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if pins.is_empty() {
            warn!("No authorized PINs loaded - PIN unlock will always fail");
        }

        Self {
            state: Mutex::new(LockState::new()),
            next_seq: AtomicU64::new(0),
            published_seq: Mutex::new(0),
            settings,
            clock,
            pins,
            notifier,
            access_log,
            poller: Mutex::new(None),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn settings(&self) -> &LockConfig {
        &self.settings
    }

    /// Copy of the current state, for inspection only.
    pub fn snapshot(&self) -> LockState {
        self.state().clone()
    }

    pub fn is_locked(&self) -> bool {
        self.state().is_locked()
    }

    /// Unlock the door. A PIN unlock stays open until `lock()`.
    pub fn unlock(&self, by_pin: bool) {
        let (was_locked, seq) = self.sequenced(|state, now| state.unlock(by_pin, now));

        if by_pin {
            info!("[DOOR] Unlocked indefinitely by PIN");
        } else {
            info!("[DOOR] Unlocked for {}s", self.settings.unlock_duration_secs);
        }
        if was_locked {
            self.publish(DoorCommand::Unlock, seq);
        }
    }

    pub fn lock(&self) {
        let (previous, seq) = self.sequenced(|state, now| state.lock(now));
        info!("[DOOR] Locked (was {:?})", previous);
        self.publish(DoorCommand::Lock, seq);
    }

    /// Relocks an expired face unlock. Returns whether the door is locked.
    pub fn check_status(&self) -> bool {
        let unlock_duration = self.settings.unlock_duration();
        let ((expired, locked), seq) = self.sequenced(|state, now| {
            let expired = state.expire(now, unlock_duration);
            (expired, state.is_locked())
        });

        if expired {
            info!(
                "[DOOR] Unlock window of {}s elapsed, auto-locking",
                self.settings.unlock_duration_secs
            );
            self.publish(DoorCommand::Lock, seq);
        }
        locked
    }

    pub fn status(&self) -> DoorStatus {
        self.check_status();
        let unlock_duration = self.settings.unlock_duration();
        self.transition(|state, now| DoorStatus {
            mode: state.mode(),
            remaining: state.remaining(now, unlock_duration),
        })
    }

    pub fn unlock_with_pin(&self, pin: &str) -> bool {
        if !self.pins.is_valid_pin(pin) {
            warn!("[DOOR] Rejected PIN attempt");
            if self.settings.log_failed_pin_attempts {
                self.record(AccessAttempt::pin(false));
            }
            return false;
        }

        let (outcome, seq) = self.sequenced(|state, now| state.try_pin_unlock(now));
        match outcome {
            PinUnlock::Unlocked => {
                info!("[DOOR] Unlocked indefinitely by PIN");
                self.record(AccessAttempt::pin(true));
                self.publish(DoorCommand::Unlock, seq);
            }
            PinUnlock::Promoted => {
                info!("[DOOR] PIN accepted, unlock no longer expires");
                self.record(AccessAttempt::pin(true));
            }
            PinUnlock::AlreadyUnlocked => {
                info!("[DOOR] PIN accepted, door already unlocked by PIN");
            }
        }
        true
    }

    /// Face-triggered unlock, honoring the relock cooldown.
    pub fn unlock_with_face(&self, identity: &str) -> FaceUnlock {
        let cooldown = self.settings.cooldown();
        let (outcome, seq) = self.sequenced(|state, now| state.try_face_unlock(now, cooldown));

        if outcome == FaceUnlock::Unlocked {
            info!("[FACE] Authorized user: {}", identity);
            info!("[DOOR] Unlocked for {}s", self.settings.unlock_duration_secs);
            self.record(AccessAttempt::face(identity, true, None));
            self.publish(DoorCommand::Unlock, seq);
        }
        outcome
    }

    /// Logs an unauthorized face and raises an alert. Lock state is untouched.
    pub fn report_unauthorized(&self, identity: &str, evidence: Option<DynamicImage>) {
        warn!("[FACE] Unauthorized access detected: {}", identity);
        if evidence.is_none() {
            warn!("[FACE] No frame captured for alert");
        }
        self.record(AccessAttempt::face(identity, false, evidence));
        if let Err(e) = self.notifier.publish_unauthorized_alert(identity) {
            error!("Failed to send unauthorized alert for {}: {}", identity, e);
        }
    }

    /// Spawns the face polling loop. Only one loop may run at a time.
    pub fn start(
        self: &Arc<Self>,
        authenticator: Box<dyn FaceAuthenticator>,
        poll: PollConfig,
    ) -> Result<()> {
        let mut slot = self.poller.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(DoorError::Other(anyhow::anyhow!("Face polling loop already running")));
        }

        let poller = AuthPoller::new(Arc::clone(self), authenticator, poll);
        *slot = Some(poller.spawn()?);
        info!("Door control system ready");
        Ok(())
    }

    /// Stops the polling loop. Returns false if it did not exit in time.
    pub fn stop(&self) -> bool {
        let handle = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take();
        match handle {
            Some(handle) => {
                let stopped = handle.stop();
                info!("Door control system stopped");
                stopped
            }
            None => true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.poller.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read-modify-write under the state mutex; the guard is dropped on return.
    fn transition<R>(&self, f: impl FnOnce(&mut LockState, Instant) -> R) -> R {
        let mut state = self.state();
        let now = self.clock.now();
        f(&mut state, now)
    }

    /// Like `transition`, also returning the transition's sequence number.
    fn sequenced<R>(&self, f: impl FnOnce(&mut LockState, Instant) -> R) -> (R, u64) {
        let mut state = self.state();
        let now = self.clock.now();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        (f(&mut state, now), seq)
    }

    fn record(&self, attempt: AccessAttempt) {
        if let Err(e) = self.access_log.log_access(&attempt) {
            error!(
                "Failed to log {} access for {} (authorized: {}): {}",
                attempt.method, attempt.identity, attempt.authorized, e
            );
        }
    }

    fn publish(&self, command: DoorCommand, seq: u64) {
        let mut published = self.published_seq.lock().unwrap_or_else(|e| e.into_inner());
        if seq < *published {
            debug!("Dropping door state '{}' (#{}), superseded by #{}", command, seq, *published);
            return;
        }
        *published = seq;
        if let Err(e) = self.notifier.publish_door_state(command) {
            error!("Failed to publish door state '{}': {}", command, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::access::{PIN_IDENTITY, UnlockMethod};
    use crate::core::clock::{Clock, ManualClock};
    use std::collections::HashSet;

    #[derive(Default)]
    pub(crate) struct FakePins(pub HashSet<String>);

    impl PinValidator for FakePins {
        fn is_valid_pin(&self, pin: &str) -> bool {
            self.0.contains(pin)
        }
        fn len(&self) -> usize {
            self.0.len()
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeNotifier {
        pub states: Mutex<Vec<DoorCommand>>,
        pub alerts: Mutex<Vec<String>>,
        pub fail: bool,
        /// Delivery of this command stalls for the given time
        pub slow: Option<(DoorCommand, Duration)>,
    }

    impl NotificationSink for FakeNotifier {
        fn publish_door_state(&self, state: DoorCommand) -> Result<()> {
            if let Some((command, delay)) = self.slow {
                if command == state {
                    std::thread::sleep(delay);
                }
            }
            self.states.lock().unwrap().push(state);
            if self.fail {
                return Err(DoorError::Notify("broker unreachable".into()));
            }
            Ok(())
        }
        fn publish_unauthorized_alert(&self, identity: &str) -> Result<()> {
            self.alerts.lock().unwrap().push(identity.to_string());
            if self.fail {
                return Err(DoorError::Notify("broker unreachable".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeLog {
        pub attempts: Mutex<Vec<AccessAttempt>>,
        pub fail: bool,
    }

    impl AccessLogStore for FakeLog {
        fn log_access(&self, attempt: &AccessAttempt) -> Result<()> {
            self.attempts.lock().unwrap().push(attempt.clone());
            if self.fail {
                return Err(DoorError::Storage("disk full".into()));
            }
            Ok(())
        }
    }

    pub(crate) struct Rig {
        pub handler: Arc<DoorLockHandler>,
        pub clock: Arc<ManualClock>,
        pub notifier: Arc<FakeNotifier>,
        pub log: Arc<FakeLog>,
    }

    pub(crate) fn rig_with(settings: LockConfig, notifier: FakeNotifier, log: FakeLog) -> Rig {
        let clock = Arc::new(ManualClock::new());
        let notifier = Arc::new(notifier);
        let log = Arc::new(log);
        let pins = Arc::new(FakePins(["1234".to_string()].into_iter().collect()));
        let handler = Arc::new(DoorLockHandler::with_clock(
            settings,
            pins,
            notifier.clone(),
            log.clone(),
            clock.clone(),
        ));
        Rig { handler, clock, notifier, log }
    }

    pub(crate) fn rig() -> Rig {
        rig_with(LockConfig::default(), FakeNotifier::default(), FakeLog::default())
    }

    #[test]
    fn test_unlock_by_face_publishes_unlock() {
        let rig = rig();
        rig.handler.unlock(false);

        let state = rig.handler.snapshot();
        assert!(!state.is_locked());
        assert!(state.unlock_timestamp().is_some());
        assert_eq!(*rig.notifier.states.lock().unwrap(), vec![DoorCommand::Unlock]);
    }

    #[test]
    fn test_unlock_while_open_does_not_republish() {
        let rig = rig();
        rig.handler.unlock(true);
        rig.handler.unlock(false);

        assert_eq!(rig.handler.snapshot().mode(), LockMode::UnlockedTimed);
        assert_eq!(rig.notifier.states.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_pin_unlock_logs_and_publishes() {
        let rig = rig();
        assert!(rig.handler.unlock_with_pin("1234"));

        let state = rig.handler.snapshot();
        assert_eq!(state.mode(), LockMode::UnlockedIndefinite);
        assert_eq!(*rig.notifier.states.lock().unwrap(), vec![DoorCommand::Unlock]);

        let attempts = rig.log.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].identity, PIN_IDENTITY);
        assert!(attempts[0].authorized);
        assert_eq!(attempts[0].method, UnlockMethod::Pin);
    }

    #[test]
    fn test_invalid_pin_leaves_state_unchanged() {
        let rig = rig();
        let before = rig.handler.snapshot();

        assert!(!rig.handler.unlock_with_pin("0000"));
        assert_eq!(rig.handler.snapshot(), before);
        assert!(rig.log.attempts.lock().unwrap().is_empty());
        assert!(rig.notifier.states.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_pin_logged_when_enabled() {
        let settings = LockConfig { log_failed_pin_attempts: true, ..LockConfig::default() };
        let rig = rig_with(settings, FakeNotifier::default(), FakeLog::default());

        assert!(!rig.handler.unlock_with_pin("9999"));
        let attempts = rig.log.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(!attempts[0].authorized);
        assert_eq!(attempts[0].method, UnlockMethod::Pin);
    }

    #[test]
    fn test_empty_pin_set_rejects_everything() {
        let handler = DoorLockHandler::new(
            LockConfig::default(),
            Arc::new(FakePins::default()),
            Arc::new(FakeNotifier::default()),
            Arc::new(FakeLog::default()),
        );
        assert!(!handler.unlock_with_pin("1234"));
        assert!(!handler.unlock_with_pin(""));
        assert!(handler.is_locked());
    }

    #[test]
    fn test_auto_lock_after_window() {
        let rig = rig();
        rig.handler.unlock(false);

        rig.clock.advance(Duration::from_secs(299));
        assert!(!rig.handler.check_status());

        rig.clock.advance(Duration::from_secs(2));
        assert!(rig.handler.check_status());
        assert_eq!(
            *rig.notifier.states.lock().unwrap(),
            vec![DoorCommand::Unlock, DoorCommand::Lock]
        );
        assert!(rig.handler.snapshot().last_locked_timestamp().is_some());
    }

    #[test]
    fn test_pin_unlock_survives_check_status() {
        let rig = rig();
        rig.handler.unlock(true);
        rig.clock.advance(Duration::from_secs(10_000));

        assert!(!rig.handler.check_status());
        assert!(rig.handler.snapshot().unlocked_by_pin());
    }

    #[test]
    fn test_manual_lock_from_timed_unlock() {
        let rig = rig();
        rig.handler.unlock(false);
        rig.handler.lock();

        let state = rig.handler.snapshot();
        assert!(state.is_locked());
        assert_eq!(state.last_locked_timestamp(), Some(rig.clock.now()));
        assert_eq!(rig.notifier.states.lock().unwrap().last(), Some(&DoorCommand::Lock));
    }

    #[test]
    fn test_face_unlock_blocked_during_cooldown() {
        let rig = rig();
        rig.handler.lock();

        rig.clock.advance(Duration::from_secs(5));
        assert_eq!(rig.handler.unlock_with_face("alice"), FaceUnlock::CoolingDown);
        assert!(rig.log.attempts.lock().unwrap().is_empty());

        rig.clock.advance(Duration::from_secs(6));
        assert_eq!(rig.handler.unlock_with_face("alice"), FaceUnlock::Unlocked);
        let attempts = rig.log.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].identity, "alice");
        assert_eq!(attempts[0].method, UnlockMethod::Face);
    }

    #[test]
    fn test_collaborator_failures_do_not_block_transitions() {
        let rig = rig_with(
            LockConfig::default(),
            FakeNotifier { fail: true, ..FakeNotifier::default() },
            FakeLog { fail: true, ..FakeLog::default() },
        );

        assert!(rig.handler.unlock_with_pin("1234"));
        assert!(!rig.handler.is_locked());
        rig.handler.lock();
        assert!(rig.handler.is_locked());
        rig.handler.report_unauthorized("Stranger", None);
        assert!(rig.handler.is_locked());
    }

    #[test]
    fn test_pin_promotes_face_unlock_without_publishing() {
        let rig = rig();
        assert_eq!(rig.handler.unlock_with_face("alice"), FaceUnlock::Unlocked);
        assert!(rig.handler.unlock_with_pin("1234"));

        assert_eq!(rig.handler.snapshot().mode(), LockMode::UnlockedIndefinite);
        assert_eq!(*rig.notifier.states.lock().unwrap(), vec![DoorCommand::Unlock]);
        assert_eq!(rig.log.attempts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_status_display() {
        let rig = rig();
        assert_eq!(rig.handler.status().to_string(), "locked");

        rig.handler.unlock(false);
        rig.clock.advance(Duration::from_secs(60));
        assert_eq!(rig.handler.status().to_string(), "unlocked (relocks in 240s)");

        rig.handler.unlock(true);
        assert_eq!(rig.handler.status().to_string(), "unlocked (by PIN)");
    }

    #[test]
    fn test_concurrent_unlocks_produce_single_unlock_event() {
        let rig = rig();
        let mut threads = Vec::new();
        for i in 0..8 {
            let handler = Arc::clone(&rig.handler);
            threads.push(std::thread::spawn(move || {
                if i % 2 == 0 {
                    handler.unlock_with_pin("1234");
                } else {
                    handler.unlock_with_face("alice");
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }

        assert!(!rig.handler.is_locked());
        assert_eq!(*rig.notifier.states.lock().unwrap(), vec![DoorCommand::Unlock]);
    }

    fn last_published_matches_state(rig: &Rig) {
        let last = rig.notifier.states.lock().unwrap().last().copied();
        let expected =
            if rig.handler.is_locked() { DoorCommand::Lock } else { DoorCommand::Unlock };
        assert_eq!(last, Some(expected));
    }

    #[test]
    fn test_slow_lock_publish_cannot_overtake_later_unlock() {
        let slow = FakeNotifier {
            slow: Some((DoorCommand::Lock, Duration::from_millis(200))),
            ..FakeNotifier::default()
        };
        let rig = rig_with(LockConfig::default(), slow, FakeLog::default());
        rig.handler.unlock(false);

        let handler = Arc::clone(&rig.handler);
        let locker = std::thread::spawn(move || handler.lock());
        std::thread::sleep(Duration::from_millis(50));
        assert!(rig.handler.unlock_with_pin("1234"));
        locker.join().unwrap();

        last_published_matches_state(&rig);
    }

    #[test]
    fn test_slow_unlock_publish_cannot_overtake_later_lock() {
        let slow = FakeNotifier {
            slow: Some((DoorCommand::Unlock, Duration::from_millis(200))),
            ..FakeNotifier::default()
        };
        let rig = rig_with(LockConfig::default(), slow, FakeLog::default());

        let handler = Arc::clone(&rig.handler);
        let opener = std::thread::spawn(move || handler.unlock_with_face("alice"));
        std::thread::sleep(Duration::from_millis(50));
        rig.handler.lock();
        opener.join().unwrap();

        assert!(rig.handler.is_locked());
        last_published_matches_state(&rig);
    }
}
