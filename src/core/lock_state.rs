use std::time::{Duration, Instant};

/// The three externally visible door states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Locked,
    /// Face unlock, relocks once the unlock window passes
    UnlockedTimed,
    /// PIN unlock, stays open until locked by hand
    UnlockedIndefinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceUnlock {
    Unlocked,
    AlreadyUnlocked,
    CoolingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinUnlock {
    Unlocked,
    /// Timed unlock turned into an indefinite one
    Promoted,
    AlreadyUnlocked,
}

/// Lock state shared by the polling loop and the command loop.
///
/// Invariants:
/// - locked implies no unlock timestamp and not unlocked by PIN
/// - unlocked by PIN implies no unlock timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockState {
    is_locked: bool,
    unlock_timestamp: Option<Instant>,
    unlocked_by_pin: bool,
    last_locked_timestamp: Option<Instant>,
}

impl Default for LockState {
    fn default() -> Self {
        Self::new()
    }
}

impl LockState {
    pub fn new() -> Self {
        Self {
            is_locked: true,
            unlock_timestamp: None,
            unlocked_by_pin: false,
            last_locked_timestamp: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    pub fn unlocked_by_pin(&self) -> bool {
        self.unlocked_by_pin
    }

    pub fn unlock_timestamp(&self) -> Option<Instant> {
        self.unlock_timestamp
    }

    pub fn last_locked_timestamp(&self) -> Option<Instant> {
        self.last_locked_timestamp
    }

    pub fn mode(&self) -> LockMode {
        if self.is_locked {
            LockMode::Locked
        } else if self.unlocked_by_pin {
            LockMode::UnlockedIndefinite
        } else {
            LockMode::UnlockedTimed
        }
    }

    /// Unconditionally unlocks. Returns whether the door was locked before.
    pub fn unlock(&mut self, by_pin: bool, now: Instant) -> bool {
        let was_locked = self.is_locked;
        self.is_locked = false;
        self.unlocked_by_pin = by_pin;
        self.unlock_timestamp = if by_pin { None } else { Some(now) };
        was_locked
    }

    /// Locks from any state and starts the relock cooldown.
    pub fn lock(&mut self, now: Instant) -> LockMode {
        let previous = self.mode();
        self.is_locked = true;
        self.unlock_timestamp = None;
        self.unlocked_by_pin = false;
        self.last_locked_timestamp = Some(now);
        previous
    }

    pub fn cooldown_elapsed(&self, now: Instant, cooldown: Duration) -> bool {
        match self.last_locked_timestamp {
            None => true,
            Some(locked_at) => now.saturating_duration_since(locked_at) > cooldown,
        }
    }

    /// Relocks a timed unlock whose window has passed. Returns true if it did.
    pub fn expire(&mut self, now: Instant, unlock_duration: Duration) -> bool {
        if self.is_locked || self.unlocked_by_pin {
            return false;
        }
        match self.unlock_timestamp {
            Some(unlocked_at) if now.saturating_duration_since(unlocked_at) > unlock_duration => {
                self.lock(now);
                true
            }
            _ => false,
        }
    }

    /// Time left before a timed unlock relocks.
    pub fn remaining(&self, now: Instant, unlock_duration: Duration) -> Option<Duration> {
        match self.mode() {
            LockMode::UnlockedTimed => self
                .unlock_timestamp
                .map(|at| unlock_duration.saturating_sub(now.saturating_duration_since(at))),
            _ => None,
        }
    }

    pub fn try_face_unlock(&mut self, now: Instant, cooldown: Duration) -> FaceUnlock {
        if !self.is_locked {
            return FaceUnlock::AlreadyUnlocked;
        }
        if !self.cooldown_elapsed(now, cooldown) {
            return FaceUnlock::CoolingDown;
        }
        self.unlock(false, now);
        FaceUnlock::Unlocked
    }

    /// A PIN always leaves the door unlocked until `lock()`. A face unlock
    /// still inside its window is promoted to indefinite, not left as is.
    pub fn try_pin_unlock(&mut self, now: Instant) -> PinUnlock {
        match self.mode() {
            LockMode::Locked => {
                self.unlock(true, now);
                PinUnlock::Unlocked
            }
            LockMode::UnlockedTimed => {
                self.unlock(true, now);
                PinUnlock::Promoted
            }
            LockMode::UnlockedIndefinite => PinUnlock::AlreadyUnlocked,
        }
    }

    #[cfg(test)]
    fn invariants_hold(&self) -> bool {
        let locked_ok =
            !self.is_locked || (self.unlock_timestamp.is_none() && !self.unlocked_by_pin);
        let pin_ok = !self.unlocked_by_pin || self.unlock_timestamp.is_none();
        locked_ok && pin_ok
    }
}
