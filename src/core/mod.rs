pub mod access;
pub mod clock;
pub mod handler;
pub mod lock_state;
pub mod poller;

pub use access::{
    AccessAttempt, AccessLogStore, DoorCommand, FaceAuthenticator, FaceObservation,
    NotificationSink, PinValidator, UnlockMethod, UserValidator, PIN_IDENTITY,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use handler::{DoorLockHandler, DoorStatus};
pub use lock_state::{FaceUnlock, LockMode, LockState, PinUnlock};
pub use poller::{AuthPoller, CancellationToken, PollEvent, PollerHandle};
