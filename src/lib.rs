// Core modules
pub mod core;
pub mod storage;
pub mod service;
pub mod notify;
pub mod cli;
pub mod common;

// Re-export commonly used types
pub use crate::common::{Config, DevMode, DoorError, Result};
pub use crate::core::{
    AccessAttempt, AccessLogStore, DoorCommand, DoorLockHandler, DoorStatus, FaceAuthenticator,
    FaceObservation, LockMode, LockState, NotificationSink, PinValidator, UnlockMethod,
    UserValidator,
};
pub use crate::storage::{JsonlAccessLog, PinStore, UserStore};
pub use crate::service::FaceServiceClient;
pub use crate::notify::{LogNotifier, MqttNotifier};
