//! Types exchanged between the door lock handler and the services around it.

use chrono::{DateTime, Local};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::common::Result;

/// Identity recorded for PIN unlocks, where nobody is recognised.
pub const PIN_IDENTITY: &str = "UNKNOWN";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockMethod {
    #[serde(rename = "face")]
    Face,
    #[serde(rename = "PIN")]
    Pin,
}

impl UnlockMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnlockMethod::Face => "face",
            UnlockMethod::Pin => "PIN",
        }
    }
}

impl fmt::Display for UnlockMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical state pushed to the notification channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DoorCommand {
    Lock,
    Unlock,
}

impl DoorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorCommand::Lock => "lock",
            DoorCommand::Unlock => "unlock",
        }
    }
}

impl fmt::Display for DoorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One access decision, handed straight to the access log.
#[derive(Debug, Clone)]
pub struct AccessAttempt {
    pub identity: String,
    pub authorized: bool,
    pub method: UnlockMethod,
    pub timestamp: DateTime<Local>,
    /// Only set for unauthorized face attempts
    pub evidence: Option<DynamicImage>,
}

impl AccessAttempt {
    pub fn face(identity: &str, authorized: bool, evidence: Option<DynamicImage>) -> Self {
        Self {
            identity: identity.to_string(),
            authorized,
            method: UnlockMethod::Face,
            timestamp: Local::now(),
            evidence: if authorized { None } else { evidence },
        }
    }

    pub fn pin(authorized: bool) -> Self {
        Self {
            identity: PIN_IDENTITY.to_string(),
            authorized,
            method: UnlockMethod::Pin,
            timestamp: Local::now(),
            evidence: None,
        }
    }
}

/// A face seen by the recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceObservation {
    pub identity: String,
    pub authorized: bool,
}

impl FaceObservation {
    pub fn new(identity: impl Into<String>, authorized: bool) -> Self {
        Self { identity: identity.into(), authorized }
    }
}

pub trait FaceAuthenticator: Send {
    /// `Ok(None)` when no face is in view. An error means the frame could
    /// not be acquired this cycle.
    fn check_authentication(&mut self) -> Result<Option<FaceObservation>>;

    /// Most recent frame, attached as evidence to unauthorized attempts.
    fn capture_evidence(&mut self) -> Result<Option<DynamicImage>>;
}

pub trait PinValidator: Send + Sync {
    fn is_valid_pin(&self, pin: &str) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identities allowed to open the door by face.
pub trait UserValidator: Send + Sync {
    fn is_authorized_user(&self, identity: &str) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait NotificationSink: Send + Sync {
    fn publish_door_state(&self, state: DoorCommand) -> Result<()>;
    fn publish_unauthorized_alert(&self, identity: &str) -> Result<()>;
}

pub trait AccessLogStore: Send + Sync {
    fn log_access(&self, attempt: &AccessAttempt) -> Result<()>;
}
