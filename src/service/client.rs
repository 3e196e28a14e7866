use crate::common::config::FaceServiceConfig;
use crate::common::{DoorError, Result};
use crate::core::access::{FaceAuthenticator, FaceObservation, UserValidator};
use crate::service::protocol::{
    read_frame, verify_identity, write_frame, IdentifyRequest, Request, Response, CHALLENGE_LEN,
};
use image::DynamicImage;
use rand::{thread_rng, Rng};
use std::fs;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Identity reported when the service's signature does not check out.
pub const UNVERIFIED_IDENTITY: &str = "Unverified";

/// Talks to the camera/recognition service over its Unix socket.
///
/// One short-lived connection per request, with read and write timeouts,
/// so a stalled service never holds the polling loop past its stop deadline.
pub struct FaceServiceClient {
    socket_path: PathBuf,
    timeout: Duration,
    secret: Option<Vec<u8>>,
    users: Option<Arc<dyn UserValidator>>,
    reachable: bool,
}

impl FaceServiceClient {
    pub fn new(config: &FaceServiceConfig) -> Result<Self> {
        let secret = match &config.shared_secret_file {
            Some(path) => {
                let secret = fs::read(path).map_err(|e| DoorError::Config(format!(
                    "Failed to read face service secret {}: {}", path.display(), e
                )))?;
                if secret.is_empty() {
                    return Err(DoorError::Config(format!(
                        "Face service secret {} is empty",
                        path.display()
                    )));
                }
                Some(secret)
            }
            None => {
                tracing::warn!(
                    "No face service secret configured - identity responses are not verified"
                );
                None
            }
        };

        Ok(Self::with_secret(config.socket_path.clone(), config.timeout(), secret))
    }

    pub fn with_secret(socket_path: PathBuf, timeout: Duration, secret: Option<Vec<u8>>) -> Self {
        Self { socket_path, timeout, secret, users: None, reachable: true }
    }

    /// Restricts authorization to listed identities. A face the service
    /// recognizes but the list does not name is reported as unauthorized.
    pub fn with_authorized_users(mut self, users: Arc<dyn UserValidator>) -> Self {
        if users.is_empty() {
            tracing::warn!("No authorized users loaded - face unlock will always fail");
        }
        self.users = Some(users);
        self
    }

    fn is_listed(&self, identity: &str) -> bool {
        match &self.users {
            Some(users) if !users.is_authorized_user(identity) => {
                tracing::debug!("Recognized '{}' is not an authorized user", identity);
                false
            }
            _ => true,
        }
    }

    fn connect(&self) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.socket_path).map_err(|e| DoorError::Service(format!(
            "Failed to connect to {}: {}", self.socket_path.display(), e
        )))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    fn exchange(&mut self, request: &Request) -> Result<Response> {
        let result = self.connect().and_then(|mut stream| {
            write_frame(&mut stream, request)?;
            read_frame::<_, Response>(&mut stream)
        });

        match &result {
            Ok(_) if !self.reachable => {
                tracing::info!("Face service reachable again");
                self.reachable = true;
            }
            Err(e) if self.reachable => {
                tracing::warn!("Face service unavailable: {}", e);
                self.reachable = false;
            }
            Err(e) => tracing::debug!("Face service still unavailable: {}", e),
            Ok(_) => {}
        }
        result
    }
}

impl FaceAuthenticator for FaceServiceClient {
    fn check_authentication(&mut self) -> Result<Option<FaceObservation>> {
        let mut challenge = vec![0u8; CHALLENGE_LEN];
        thread_rng().fill(&mut challenge[..]);

        let request = Request::Identify(IdentifyRequest {
            challenge: challenge.clone(),
            timestamp: SystemTime::now(),
        });

        match self.exchange(&request)? {
            Response::Identity(identity) => {
                if !identity.face_present {
                    return Ok(None);
                }
                if let Some(secret) = &self.secret {
                    if !verify_identity(secret, &challenge, &identity)? {
                        tracing::warn!(
                            "Face service signature mismatch for '{}'",
                            identity.identity
                        );
                        return Ok(Some(FaceObservation::new(UNVERIFIED_IDENTITY, false)));
                    }
                }
                let authorized = identity.authorized && self.is_listed(&identity.identity);
                Ok(Some(FaceObservation::new(identity.identity, authorized)))
            }
            Response::Error(msg) => Err(DoorError::Service(msg)),
            _ => Err(DoorError::Protocol("Unexpected response type".into())),
        }
    }

    fn capture_evidence(&mut self) -> Result<Option<DynamicImage>> {
        match self.exchange(&Request::Snapshot)? {
            Response::Snapshot(snapshot) if snapshot.jpeg.is_empty() => Ok(None),
            Response::Snapshot(snapshot) => Ok(Some(image::load_from_memory(&snapshot.jpeg)?)),
            Response::Error(msg) => Err(DoorError::Service(msg)),
            _ => Err(DoorError::Protocol("Unexpected response type".into())),
        }
    }
}
