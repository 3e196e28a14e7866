use serde::{Serialize, Deserialize};
use std::io::{Read, Write};
use std::time::SystemTime;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use crate::common::{DoorError, Result};

// Request types
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Request {
    Identify(IdentifyRequest),
    Snapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IdentifyRequest {
    pub challenge: Vec<u8>,
    pub timestamp: SystemTime,
}

// Response types
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Response {
    Identity(IdentityResponse),
    Snapshot(SnapshotResponse),
    Error(String),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IdentityResponse {
    pub face_present: bool,
    pub identity: String,
    pub authorized: bool,
    pub signature: Vec<u8>,
    pub timestamp: SystemTime,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SnapshotResponse {
    pub jpeg: Vec<u8>,  // empty when the camera has no frame
}

pub const CHALLENGE_LEN: usize = 32;
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

fn identity_mac(
    secret: &[u8],
    challenge: &[u8],
    identity: &str,
    authorized: bool,
) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| DoorError::Protocol(format!("Invalid shared secret: {}", e)))?;
    mac.update(challenge);
    mac.update(identity.as_bytes());
    mac.update(&[authorized as u8]);
    Ok(mac)
}

/// HMAC-SHA256 over challenge, identity and the authorized flag.
pub fn sign_identity(
    secret: &[u8],
    challenge: &[u8],
    identity: &str,
    authorized: bool,
) -> Result<Vec<u8>> {
    Ok(identity_mac(secret, challenge, identity, authorized)?.finalize().into_bytes().to_vec())
}

pub fn verify_identity(
    secret: &[u8],
    challenge: &[u8],
    response: &IdentityResponse,
) -> Result<bool> {
    let mac = identity_mac(secret, challenge, &response.identity, response.authorized)?;
    Ok(mac.verify_slice(&response.signature).is_ok())
}

/// Writes a u32 little-endian length prefix followed by the bincode body.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let data = bincode::serialize(message)
        .map_err(|e| DoorError::Protocol(format!("Failed to serialize message: {}", e)))?;
    if data.len() > MAX_FRAME_LEN {
        return Err(DoorError::Protocol("Message too large".into()));
    }
    let len = (data.len() as u32).to_le_bytes();

    writer.write_all(&len)?;
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(DoorError::Protocol("Message too large".into()));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    bincode::deserialize(&buf)
        .map_err(|e| DoorError::Protocol(format!("Failed to deserialize message: {}", e)))
}

// Socket path used by the face service unless configured otherwise
pub const SOCKET_PATH: &str = "/run/doorsup/face.sock";

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn identity(name: &str, authorized: bool, signature: Vec<u8>) -> IdentityResponse {
        IdentityResponse {
            face_present: true,
            identity: name.to_string(),
            authorized,
            signature,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn test_signature_binds_identity_and_verdict() {
        let secret = b"front-door-secret";
        let challenge = [7u8; CHALLENGE_LEN];
        let sig = sign_identity(secret, &challenge, "alice", true).unwrap();

        let verify = |challenge: &[u8], response: IdentityResponse| {
            verify_identity(secret, challenge, &response).unwrap()
        };

        assert!(verify(&challenge[..], identity("alice", true, sig.clone())));
        assert!(!verify(&challenge[..], identity("alice", false, sig.clone())));
        assert!(!verify(&challenge[..], identity("mallory", true, sig.clone())));
        assert!(!verify(&[0u8; CHALLENGE_LEN][..], identity("alice", true, sig)));
    }

    #[test]
    fn test_frame_rejects_oversized_length() {
        let mut bytes = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        let result: Result<Response> = read_frame(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(DoorError::Protocol(_))));
    }

    #[test]
    fn test_truncated_frame_is_io_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::Snapshot).unwrap();
        buf.truncate(buf.len() - 1);
        let result: Result<Request> = read_frame(&mut Cursor::new(buf));
        assert!(matches!(result, Err(DoorError::Io(_))));
    }
}
