//! Wire protocol
//!
//! Half-duplex request/response over a raw byte stream:
//!
//! ```text
//! request  = [cmd:1][params: fixed per command]
//! response = [status:1][payload: fixed per command, empty on error]
//! ```
//!
//! There are no length prefixes; every field has a protocol-defined size.

use crate::platform::Transport;

/// Relying-party (application identity) hash, pre-hashed by the host
pub const RP_HASH_SIZE: usize = 20;
/// Opaque credential handle returned on creation
pub const CREDENTIAL_ID_SIZE: usize = 16;
/// Uncompressed secp160r1 public key (x || y)
pub const PUBLIC_KEY_SIZE: usize = 40;
/// secp160r1 private scalar
pub const PRIVATE_KEY_SIZE: usize = 21;
/// Raw signature (r || s)
pub const SIGNATURE_SIZE: usize = 40;
/// Challenge / client-data hash signed by GetAssertion
pub const CHALLENGE_SIZE: usize = 20;

pub type RpHash = [u8; RP_HASH_SIZE];
pub type CredentialId = [u8; CREDENTIAL_ID_SIZE];
pub type PublicKey = [u8; PUBLIC_KEY_SIZE];
pub type Signature = [u8; SIGNATURE_SIZE];
pub type Challenge = [u8; CHALLENGE_SIZE];

/// Request command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    ListCredentials = 0x00,
    MakeCredential = 0x01,
    GetAssertion = 0x02,
    Reset = 0x03,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(Command::ListCredentials),
            0x01 => Ok(Command::MakeCredential),
            0x02 => Ok(Command::GetAssertion),
            0x03 => Ok(Command::Reset),
            other => Err(other),
        }
    }
}

/// Response status byte (stable across implementations)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    UnknownCommand = 0x01,
    CryptoFailed = 0x02,
    BadParameter = 0x03,
    NotFound = 0x04,
    StorageFull = 0x05,
    ApprovalDenied = 0x06,
}

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        status as u8
    }
}

/// One entry streamed by ListCredentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListedCredential {
    pub credential_id: CredentialId,
    pub rp_hash: RpHash,
}

/// Successful command payloads
///
/// Handlers build a complete `Reply` before anything touches the wire, so an
/// error can never follow a partially written success payload.
#[derive(Debug)]
pub enum Reply {
    Created {
        credential_id: CredentialId,
        public_key: PublicKey,
    },
    Asserted {
        credential_id: CredentialId,
        signature: Signature,
    },
    Listing(heapless::Vec<ListedCredential, { crate::config::STORE_CAPACITY }>),
    Reset,
}

impl Reply {
    /// Write the payload that follows the `Ok` status byte
    pub fn write_payload<T: Transport + ?Sized>(&self, transport: &mut T) {
        match self {
            Reply::Created {
                credential_id,
                public_key,
            } => {
                transport.write_all(credential_id);
                transport.write_all(public_key);
            }
            Reply::Asserted {
                credential_id,
                signature,
            } => {
                transport.write_all(credential_id);
                transport.write_all(signature);
            }
            Reply::Listing(entries) => {
                // Count and stream come from the same snapshot
                transport.write_byte(entries.len() as u8);
                for entry in entries {
                    transport.write_all(&entry.credential_id);
                    transport.write_all(&entry.rp_hash);
                }
            }
            Reply::Reset => {}
        }
    }

    /// Payload length in bytes (excluding the status byte)
    pub fn payload_len(&self) -> usize {
        match self {
            Reply::Created { .. } => CREDENTIAL_ID_SIZE + PUBLIC_KEY_SIZE,
            Reply::Asserted { .. } => CREDENTIAL_ID_SIZE + SIGNATURE_SIZE,
            Reply::Listing(entries) => 1 + entries.len() * (CREDENTIAL_ID_SIZE + RP_HASH_SIZE),
            Reply::Reset => 0,
        }
    }
}
