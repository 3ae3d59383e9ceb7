use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::PrivateKey;
use crate::protocol::{CredentialId, RpHash, CREDENTIAL_ID_SIZE, PRIVATE_KEY_SIZE, RP_HASH_SIZE};

/// Encoded size of one slot: occupied flag, hash, id, key
pub const RECORD_LEN: usize = 1 + RP_HASH_SIZE + CREDENTIAL_ID_SIZE + PRIVATE_KEY_SIZE;

/// Slot image of a wiped slot; decodes as unoccupied
pub const VACANT_IMAGE: [u8; RECORD_LEN] = [0; RECORD_LEN];

/// One persisted credential slot
///
/// Postcard writes fixed-size arrays without length prefixes, so every
/// record encodes to exactly [`RECORD_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub occupied: bool,
    pub rp_hash: RpHash,
    pub credential_id: CredentialId,
    pub private_key: PrivateKey,
}

impl SlotRecord {
    pub fn new(rp_hash: RpHash, credential_id: CredentialId, private_key: PrivateKey) -> Self {
        Self {
            occupied: true,
            rp_hash,
            credential_id,
            private_key,
        }
    }

    pub fn encode(&self) -> Option<Zeroizing<[u8; RECORD_LEN]>> {
        let mut image = Zeroizing::new([0u8; RECORD_LEN]);
        let used = postcard::to_slice(self, &mut image[..]).ok()?.len();
        (used == RECORD_LEN).then_some(image)
    }

    /// `None` for images that are not a valid record (torn or foreign data)
    pub fn decode(image: &[u8; RECORD_LEN]) -> Option<Self> {
        postcard::from_bytes(image).ok()
    }
}
