//! Credential store
//!
//! A fixed table of [`STORE_CAPACITY`] slots in non-volatile memory, keyed
//! by relying-party hash. Saving is an upsert: a relying party that already
//! has a slot gets it overwritten (key rotation), otherwise the first vacant
//! slot is taken. A full table refuses new relying parties until reset.
//!
//! Each slot is written as one image, so a torn write can only damage the
//! slot being written. A slot holding an undecodable image is free to be
//! overwritten. A slot the medium fails to read is never written: it may
//! still hold a good credential.

mod record;

pub use record::{SlotRecord, RECORD_LEN, VACANT_IMAGE};

use log::{info, warn};

use crate::config::STORE_CAPACITY;
use crate::consent::PresenceProof;
use crate::crypto::PrivateKey;
use crate::error::{MediumError, StoreError};
use crate::protocol::{CredentialId, ListedCredential, RpHash};

/// Slot-addressed non-volatile storage
pub trait NvMedium {
    /// Number of addressable slots
    fn slots(&self) -> usize;

    /// Read a slot image; a slot never written reads as [`VACANT_IMAGE`]
    fn read(&self, slot: usize, image: &mut [u8; RECORD_LEN]) -> Result<(), MediumError>;

    /// Replace a slot image as one unit
    fn write(&mut self, slot: usize, image: &[u8; RECORD_LEN]) -> Result<(), MediumError>;
}

/// RAM-backed medium for host builds and tests
#[derive(Debug, Clone)]
pub struct MemoryMedium {
    slots: [[u8; RECORD_LEN]; STORE_CAPACITY],
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self {
            slots: [VACANT_IMAGE; STORE_CAPACITY],
        }
    }
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl NvMedium for MemoryMedium {
    fn slots(&self) -> usize {
        STORE_CAPACITY
    }

    fn read(&self, slot: usize, image: &mut [u8; RECORD_LEN]) -> Result<(), MediumError> {
        let stored = self.slots.get(slot).ok_or(MediumError::OutOfRange(slot))?;
        image.copy_from_slice(stored);
        Ok(())
    }

    fn write(&mut self, slot: usize, image: &[u8; RECORD_LEN]) -> Result<(), MediumError> {
        let stored = self
            .slots
            .get_mut(slot)
            .ok_or(MediumError::OutOfRange(slot))?;
        stored.copy_from_slice(image);
        Ok(())
    }
}

/// Key material returned by a lookup
#[derive(Debug)]
pub struct StoredCredential {
    pub credential_id: CredentialId,
    pub private_key: PrivateKey,
}

/// What a slot turned out to hold
enum Slot {
    Occupied(SlotRecord),
    Vacant,
    Unreadable(MediumError),
}

impl Slot {
    fn occupied(self) -> Option<SlotRecord> {
        match self {
            Slot::Occupied(record) => Some(record),
            Slot::Vacant | Slot::Unreadable(_) => None,
        }
    }
}

pub struct CredentialStore<M> {
    medium: M,
}

impl<M: NvMedium> CredentialStore<M> {
    pub fn new(medium: M) -> Self {
        Self { medium }
    }

    pub fn capacity(&self) -> usize {
        self.medium.slots().min(STORE_CAPACITY)
    }

    fn load(&self, slot: usize) -> Slot {
        let mut image = zeroize::Zeroizing::new(VACANT_IMAGE);
        if let Err(e) = self.medium.read(slot, &mut image) {
            warn!("Slot {} unreadable: {}", slot, e);
            return Slot::Unreadable(e);
        }
        match SlotRecord::decode(&image) {
            Some(record) if record.occupied => Slot::Occupied(record),
            Some(_) => Slot::Vacant,
            None => {
                warn!("Slot {} holds an invalid record, treating as vacant", slot);
                Slot::Vacant
            }
        }
    }

    /// Store a credential for `rp_hash`, replacing any existing one
    ///
    /// Returns the slot written. Fails with [`StoreError::Full`] when the
    /// relying party is new and no slot is vacant; nothing is written then.
    ///
    /// An unreadable slot is never picked as a target. If the relying party
    /// was not found elsewhere, it may be the one hiding in that slot, so
    /// the save fails with the read error rather than risk a second record.
    pub fn save(
        &mut self,
        rp_hash: &RpHash,
        credential_id: &CredentialId,
        private_key: &PrivateKey,
        _proof: &PresenceProof,
    ) -> Result<usize, StoreError> {
        let mut vacant = None;
        let mut existing = None;
        let mut unreadable = None;

        for slot in 0..self.capacity() {
            match self.load(slot) {
                Slot::Occupied(record) if record.rp_hash == *rp_hash => {
                    existing = Some(slot);
                    break;
                }
                Slot::Occupied(_) => {}
                Slot::Vacant => {
                    vacant.get_or_insert(slot);
                }
                Slot::Unreadable(e) => {
                    unreadable.get_or_insert(e);
                }
            }
        }

        let target = match (existing, unreadable) {
            (Some(slot), _) => slot,
            (None, Some(e)) => return Err(e.into()),
            (None, None) => vacant.ok_or(StoreError::Full)?,
        };

        let record = SlotRecord::new(*rp_hash, *credential_id, private_key.clone());
        let image = record.encode().ok_or(MediumError::Write(target))?;
        self.medium.write(target, &image)?;

        if existing.is_some() {
            info!("Rotated credential in slot {}", target);
        } else {
            info!("Stored credential in slot {}", target);
        }
        Ok(target)
    }

    /// First occupied slot whose hash matches byte-for-byte
    pub fn find_by_rp_hash(&self, rp_hash: &RpHash) -> Option<StoredCredential> {
        (0..self.capacity())
            .filter_map(|slot| self.load(slot).occupied())
            .find(|record| record.rp_hash == *rp_hash)
            .map(|record| StoredCredential {
                credential_id: record.credential_id,
                private_key: record.private_key,
            })
    }

    /// Occupied slots in physical slot order
    pub fn iter(&self) -> impl Iterator<Item = ListedCredential> + '_ {
        (0..self.capacity())
            .filter_map(|slot| self.load(slot).occupied())
            .map(|record| ListedCredential {
                credential_id: record.credential_id,
                rp_hash: record.rp_hash,
            })
    }

    /// One consistent pass over the table, for counting and streaming
    pub fn snapshot(&self) -> heapless::Vec<ListedCredential, STORE_CAPACITY> {
        // capacity() never exceeds STORE_CAPACITY, so nothing is dropped
        self.iter().take(STORE_CAPACITY).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Wipe every slot
    ///
    /// All slots are attempted even if one fails; the first failure is
    /// returned.
    pub fn reset(&mut self, _proof: &PresenceProof) -> Result<(), StoreError> {
        let mut first_err = None;
        for slot in 0..self.capacity() {
            if let Err(e) = self.medium.write(slot, &VACANT_IMAGE) {
                warn!("Failed to wipe slot {}: {}", slot, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => {
                info!("Credential store wiped");
                Ok(())
            }
        }
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }
}
