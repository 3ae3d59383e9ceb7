//! Credential key material and the signing-curve capability
//!
//! Curve arithmetic is not implemented here. The board supplies a [`Curve`]
//! (micro-ecc secp160r1 on the device) and the core only moves fixed-size
//! byte strings through it:
//! - a keypair is generated from the entropy source when a credential is made
//! - the private key goes straight to the credential store
//! - signing borrows the stored key for the duration of one assertion

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::protocol::{Challenge, PublicKey, Signature, PRIVATE_KEY_SIZE};

/// Private scalar, wiped when dropped
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; PRIVATE_KEY_SIZE]);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.0
    }
}

// Never print key material
impl core::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Freshly generated credential keypair
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

/// Elliptic-curve capability with fixed key and signature sizes
///
/// Both operations draw their randomness from the caller-supplied `rng`,
/// which is the token's entropy source.
pub trait Curve {
    fn generate_keypair(&mut self, rng: &mut dyn CryptoRngCore) -> Result<KeyPair, CryptoError>;

    fn sign(
        &mut self,
        private_key: &PrivateKey,
        message: &Challenge,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Signature, CryptoError>;
}
