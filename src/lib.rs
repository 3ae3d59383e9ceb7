//! fernkey - button-gated security token over a serial link
//!
//! The device side of a register/authenticate protocol:
//! 1. MakeCredential creates a per-relying-party keypair, stores the
//!    private key and returns a credential id plus the public key
//! 2. GetAssertion signs a host challenge with the stored key
//! 3. ListCredentials enumerates stored credentials
//! 4. Reset wipes the store
//!
//! Every operation that creates, uses or wipes a key waits for a physical
//! button press first. Hardware access goes through the traits in
//! [`platform`], so the whole protocol runs on the host under test.

pub mod config;
pub mod consent;
pub mod crypto;
pub mod dispatcher;
pub mod entropy;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod store;

pub use config::Config;
pub use consent::{ConsentGate, PresenceProof};
pub use crypto::{Curve, KeyPair, PrivateKey};
pub use dispatcher::Dispatcher;
pub use entropy::{EntropyMethod, EntropySource};
pub use error::{CommandError, CryptoError, EntropyError, MediumError, StoreError};
pub use protocol::{Command, Status};
pub use store::{CredentialStore, MemoryMedium, NvMedium};
