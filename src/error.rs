use crate::protocol::Status;

/// Terminal failure of one command; each maps to exactly one status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command byte {0:#04x}")]
    UnknownCommand(u8),
    #[error("parameters not received before timeout")]
    BadParameter,
    #[error("user presence not confirmed")]
    ApprovalDenied,
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("no credential for relying party")]
    NotFound,
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl CommandError {
    pub fn status(&self) -> Status {
        match self {
            CommandError::UnknownCommand(_) => Status::UnknownCommand,
            CommandError::BadParameter => Status::BadParameter,
            CommandError::ApprovalDenied => Status::ApprovalDenied,
            CommandError::Crypto(_) => Status::CryptoFailed,
            CommandError::NotFound => Status::NotFound,
            // A medium that refuses the write is as good as full to the host
            CommandError::Store(_) => Status::StorageFull,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no free slot")]
    Full,
    #[error("medium: {0}")]
    Medium(#[from] MediumError),
}

/// Non-volatile medium failure for a single slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MediumError {
    #[error("slot {0} out of range")]
    OutOfRange(usize),
    #[error("read failed on slot {0}")]
    Read(usize),
    #[error("write failed on slot {0}")]
    Write(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("key generation failed")]
    KeyGeneration,
    #[error("signing failed")]
    Signing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EntropyError {
    #[error("noise source stuck at {0:#04x}")]
    Stuck(u8),
}
