//! Command dispatcher
//!
//! Reads one command byte, receives that command's fixed-size parameters
//! (each field under an idle timeout), runs the handler and writes exactly
//! one response: a status byte, then the payload on success only.
//!
//! Handler preconditions are checked in a fixed order so that a refused or
//! timed-out consent never leaves a side effect:
//!
//! | Command         | Checks, in order                                  |
//! |-----------------|---------------------------------------------------|
//! | MakeCredential  | params, consent, key generation, free slot        |
//! | GetAssertion    | params, stored credential, consent, signing       |
//! | ListCredentials | none                                              |
//! | Reset           | consent                                           |

use log::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::Config;
use crate::consent::ConsentGate;
use crate::crypto::Curve;
use crate::entropy::EntropySource;
use crate::error::CommandError;
use crate::platform::{Board, Clock, NoiseSource, Transport};
use crate::protocol::{Challenge, Command, CredentialId, Reply, RpHash, Status, CREDENTIAL_ID_SIZE};
use crate::store::{CredentialStore, NvMedium};

/// Scratch state for one command, wiped when the command completes
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    pub rp_hash: RpHash,
    pub challenge: Challenge,
}

/// Receive exactly `buf.len()` bytes
///
/// The timeout restarts whenever a byte arrives, so it bounds the idle gap
/// rather than the whole field.
pub fn read_field<B>(board: &mut B, buf: &mut [u8], timeout_ms: u32) -> Result<(), CommandError>
where
    B: Transport + Clock + ?Sized,
{
    let mut received = 0;
    let mut start_ms = board.elapsed_ms();

    while received < buf.len() {
        let now = board.elapsed_ms();
        if now.wrapping_sub(start_ms) >= timeout_ms {
            debug!("Parameter timeout after {} of {} bytes", received, buf.len());
            return Err(CommandError::BadParameter);
        }

        match board.try_read_byte() {
            Some(byte) => {
                buf[received] = byte;
                received += 1;
                start_ms = now;
            }
            None => board.sleep_until_event(),
        }
    }
    Ok(())
}

pub struct Dispatcher<B, A, J, C, M> {
    board: B,
    entropy: EntropySource<A, J>,
    curve: C,
    store: CredentialStore<M>,
    consent: ConsentGate,
    param_timeout_ms: u32,
}

impl<B, A, J, C, M> Dispatcher<B, A, J, C, M>
where
    B: Board,
    A: NoiseSource,
    J: NoiseSource,
    C: Curve,
    M: NvMedium,
{
    pub fn new(
        config: &Config,
        board: B,
        entropy: EntropySource<A, J>,
        curve: C,
        store: CredentialStore<M>,
    ) -> Self {
        Self {
            board,
            entropy,
            curve,
            store,
            consent: ConsentGate::new(config.consent),
            param_timeout_ms: config.param_timeout_ms,
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn store(&self) -> &CredentialStore<M> {
        &self.store
    }

    /// Serve commands forever
    pub fn run(&mut self) -> ! {
        info!("Waiting for commands");
        loop {
            if self.poll().is_none() {
                self.board.sleep_until_event();
            }
        }
    }

    /// Handle one command if a command byte is waiting
    pub fn poll(&mut self) -> Option<Status> {
        let byte = self.board.try_read_byte()?;
        Some(self.process(byte))
    }

    /// Handle the command introduced by `byte` and send its response
    pub fn process(&mut self, byte: u8) -> Status {
        let mut session = Session::default();

        let outcome = match Command::try_from(byte) {
            Ok(command) => {
                debug!("Command {:?}", command);
                self.receive_params(command, &mut session)
                    .and_then(|()| self.execute(command, &session))
            }
            Err(unknown) => Err(CommandError::UnknownCommand(unknown)),
        };

        match outcome {
            Ok(reply) => {
                self.board.write_byte(Status::Ok.into());
                reply.write_payload(&mut self.board);
                debug!("Sent OK with {} payload bytes", reply.payload_len());
                Status::Ok
            }
            Err(e) => {
                let status = e.status();
                warn!("Command {:#04x} failed: {}", byte, e);
                self.board.write_byte(status.into());
                status
            }
        }
    }

    fn receive_params(&mut self, command: Command, session: &mut Session) -> Result<(), CommandError> {
        let timeout = self.param_timeout_ms;
        match command {
            Command::MakeCredential => read_field(&mut self.board, &mut session.rp_hash, timeout),
            Command::GetAssertion => {
                read_field(&mut self.board, &mut session.rp_hash, timeout)?;
                read_field(&mut self.board, &mut session.challenge, timeout)
            }
            Command::ListCredentials | Command::Reset => Ok(()),
        }
    }

    fn execute(&mut self, command: Command, session: &Session) -> Result<Reply, CommandError> {
        match command {
            Command::MakeCredential => self.make_credential(session),
            Command::GetAssertion => self.get_assertion(session),
            Command::ListCredentials => Ok(self.list_credentials()),
            Command::Reset => self.reset(),
        }
    }

    fn make_credential(&mut self, session: &Session) -> Result<Reply, CommandError> {
        let proof = self.consent.wait(&mut self.board)?;

        let keypair = self.curve.generate_keypair(&mut self.entropy)?;

        let mut credential_id: CredentialId = [0; CREDENTIAL_ID_SIZE];
        self.entropy.generate(&mut credential_id);

        self.store
            .save(&session.rp_hash, &credential_id, &keypair.private, &proof)?;

        Ok(Reply::Created {
            credential_id,
            public_key: keypair.public,
        })
    }

    fn get_assertion(&mut self, session: &Session) -> Result<Reply, CommandError> {
        // No point asking the user about a relying party we have no key for
        let stored = self
            .store
            .find_by_rp_hash(&session.rp_hash)
            .ok_or(CommandError::NotFound)?;

        self.consent.wait(&mut self.board)?;

        let signature = self
            .curve
            .sign(&stored.private_key, &session.challenge, &mut self.entropy)?;

        Ok(Reply::Asserted {
            credential_id: stored.credential_id,
            signature,
        })
    }

    fn list_credentials(&mut self) -> Reply {
        let entries = self.store.snapshot();
        info!("Listing {} credential(s)", entries.len());
        Reply::Listing(entries)
    }

    /// Wipe the store after consent
    ///
    /// Besides a refused consent, a medium that fails to wipe a slot makes
    /// Reset fail too. That is reported as `StorageFull`, the only status
    /// the protocol has for storage faults. Healthy slots are still wiped.
    fn reset(&mut self) -> Result<Reply, CommandError> {
        let proof = self.consent.wait(&mut self.board)?;
        self.store.reset(&proof)?;
        Ok(Reply::Reset)
    }
}
