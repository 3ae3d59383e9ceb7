#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use fernkey::config::Config;
use fernkey::error::{CryptoError, MediumError};
use fernkey::platform::{Clock, NoiseSource, Transport, UserInterface};
use fernkey::protocol::{
    Challenge, PublicKey, Signature, CHALLENGE_SIZE, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE,
    SIGNATURE_SIZE,
};
use fernkey::store::RECORD_LEN;
use fernkey::{
    CredentialStore, Curve, Dispatcher, EntropySource, KeyPair, MemoryMedium, NvMedium, PrivateKey,
};
use rand_core::CryptoRngCore;

/// How the simulated user treats the consent button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum User {
    /// Holds the button down the whole time
    Approves,
    /// Never touches it
    Ignores,
    /// Presses only during the scripted windows
    Scripted,
}

/// Board with a simulated millisecond clock: every sleep advances 1 ms
pub struct SimBoard {
    pub now: u32,
    pub input: VecDeque<u8>,
    /// Bytes that become readable once the clock reaches their time
    pub arrivals: VecDeque<(u32, u8)>,
    pub output: Vec<u8>,
    pub user: User,
    pub presses: Vec<(u32, u32)>,
    pub indicator: Vec<(u32, u8)>,
    pub button_polls: usize,
}

impl SimBoard {
    pub fn new(user: User) -> Self {
        Self {
            now: 0,
            input: VecDeque::new(),
            arrivals: VecDeque::new(),
            output: Vec::new(),
            user,
            presses: Vec::new(),
            indicator: Vec::new(),
            button_polls: 0,
        }
    }

    /// Deliver `bytes` one at a time, the first at `start` and then every
    /// `gap` ms
    pub fn trickle(&mut self, start: u32, gap: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.arrivals.push_back((start + gap * i as u32, b));
        }
    }

    /// Hold the button for `duration` ms, starting `delay` ms from now
    pub fn press_after(&mut self, delay: u32, duration: u32) {
        let start = self.now + delay;
        self.presses.push((start, start + duration));
    }
}

impl Transport for SimBoard {
    fn try_read_byte(&mut self) -> Option<u8> {
        if let Some(byte) = self.input.pop_front() {
            return Some(byte);
        }
        match self.arrivals.front() {
            Some(&(at, byte)) if at <= self.now => {
                self.arrivals.pop_front();
                Some(byte)
            }
            _ => None,
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.output.push(byte);
    }
}

impl Clock for SimBoard {
    fn elapsed_ms(&self) -> u32 {
        self.now
    }

    fn sleep_until_event(&mut self) {
        self.now = self.now.wrapping_add(1);
    }
}

impl UserInterface for SimBoard {
    fn button_pressed(&mut self) -> bool {
        self.button_polls += 1;
        match self.user {
            User::Approves => true,
            User::Ignores => false,
            User::Scripted => self
                .presses
                .iter()
                .any(|&(start, end)| self.now >= start && self.now < end),
        }
    }

    fn set_indicator(&mut self, intensity: u8) {
        self.indicator.push((self.now, intensity));
    }
}

/// Deterministic LCG noise
pub struct SimNoise(pub u32);

impl NoiseSource for SimNoise {
    fn try_sample(&mut self) -> Option<u8> {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        Some((self.0 >> 24) as u8)
    }
}

#[derive(Debug, Default)]
pub struct CurveStats {
    pub keygens: Cell<usize>,
    pub signs: Cell<usize>,
    pub fail_keygen: Cell<bool>,
    pub fail_sign: Cell<bool>,
}

/// Stand-in curve whose keys and signatures can be checked by the tests
///
/// public = private stretched and masked; signature = (k, k ^ msg ^ private)
pub struct FakeCurve {
    pub stats: Rc<CurveStats>,
}

fn mask(i: usize) -> u8 {
    (i as u8).wrapping_mul(31) ^ 0xa5
}

impl FakeCurve {
    pub fn private_from_public(public: &PublicKey) -> [u8; PRIVATE_KEY_SIZE] {
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        for (i, b) in private.iter_mut().enumerate() {
            *b = public[i] ^ mask(i);
        }
        private
    }

    pub fn verify(public: &PublicKey, message: &Challenge, signature: &Signature) -> bool {
        let private = Self::private_from_public(public);
        (0..CHALLENGE_SIZE).all(|i| {
            signature[CHALLENGE_SIZE + i] == signature[i] ^ message[i] ^ private[i]
        })
    }
}

impl Curve for FakeCurve {
    fn generate_keypair(&mut self, rng: &mut dyn CryptoRngCore) -> Result<KeyPair, CryptoError> {
        self.stats.keygens.set(self.stats.keygens.get() + 1);
        if self.stats.fail_keygen.get() {
            return Err(CryptoError::KeyGeneration);
        }
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        rng.fill_bytes(&mut private);
        let mut public = [0u8; PUBLIC_KEY_SIZE];
        for (i, b) in public.iter_mut().enumerate() {
            *b = private[i % PRIVATE_KEY_SIZE] ^ mask(i);
        }
        Ok(KeyPair {
            public,
            private: PrivateKey::from_bytes(private),
        })
    }

    fn sign(
        &mut self,
        private_key: &PrivateKey,
        message: &Challenge,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Signature, CryptoError> {
        self.stats.signs.set(self.stats.signs.get() + 1);
        if self.stats.fail_sign.get() {
            return Err(CryptoError::Signing);
        }
        let mut k = [0u8; CHALLENGE_SIZE];
        rng.fill_bytes(&mut k);
        let private = private_key.as_bytes();
        let mut signature = [0u8; SIGNATURE_SIZE];
        for i in 0..CHALLENGE_SIZE {
            signature[i] = k[i];
            signature[CHALLENGE_SIZE + i] = k[i] ^ message[i] ^ private[i];
        }
        Ok(signature)
    }
}

/// Medium whose writes to one slot always fail
#[derive(Default)]
pub struct StuckSlot {
    pub inner: MemoryMedium,
    pub bad: usize,
}

impl NvMedium for StuckSlot {
    fn slots(&self) -> usize {
        self.inner.slots()
    }

    fn read(&self, slot: usize, image: &mut [u8; RECORD_LEN]) -> Result<(), MediumError> {
        self.inner.read(slot, image)
    }

    fn write(&mut self, slot: usize, image: &[u8; RECORD_LEN]) -> Result<(), MediumError> {
        if slot == self.bad {
            return Err(MediumError::Write(slot));
        }
        self.inner.write(slot, image)
    }
}

pub type SimToken<M> = Dispatcher<SimBoard, SimNoise, SimNoise, FakeCurve, M>;
pub type SimDispatcher = SimToken<MemoryMedium>;

pub fn token(user: User) -> (SimDispatcher, Rc<CurveStats>) {
    token_on(user, MemoryMedium::new())
}

pub fn token_on<M: NvMedium>(user: User, medium: M) -> (SimToken<M>, Rc<CurveStats>) {
    let config = Config::default();
    let stats = Rc::new(CurveStats::default());
    let entropy = EntropySource::new(
        config.entropy_method,
        SimNoise(0x1234_5678),
        SimNoise(0x9abc_def0),
        config.entropy_draw_attempts,
    );
    let dispatcher = Dispatcher::new(
        &config,
        SimBoard::new(user),
        entropy,
        FakeCurve {
            stats: Rc::clone(&stats),
        },
        CredentialStore::new(medium),
    );
    (dispatcher, stats)
}

/// Send one request and collect the full response
pub fn exchange<M: NvMedium>(token: &mut SimToken<M>, request: &[u8]) -> Vec<u8> {
    token.board_mut().input.extend(request.iter().copied());
    token.board_mut().output.clear();
    let status = token.poll().expect("request starts with a command byte");
    let response = std::mem::take(&mut token.board_mut().output);
    assert_eq!(response[0], u8::from(status));
    response
}
