//! ESP32-S3 board support
//!
//! - host link on UART1 (UART0 stays the log console)
//! - consent button on a GPIO with internal pull-up (active low)
//! - status LED on LEDC PWM
//! - noise from a floating ADC input and from timer jitter
//! - credential slots as NVS blobs, one key per slot
//! - secp160r1 through the micro-ecc C library

use core::ffi::{c_int, c_uint};
use core::fmt::Write as _;
use std::sync::Arc;

use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::delay::{FreeRtos, BLOCK};
use esp_idf_hal::gpio::{ADCPin, Input, InputPin, OutputPin, PinDriver, Pull};
use esp_idf_hal::ledc::LedcDriver;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::uart::{UartDriver, UartTxDriver};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::warn;
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use super::{Clock, Exclusive, NoiseSource, RingBuffer, Transport, UserInterface};
use crate::crypto::{Curve, KeyPair, PrivateKey};
use crate::error::{CryptoError, MediumError};
use crate::protocol::{Challenge, PublicKey, Signature, CHALLENGE_SIZE, PRIVATE_KEY_SIZE};
use crate::store::{NvMedium, RECORD_LEN, VACANT_IMAGE};

/// NVS namespace holding the credential slots
const NVS_NAMESPACE: &str = "fernkey";

/// Busy-loop length for one jitter sample
const JITTER_SPINS: u32 = 8_000;

/// Get current time in milliseconds (wraps at u32::MAX)
fn millis() -> u32 {
    (unsafe { esp_idf_sys::esp_timer_get_time() } / 1000) as u32
}

/// Host link, button and LED
pub struct EspBoard<'d, P>
where
    P: InputPin,
{
    tx: UartTxDriver<'d>,
    rx: Arc<Exclusive<RingBuffer>>,
    button: PinDriver<'d, P, Input>,
    led: LedcDriver<'d>,
}

impl<P> EspBoard<'static, P>
where
    P: InputPin + OutputPin,
{
    /// Take over the UART and start the receive thread
    ///
    /// The thread is the only producer for the ring buffer; the main
    /// sequence drains it through [`Transport::try_read_byte`].
    pub fn new(
        uart: UartDriver<'static>,
        mut button: PinDriver<'static, P, Input>,
        led: LedcDriver<'static>,
    ) -> anyhow::Result<Self> {
        button.set_pull(Pull::Up)?;

        let (tx, rx_driver) = uart.into_split();
        let rx = Arc::new(Exclusive::new(RingBuffer::new()));

        let producer = Arc::clone(&rx);
        std::thread::Builder::new()
            .name("uart-rx".into())
            .stack_size(4096)
            .spawn(move || {
                let mut buf = [0u8; 32];
                loop {
                    match rx_driver.read(&mut buf, BLOCK) {
                        Ok(n) => producer.with(|ring| {
                            for &b in &buf[..n] {
                                ring.push(b);
                            }
                        }),
                        Err(e) => {
                            warn!("UART read failed: {}", e);
                            FreeRtos::delay_ms(10);
                        }
                    }
                }
            })?;

        let mut board = Self {
            tx,
            rx,
            button,
            led,
        };
        board.set_indicator(0);
        Ok(board)
    }
}

impl<'d, P: InputPin> Transport for EspBoard<'d, P> {
    fn try_read_byte(&mut self) -> Option<u8> {
        self.rx.with(|ring| ring.pop())
    }

    fn write_byte(&mut self, byte: u8) {
        self.write_all(&[byte]);
    }

    fn write_all(&mut self, bytes: &[u8]) {
        if let Err(e) = self.tx.write(bytes) {
            warn!("UART write failed: {}", e);
        }
    }
}

impl<'d, P: InputPin> Clock for EspBoard<'d, P> {
    fn elapsed_ms(&self) -> u32 {
        millis()
    }

    fn sleep_until_event(&mut self) {
        // Yields to the idle task, which lets the CPU sleep until the next tick
        FreeRtos::delay_ms(1);
    }
}

impl<'d, P: InputPin> UserInterface for EspBoard<'d, P> {
    fn button_pressed(&mut self) -> bool {
        self.button.is_low() // Active low
    }

    fn set_indicator(&mut self, intensity: u8) {
        let duty = self.led.get_max_duty() * intensity as u32 / u8::MAX as u32;
        if let Err(e) = self.led.set_duty(duty) {
            warn!("LED duty update failed: {}", e);
        }
    }
}

/// Low bits of a floating ADC input
pub struct AdcNoise<'d, P>
where
    P: ADCPin,
{
    channel: AdcChannelDriver<'d, P, AdcDriver<'d, P::Adc>>,
}

impl<'d, P: ADCPin> AdcNoise<'d, P> {
    pub fn new(
        adc: impl Peripheral<P = P::Adc> + 'd,
        pin: impl Peripheral<P = P> + 'd,
    ) -> anyhow::Result<Self> {
        let driver = AdcDriver::new(adc)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        Ok(Self {
            channel: AdcChannelDriver::new(driver, pin, &config)?,
        })
    }
}

impl<'d, P: ADCPin> NoiseSource for AdcNoise<'d, P> {
    fn try_sample(&mut self) -> Option<u8> {
        let raw = self.channel.read_raw().ok()?;
        Some((raw ^ (raw >> 8)) as u8)
    }
}

/// Timer readings accumulated across a fixed busy loop
///
/// Cache, interrupt and flash wait-state effects make the loop's duration
/// wobble; the low byte of the accumulated timestamps carries that wobble.
#[derive(Default)]
pub struct JitterNoise;

impl NoiseSource for JitterNoise {
    fn try_sample(&mut self) -> Option<u8> {
        let mut acc: i64 = 0;
        for i in 0..JITTER_SPINS {
            if i % 64 == 0 {
                acc = acc.wrapping_add(unsafe { esp_idf_sys::esp_timer_get_time() });
            }
            core::hint::black_box(i);
        }
        Some(acc as u8)
    }
}

/// Credential slots stored as NVS blobs `cred00`..`cred14`
///
/// NVS replaces a blob atomically, so a reset during a write leaves either
/// the old or the new image of that one slot.
pub struct NvsMedium {
    nvs: EspNvs<NvsDefault>,
}

impl NvsMedium {
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        Ok(Self {
            nvs: EspNvs::new(partition, NVS_NAMESPACE, true)?,
        })
    }

    fn key(slot: usize) -> heapless::String<8> {
        let mut key = heapless::String::new();
        // "credNN" always fits
        let _ = write!(key, "cred{:02}", slot);
        key
    }
}

impl NvMedium for NvsMedium {
    fn slots(&self) -> usize {
        crate::config::STORE_CAPACITY
    }

    fn read(&self, slot: usize, image: &mut [u8; RECORD_LEN]) -> Result<(), MediumError> {
        if slot >= self.slots() {
            return Err(MediumError::OutOfRange(slot));
        }
        let found = self
            .nvs
            .get_raw(&Self::key(slot), &mut image[..])
            .map_err(|_| MediumError::Read(slot))?
            .map(|blob| blob.len());

        match found {
            Some(RECORD_LEN) => {}
            // Wrong-sized blob: make sure it cannot decode as a record
            Some(_) => image.fill(0xff),
            None => *image = VACANT_IMAGE,
        }
        Ok(())
    }

    fn write(&mut self, slot: usize, image: &[u8; RECORD_LEN]) -> Result<(), MediumError> {
        if slot >= self.slots() {
            return Err(MediumError::OutOfRange(slot));
        }
        self.nvs
            .set_raw(&Self::key(slot), image)
            .map(|_| ())
            .map_err(|_| MediumError::Write(slot))
    }
}

mod uecc {
    use core::ffi::{c_int, c_uint, c_void};

    pub type Curve = *const c_void;
    pub type Rng = Option<unsafe extern "C" fn(dest: *mut u8, size: c_uint) -> c_int>;

    extern "C" {
        pub fn uECC_secp160r1() -> Curve;
        pub fn uECC_set_rng(rng: Rng);
        pub fn uECC_make_key(public_key: *mut u8, private_key: *mut u8, curve: Curve) -> c_int;
        pub fn uECC_sign(
            private_key: *const u8,
            message_hash: *const u8,
            hash_size: c_uint,
            signature: *mut u8,
            curve: Curve,
        ) -> c_int;
    }
}

/// Entropy source lent to micro-ecc for the duration of one call
///
/// micro-ecc takes a bare C callback with no context pointer, so the
/// caller's generator is parked here and the callback draws from it on
/// demand. micro-ecc retries scalar generation as often as it needs; every
/// retry is served fresh bytes. Outside a call the slot is empty and the
/// callback reports failure.
struct LentRng(*mut (dyn CryptoRngCore + 'static));

// Only dereferenced by the callback while `MicroEcc::with_rng` holds the
// borrow it was made from, on the calling thread.
unsafe impl Send for LentRng {}

static LENT_RNG: Exclusive<Option<LentRng>> = Exclusive::new(None);

unsafe extern "C" fn lent_rng(dest: *mut u8, size: c_uint) -> c_int {
    let dest = core::slice::from_raw_parts_mut(dest, size as usize);
    LENT_RNG.with(|lent| match lent {
        Some(LentRng(rng)) => {
            (**rng).fill_bytes(dest);
            1
        }
        None => 0,
    })
}

/// secp160r1 via micro-ecc
pub struct MicroEcc {
    curve: uecc::Curve,
}

impl MicroEcc {
    pub fn secp160r1() -> Self {
        Self {
            curve: unsafe { uecc::uECC_secp160r1() },
        }
    }

    fn with_rng<R>(rng: &mut dyn CryptoRngCore, op: impl FnOnce() -> R) -> R {
        // SAFETY: the erased lifetime never outlives this call; the slot is
        // cleared again before `rng` is released
        let lent: *mut (dyn CryptoRngCore + 'static) = unsafe { core::mem::transmute(rng) };
        LENT_RNG.with(|slot| *slot = Some(LentRng(lent)));
        unsafe { uecc::uECC_set_rng(Some(lent_rng)) };
        let result = op();
        LENT_RNG.with(|slot| *slot = None);
        result
    }
}

impl Curve for MicroEcc {
    fn generate_keypair(&mut self, rng: &mut dyn CryptoRngCore) -> Result<KeyPair, CryptoError> {
        let mut public: PublicKey = [0; crate::protocol::PUBLIC_KEY_SIZE];
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        let curve = self.curve;

        let ok = Self::with_rng(rng, || unsafe {
            uecc::uECC_make_key(public.as_mut_ptr(), private.as_mut_ptr(), curve)
        });

        let keypair = KeyPair {
            public,
            private: PrivateKey::from_bytes(private),
        };
        private.zeroize();

        if ok == 1 {
            Ok(keypair)
        } else {
            Err(CryptoError::KeyGeneration)
        }
    }

    fn sign(
        &mut self,
        private_key: &PrivateKey,
        message: &Challenge,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Signature, CryptoError> {
        let mut signature: Signature = [0; crate::protocol::SIGNATURE_SIZE];
        let curve = self.curve;

        let ok = Self::with_rng(rng, || unsafe {
            uecc::uECC_sign(
                private_key.as_bytes().as_ptr(),
                message.as_ptr(),
                CHALLENGE_SIZE as c_uint,
                signature.as_mut_ptr(),
                curve,
            )
        });

        if ok == 1 {
            Ok(signature)
        } else {
            Err(CryptoError::Signing)
        }
    }
}
