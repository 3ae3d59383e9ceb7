//! Entropy source for key generation and signing
//!
//! The token has no true RNG peripheral it can trust on its own. Instead it
//! samples two weak physical sources:
//! - a floating ADC input (thermal/RF noise in the low bits)
//! - timer jitter measured across a busy loop
//!
//! In `Combined` mode each output byte is the XOR of one byte from each
//! source, so a single source railing at a constant value still leaves the
//! other one's variation in the output.
//!
//! Every draw is bounded: a source that produces nothing within the attempt
//! cap contributes its last known sample instead of stalling key generation.
//! Such stale draws are counted but never fail the caller.

use log::debug;
use rand_core::{CryptoRng, RngCore};

use crate::error::EntropyError;
use crate::platform::NoiseSource;

/// Output bytes drawn by the boot self-test
pub const SELF_TEST_SAMPLE_LEN: usize = 1024;

/// Estimate below which the self-test result is worth a warning (bits/byte)
pub const SELF_TEST_WARN_BITS: f64 = 7.0;

/// How output bytes are produced; fixed when the source is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntropyMethod {
    /// ADC noise only
    Adc,
    /// Timer jitter only
    TimerJitter,
    /// ADC byte XOR jitter byte
    #[default]
    Combined,
}

pub struct EntropySource<A, J> {
    method: EntropyMethod,
    adc: A,
    jitter: J,
    attempts: u16,
    last_adc: u8,
    last_jitter: u8,
    stale_draws: u32,
}

impl<A: NoiseSource, J: NoiseSource> EntropySource<A, J> {
    pub fn new(method: EntropyMethod, adc: A, jitter: J, attempts: u16) -> Self {
        Self {
            method,
            adc,
            jitter,
            attempts,
            last_adc: 0,
            last_jitter: 0,
            stale_draws: 0,
        }
    }

    pub fn method(&self) -> EntropyMethod {
        self.method
    }

    /// Number of draws that fell back to a stale sample so far
    pub fn stale_draws(&self) -> u32 {
        self.stale_draws
    }

    /// Fill `out` completely; never fails
    pub fn generate(&mut self, out: &mut [u8]) {
        for byte in out.iter_mut() {
            *byte = match self.method {
                EntropyMethod::Adc => self.draw_adc(),
                EntropyMethod::TimerJitter => self.draw_jitter(),
                EntropyMethod::Combined => self.draw_adc() ^ self.draw_jitter(),
            };
        }
    }

    fn draw_adc(&mut self) -> u8 {
        match poll_bounded(&mut self.adc, self.attempts) {
            Some(sample) => self.last_adc = sample,
            None => {
                self.stale_draws = self.stale_draws.wrapping_add(1);
                debug!("ADC sample timed out, reusing last value");
            }
        }
        self.last_adc
    }

    fn draw_jitter(&mut self) -> u8 {
        match poll_bounded(&mut self.jitter, self.attempts) {
            Some(sample) => self.last_jitter = sample,
            None => {
                self.stale_draws = self.stale_draws.wrapping_add(1);
                debug!("Jitter sample timed out, reusing last value");
            }
        }
        self.last_jitter
    }

    /// Draw a sample and estimate its quality
    ///
    /// Returns the Shannon entropy estimate in bits per byte, or
    /// [`EntropyError::Stuck`] if every byte came out identical (a railed
    /// or disconnected source).
    pub fn self_test(&mut self) -> Result<f64, EntropyError> {
        let mut freq = [0u32; 256];
        let mut chunk = [0u8; 64];
        let mut drawn = 0;

        while drawn < SELF_TEST_SAMPLE_LEN {
            let n = chunk.len().min(SELF_TEST_SAMPLE_LEN - drawn);
            self.generate(&mut chunk[..n]);
            for &b in &chunk[..n] {
                freq[b as usize] += 1;
            }
            drawn += n;
        }

        if let Some(value) = freq.iter().position(|&c| c as usize == SELF_TEST_SAMPLE_LEN) {
            return Err(EntropyError::Stuck(value as u8));
        }

        Ok(entropy_from_histogram(&freq, SELF_TEST_SAMPLE_LEN))
    }
}

fn poll_bounded<S: NoiseSource>(source: &mut S, attempts: u16) -> Option<u8> {
    (0..attempts.max(1)).find_map(|_| source.try_sample())
}

/// Shannon entropy in bits per byte (8.0 = uniform) from a byte histogram
fn entropy_from_histogram(freq: &[u32; 256], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    freq.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

// rand_core traits so the curve library can draw from us directly
impl<A: NoiseSource, J: NoiseSource> RngCore for EntropySource<A, J> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.generate(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.generate(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.generate(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.generate(dest);
        Ok(())
    }
}

// The only randomness the device has; key generation must accept it
impl<A: NoiseSource, J: NoiseSource> CryptoRng for EntropySource<A, J> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    /// Replays a fixed sample vector; `None` entries model a converter that
    /// is not ready on that poll
    struct Scripted(VecDeque<Option<u8>>);

    impl Scripted {
        fn ready(samples: &[u8]) -> Self {
            Self(samples.iter().map(|&b| Some(b)).collect())
        }
    }

    impl NoiseSource for Scripted {
        fn try_sample(&mut self) -> Option<u8> {
            self.0.pop_front().flatten()
        }
    }

    struct Counter(u8);

    impl NoiseSource for Counter {
        fn try_sample(&mut self) -> Option<u8> {
            self.0 = self.0.wrapping_add(1);
            Some(self.0)
        }
    }

    #[test]
    fn test_combined_is_bytewise_xor() {
        let adc = [0x00, 0xff, 0x12, 0xa5, 0x3c];
        let jitter = [0xff, 0xff, 0x34, 0x5a, 0x3c];
        let mut rng = EntropySource::new(
            EntropyMethod::Combined,
            Scripted::ready(&adc),
            Scripted::ready(&jitter),
            500,
        );

        let mut out = [0u8; 5];
        rng.generate(&mut out);
        assert_eq!(out, [0xff, 0x00, 0x26, 0xff, 0x00]);
        assert_eq!(rng.stale_draws(), 0);
    }

    #[test]
    fn test_single_source_methods() {
        let mut adc_only = EntropySource::new(
            EntropyMethod::Adc,
            Scripted::ready(&[1, 2, 3]),
            Scripted::ready(&[]),
            10,
        );
        let mut out = [0u8; 3];
        adc_only.generate(&mut out);
        assert_eq!(out, [1, 2, 3]);
        // the unused source is never polled
        assert_eq!(adc_only.stale_draws(), 0);

        let mut jitter_only = EntropySource::new(
            EntropyMethod::TimerJitter,
            Scripted::ready(&[]),
            Scripted::ready(&[9, 8, 7]),
            10,
        );
        jitter_only.generate(&mut out);
        assert_eq!(out, [9, 8, 7]);
    }

    #[test]
    fn test_stuck_source_reuses_last_sample() {
        // second draw never becomes ready within the cap
        let mut samples: VecDeque<Option<u8>> = VecDeque::new();
        samples.push_back(Some(0x42));
        samples.extend(std::iter::repeat(None).take(5));
        samples.push_back(Some(0x43));

        let mut rng = EntropySource::new(
            EntropyMethod::Adc,
            Scripted(samples),
            Scripted::ready(&[]),
            5,
        );
        let mut out = [0u8; 3];
        rng.generate(&mut out);
        assert_eq!(out, [0x42, 0x42, 0x43]);
        assert_eq!(rng.stale_draws(), 1);
    }

    #[test]
    fn test_slow_source_within_cap_is_fresh() {
        let samples: VecDeque<Option<u8>> = vec![None, None, Some(0x77)].into();
        let mut rng = EntropySource::new(
            EntropyMethod::Adc,
            Scripted(samples),
            Scripted::ready(&[]),
            3,
        );
        let mut out = [0u8; 1];
        rng.generate(&mut out);
        assert_eq!(out, [0x77]);
        assert_eq!(rng.stale_draws(), 0);
    }

    #[test]
    fn test_self_test_flags_railed_output() {
        let mut rng = EntropySource::new(
            EntropyMethod::Adc,
            Scripted(VecDeque::new()),
            Scripted::ready(&[]),
            1,
        );
        assert_eq!(rng.self_test(), Err(EntropyError::Stuck(0)));
    }

    #[test]
    fn test_self_test_accepts_varying_output() {
        let mut rng = EntropySource::new(EntropyMethod::Adc, Counter(0), Counter(0), 1);
        let bits = rng.self_test().unwrap();
        // a full counter sweep hits every byte value equally
        assert!((bits - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_histogram_entropy_bounds() {
        let mut freq = [0u32; 256];
        assert_eq!(entropy_from_histogram(&freq, 0), 0.0);

        freq[7] = 32;
        assert_eq!(entropy_from_histogram(&freq, 32), 0.0);

        freq[7] = 1;
        freq[8] = 1;
        assert!((entropy_from_histogram(&freq, 2) - 1.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_combined_matches_xor(pairs in proptest::collection::vec(any::<(u8, u8)>(), 1..64)) {
            let adc: Vec<u8> = pairs.iter().map(|p| p.0).collect();
            let jitter: Vec<u8> = pairs.iter().map(|p| p.1).collect();
            let mut rng = EntropySource::new(
                EntropyMethod::Combined,
                Scripted::ready(&adc),
                Scripted::ready(&jitter),
                500,
            );
            let mut out = vec![0u8; pairs.len()];
            rng.fill_bytes(&mut out);
            let expected: Vec<u8> = pairs.iter().map(|p| p.0 ^ p.1).collect();
            prop_assert_eq!(out, expected);
        }
    }
}
