//! Device configuration
//!
//! Hardware pin assignments and table sizes are compile-time constants. The
//! timing knobs live in [`Config`], whose defaults are the reference
//! behavior of the token.

use crate::entropy::EntropyMethod;

/// Number of credential slots in non-volatile storage
pub const STORE_CAPACITY: usize = 15;

/// Receive ring buffer size in bytes
pub const RX_BUFFER_SIZE: usize = 128;

/// UART baud rate of the host link
pub const UART_BAUD: u32 = 115_200;

/// Host link on UART1; UART0 carries the log console
pub const UART_TX_PIN: i32 = 17;
pub const UART_RX_PIN: i32 = 18;

/// Consent button (active low, internal pull-up)
/// Default: GPIO0 (BOOT button on most ESP32-S3 devkits)
pub const BUTTON_PIN: i32 = 0;

/// Status LED, driven by LEDC PWM
pub const LED_PIN: i32 = 2;

/// Floating ADC input sampled for noise
pub const NOISE_ADC_PIN: i32 = 1;

/// LED intensity while lit
pub const INDICATOR_MAX: u8 = u8::MAX;

/// Consent gate timing, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentTiming {
    /// Give up waiting for the button after this long
    pub timeout_ms: u32,
    /// LED toggles every interval while waiting (1 Hz blink at 500 ms)
    pub blink_interval_ms: u32,
    /// Pressed level must be stable this long to count
    pub debounce_ms: u32,
}

impl Default for ConsentTiming {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            blink_interval_ms: 500,
            debounce_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub consent: ConsentTiming,
    /// Idle time allowed between parameter bytes before `BadParameter`
    pub param_timeout_ms: u32,
    /// Noise combination used for key generation and signing
    pub entropy_method: EntropyMethod,
    /// Polls allowed for one noise sample before reusing the last one
    pub entropy_draw_attempts: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            consent: ConsentTiming::default(),
            param_timeout_ms: 1_000,
            entropy_method: EntropyMethod::Combined,
            entropy_draw_attempts: 500,
        }
    }
}
