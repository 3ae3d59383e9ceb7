//! fernkey - button-gated security token firmware
//!
//! Boot sequence:
//! 1. Bring up logging and peripherals
//! 2. Build the entropy source and self-test it
//! 3. Open the credential store in NVS
//! 4. Serve host commands on the UART forever

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_hal::gpio::{AnyIOPin, PinDriver};
    use esp_idf_hal::ledc::config::TimerConfig;
    use esp_idf_hal::ledc::{LedcDriver, LedcTimerDriver};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::prelude::*;
    use esp_idf_hal::uart::{self, UartDriver};
    use esp_idf_svc::log::EspLogger;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::{info, warn};

    use fernkey::config::{
        BUTTON_PIN, LED_PIN, NOISE_ADC_PIN, UART_BAUD, UART_RX_PIN, UART_TX_PIN,
    };
    use fernkey::entropy::SELF_TEST_WARN_BITS;
    use fernkey::platform::esp::{AdcNoise, EspBoard, JitterNoise, MicroEcc, NvsMedium};
    use fernkey::{Config, CredentialStore, Dispatcher, EntropySource};

    // Initialize ESP-IDF
    esp_idf_sys::link_patches();
    EspLogger::initialize_default();

    info!("fernkey v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::default();
    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    // Entropy: floating ADC input plus timer jitter
    let adc = AdcNoise::new(peripherals.adc1, pins.gpio1)?;
    let mut entropy = EntropySource::new(
        config.entropy_method,
        adc,
        JitterNoise,
        config.entropy_draw_attempts,
    );
    info!(
        "Entropy source: {:?} (ADC on GPIO{})",
        entropy.method(),
        NOISE_ADC_PIN
    );

    let bits = entropy.self_test()?;
    if bits < SELF_TEST_WARN_BITS {
        warn!("Entropy self-test: {:.2} bits/byte, below {:.1}", bits, SELF_TEST_WARN_BITS);
    } else {
        info!("Entropy self-test: {:.2} bits/byte", bits);
    }
    if entropy.stale_draws() > 0 {
        warn!(
            "Entropy self-test reused {} stale sample(s); a noise source is slow",
            entropy.stale_draws()
        );
    }

    // Credential store
    let store = CredentialStore::new(NvsMedium::new(EspDefaultNvsPartition::take()?)?);
    info!(
        "Credential store: {} of {} slots in use",
        store.len(),
        store.capacity()
    );

    // Host link
    let uart_config = uart::config::Config::default().baudrate(Hertz(UART_BAUD));
    let uart = UartDriver::new(
        peripherals.uart1,
        pins.gpio17,
        pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    info!(
        "Host link on UART1 (TX GPIO{}, RX GPIO{}) at {} baud",
        UART_TX_PIN, UART_RX_PIN, UART_BAUD
    );

    // Consent button and LED
    let button = PinDriver::input(pins.gpio0)?;
    let led_timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default().frequency(5.kHz().into()),
    )?;
    let led = LedcDriver::new(peripherals.ledc.channel0, led_timer, pins.gpio2)?;
    info!("Button on GPIO{}, LED on GPIO{}", BUTTON_PIN, LED_PIN);

    let board = EspBoard::new(uart, button, led)?;

    let mut dispatcher = Dispatcher::new(&config, board, entropy, MicroEcc::secp160r1(), store);
    dispatcher.run()
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!(
        "fernkey v{} is firmware for ESP-IDF targets; on the host use the library and its tests",
        env!("CARGO_PKG_VERSION")
    )
}
