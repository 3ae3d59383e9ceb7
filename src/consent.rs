//! User-presence (consent) gate
//!
//! Every operation that creates, uses or wipes a credential first waits for
//! a physical button press. While waiting the LED blinks at 1 Hz; the wait
//! ends either with a debounced press (LED held on) or with the timeout
//! (LED off). There is no third outcome.
//!
//! The blink and debounce timers are independent: the blink timer restarts
//! only when it fires, the debounce timer restarts on every level change,
//! so button bounce never disturbs the blink cadence.

use log::info;

use crate::config::{ConsentTiming, INDICATOR_MAX};
use crate::error::CommandError;
use crate::platform::{Clock, UserInterface};

/// Evidence that the user confirmed presence for the current command
///
/// Only the gate hands these out; storage mutations require one.
#[derive(Debug)]
pub struct PresenceProof {
    _private: (),
}

impl PresenceProof {
    pub(crate) fn granted() -> Self {
        Self { _private: () }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Waiting,
    Confirmed,
    TimedOut,
}

/// Per-wait state; built fresh for every consent request
#[derive(Debug)]
pub struct ConsentState {
    timing: ConsentTiming,
    elapsed: u32,
    blink_elapsed: u32,
    debounce_elapsed: u32,
    last_pressed: bool,
    led_on: bool,
}

impl ConsentState {
    pub fn new(timing: ConsentTiming, pressed_at_entry: bool) -> Self {
        Self {
            timing,
            elapsed: 0,
            blink_elapsed: 0,
            debounce_elapsed: 0,
            last_pressed: pressed_at_entry,
            led_on: true,
        }
    }

    pub fn led_on(&self) -> bool {
        self.led_on
    }

    pub fn elapsed_ms(&self) -> u32 {
        self.elapsed
    }

    /// Account for `delta_ms` of elapsed time and the current raw level
    pub fn advance(&mut self, delta_ms: u32, pressed: bool) -> Step {
        self.elapsed = self.elapsed.saturating_add(delta_ms);
        self.blink_elapsed = self.blink_elapsed.saturating_add(delta_ms);
        self.debounce_elapsed = self.debounce_elapsed.saturating_add(delta_ms);

        if self.blink_elapsed >= self.timing.blink_interval_ms {
            self.blink_elapsed = 0;
            self.led_on = !self.led_on;
        }

        if pressed != self.last_pressed {
            self.last_pressed = pressed;
            self.debounce_elapsed = 0;
        } else if pressed && self.debounce_elapsed >= self.timing.debounce_ms {
            return Step::Confirmed;
        }

        if self.elapsed >= self.timing.timeout_ms {
            Step::TimedOut
        } else {
            Step::Waiting
        }
    }
}

pub struct ConsentGate {
    timing: ConsentTiming,
}

impl ConsentGate {
    pub fn new(timing: ConsentTiming) -> Self {
        Self { timing }
    }

    /// Block (cooperatively) until the user confirms or the wait times out
    pub fn wait<B>(&self, board: &mut B) -> Result<PresenceProof, CommandError>
    where
        B: Clock + UserInterface + ?Sized,
    {
        let mut state = ConsentState::new(self.timing, board.button_pressed());
        board.set_indicator(INDICATOR_MAX);
        let mut last_ms = board.elapsed_ms();

        loop {
            let now = board.elapsed_ms();
            let delta = now.wrapping_sub(last_ms);
            if delta == 0 {
                board.sleep_until_event();
                continue;
            }
            last_ms = now;

            let led_before = state.led_on();
            let pressed = board.button_pressed();
            match state.advance(delta, pressed) {
                Step::Confirmed => {
                    board.set_indicator(INDICATOR_MAX);
                    info!("User presence confirmed after {}ms", state.elapsed_ms());
                    return Ok(PresenceProof::granted());
                }
                Step::TimedOut => {
                    board.set_indicator(0);
                    info!("User presence timed out");
                    return Err(CommandError::ApprovalDenied);
                }
                Step::Waiting => {
                    if state.led_on() != led_before {
                        board.set_indicator(if state.led_on() { INDICATOR_MAX } else { 0 });
                    }
                }
            }

            board.sleep_until_event();
        }
    }
}
