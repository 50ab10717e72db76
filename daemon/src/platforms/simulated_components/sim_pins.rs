// This file is part of skfpgad, an application to manage an EBI-attached FPGA together with its configuration pins and memory windows.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// skfpgad is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// skfpgad is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Recording pin controller used by the simulated platform.
//!
//! Every `set` call is appended to an event log so tests can replay the exact
//! waveform a driver operation produced, e.g. the data levels at each
//! configuration-clock rising edge. The `done` pin is modelled after the
//! serial configuration behaviour of the real die: it goes high once enough
//! clock rising edges have been seen since the last low pulse on `prog`.

use crate::config::PinAssignments;
use crate::error::SkFpgaError;
use crate::platforms::platform::{Pin, PinController, PinDirection};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct SimPinState {
    /// Claimed roles with their current configuration.
    claims: HashMap<Pin, PinDirection>,
    /// GPIO line number to owning role, for cross-role collision checks.
    lines: HashMap<u32, Pin>,
    /// Last driven or injected level per role.
    levels: HashMap<Pin, bool>,
    /// Every `set` call in order, as (role, level).
    events: Vec<(Pin, bool)>,
    /// Rising edges on `cclk` since `prog` last went low.
    cclk_rises_since_prog: u32,
    /// `done` reads high once `cclk_rises_since_prog` reaches this.
    done_after_pulses: u32,
    /// When armed, the next `set` call fails with this reason.
    fail_next_set: Option<String>,
}

/// A [`PinController`] that drives no hardware and records everything.
#[derive(Debug)]
pub struct SimPins {
    assignments: PinAssignments,
    state: Mutex<SimPinState>,
}

impl SimPins {
    pub fn new(assignments: &PinAssignments) -> Self {
        SimPins {
            assignments: assignments.clone(),
            state: Mutex::new(SimPinState::default()),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, SimPinState> {
        self.state.lock().expect("sim pin state lock poisoned")
    }

    /// Whether `pin` is currently claimed.
    pub fn is_claimed(&self, pin: Pin) -> bool {
        self.locked().claims.contains_key(&pin)
    }

    /// The last level seen on `pin`, if any was ever driven or injected.
    pub fn level(&self, pin: Pin) -> Option<bool> {
        self.locked().levels.get(&pin).copied()
    }

    /// Snapshot of the `set` call log.
    pub fn set_events(&self) -> Vec<(Pin, bool)> {
        self.locked().events.clone()
    }

    pub fn clear_events(&self) {
        self.locked().events.clear();
    }

    /// Number of `set` calls on `pin`, i.e. level transitions requested.
    pub fn transition_count(&self, pin: Pin) -> usize {
        self.locked().events.iter().filter(|(p, _)| *p == pin).count()
    }

    /// The level `din` held at each `cclk` rising edge, in order. This is
    /// the bit stream a serial-configuration peripheral would have latched.
    pub fn din_bits_at_cclk_rise(&self) -> Vec<bool> {
        let state = self.locked();
        let mut last_din = false;
        let mut latched = Vec::new();
        for (pin, level) in &state.events {
            match pin {
                Pin::Din => last_din = *level,
                Pin::Cclk if *level => latched.push(last_din),
                _ => {}
            }
        }
        latched
    }

    /// Configure after how many clock rising edges (counted from the last
    /// `prog` low pulse) the `done` pin reads high. `u32::MAX` models a part
    /// that never finishes.
    pub fn set_done_after_pulses(&self, pulses: u32) {
        self.locked().done_after_pulses = pulses;
    }

    /// Inject the level of an externally driven input such as `fpga_irq`.
    pub fn drive_input(&self, pin: Pin, level: bool) {
        self.locked().levels.insert(pin, level);
    }

    /// Arm a one-shot failure for the next `set` call, to exercise error
    /// paths that are unreachable with a cooperative backend.
    pub fn fail_next_set(&self, reason: &str) {
        self.locked().fail_next_set = Some(reason.to_string());
    }
}

impl PinController for SimPins {
    fn claim(&self, pin: Pin, direction: PinDirection) -> Result<(), SkFpgaError> {
        let line = pin.line(&self.assignments);
        let mut state = self.locked();
        if let Some(owner) = state.lines.get(&line) {
            return Err(SkFpgaError::PinClaim {
                pin,
                reason: format!("GPIO line {line} is already claimed as {owner}"),
            });
        }
        state.lines.insert(line, pin);
        state.claims.insert(pin, direction);
        match direction {
            PinDirection::OutputHigh => {
                state.levels.insert(pin, true);
            }
            PinDirection::OutputLow => {
                state.levels.insert(pin, false);
            }
            PinDirection::Input => {}
        }
        Ok(())
    }

    fn release(&self, pin: Pin) -> Result<(), SkFpgaError> {
        let line = pin.line(&self.assignments);
        let mut state = self.locked();
        state.claims.remove(&pin);
        if state.lines.get(&line) == Some(&pin) {
            state.lines.remove(&line);
        }
        Ok(())
    }

    fn set_direction(&self, pin: Pin, direction: PinDirection) -> Result<(), SkFpgaError> {
        let mut state = self.locked();
        if !state.claims.contains_key(&pin) {
            return Err(SkFpgaError::PinClaim {
                pin,
                reason: "cannot reconfigure an unclaimed pin".to_string(),
            });
        }
        state.claims.insert(pin, direction);
        match direction {
            PinDirection::OutputHigh => {
                state.levels.insert(pin, true);
            }
            PinDirection::OutputLow => {
                state.levels.insert(pin, false);
            }
            PinDirection::Input => {}
        }
        Ok(())
    }

    fn set(&self, pin: Pin, value: bool) -> Result<(), SkFpgaError> {
        let mut state = self.locked();
        match state.claims.get(&pin) {
            None => {
                return Err(SkFpgaError::PinClaim {
                    pin,
                    reason: "cannot drive an unclaimed pin".to_string(),
                });
            }
            Some(PinDirection::Input) => {
                return Err(SkFpgaError::PinClaim {
                    pin,
                    reason: "cannot drive a pin configured as input".to_string(),
                });
            }
            Some(_) => {}
        }
        if let Some(reason) = state.fail_next_set.take() {
            return Err(SkFpgaError::IOWrite {
                file: PathBuf::from(format!("sim://{pin}")),
                e: std::io::Error::other(reason),
            });
        }
        let previous = state.levels.insert(pin, value);
        state.events.push((pin, value));
        match pin {
            Pin::Cclk if value && previous != Some(true) => {
                state.cclk_rises_since_prog += 1;
            }
            Pin::Prog if !value => {
                state.cclk_rises_since_prog = 0;
            }
            _ => {}
        }
        Ok(())
    }

    fn get(&self, pin: Pin) -> Result<bool, SkFpgaError> {
        let state = self.locked();
        if !state.claims.contains_key(&pin) {
            return Err(SkFpgaError::PinClaim {
                pin,
                reason: "cannot sample an unclaimed pin".to_string(),
            });
        }
        if pin == Pin::Done {
            return Ok(state.cclk_rises_since_prog >= state.done_after_pulses);
        }
        Ok(state.levels.get(&pin).copied().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;

    fn pins() -> SimPins {
        SimPins::new(&BoardConfig::defaults().pins)
    }

    #[test]
    fn test_claim_then_drive_then_sample() {
        let pins = pins();
        pins.claim(Pin::Reset, PinDirection::OutputHigh).unwrap();
        assert!(pins.get(Pin::Reset).unwrap(), "claimed high");
        pins.set(Pin::Reset, false).unwrap();
        assert!(!pins.get(Pin::Reset).unwrap());
    }

    #[test]
    fn test_unclaimed_pin_cannot_be_driven() {
        let pins = pins();
        assert!(pins.set(Pin::Din, true).is_err());
        assert!(pins.get(Pin::Din).is_err());
    }

    #[test]
    fn test_line_collision_is_reported_with_owner() {
        let mut assignments = BoardConfig::defaults().pins;
        assignments.cclk = assignments.din;
        let pins = SimPins::new(&assignments);
        pins.claim(Pin::Din, PinDirection::OutputHigh).unwrap();
        let err = pins.claim(Pin::Cclk, PinDirection::OutputHigh).unwrap_err();
        assert!(err.to_string().contains("din"), "got: {err}");
    }

    #[test]
    fn test_done_follows_clock_pulse_model() {
        let pins = pins();
        pins.claim(Pin::Prog, PinDirection::OutputHigh).unwrap();
        pins.claim(Pin::Cclk, PinDirection::OutputLow).unwrap();
        pins.claim(Pin::Done, PinDirection::Input).unwrap();
        pins.set_done_after_pulses(2);

        // a prog low pulse restarts the count
        pins.set(Pin::Prog, false).unwrap();
        pins.set(Pin::Prog, true).unwrap();
        assert!(!pins.get(Pin::Done).unwrap());

        for _ in 0..2 {
            pins.set(Pin::Cclk, true).unwrap();
            pins.set(Pin::Cclk, false).unwrap();
        }
        assert!(pins.get(Pin::Done).unwrap());
    }

    #[test]
    fn test_din_levels_are_latched_on_rising_edges_only() {
        let pins = pins();
        pins.claim(Pin::Cclk, PinDirection::OutputLow).unwrap();
        pins.claim(Pin::Din, PinDirection::OutputHigh).unwrap();

        pins.set(Pin::Din, true).unwrap();
        pins.set(Pin::Cclk, true).unwrap();
        pins.set(Pin::Cclk, false).unwrap();
        pins.set(Pin::Din, false).unwrap();
        pins.set(Pin::Cclk, true).unwrap();
        pins.set(Pin::Cclk, false).unwrap();

        assert_eq!(pins.din_bits_at_cclk_rise(), vec![true, false]);
    }
}
