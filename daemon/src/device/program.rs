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

//! Serial slave configuration of the FPGA.
//!
//! The Spartan-6 is programmed by bit-banging its serial configuration
//! interface: a low pulse on `prog` restarts the configuration logic, the
//! bitstream is shifted in MSB-first on `din` with one `cclk` pulse per
//! bit, and the part raises `done` once it has everything. The four
//! configuration pins are only claimed while a programming session is
//! active, held by a [`ProgrammingPins`] value whose drop hands every
//! claimed pin back whichever way the session ends.
//!
//! Session states:
//!
//! - `Reset` - baseline, nothing programmed since the last reset
//! - `ReadyToProgram` - pins claimed, configuration logic restarted
//! - `Programmed` - a bitstream was accepted and `done` is high
//! - `Undefined` - pin IO failed partway; assert reset to recover
//!
//! A completion timeout is not a failure of the pins, so it leaves the
//! device in `ReadyToProgram` with the pins released; another
//! `prepare_to_program` retries from the top.

use crate::config::SCRATCH_CAPACITY;
use crate::device::{ClaimedPin, SkFpga};
use crate::error::SkFpgaError;
use crate::platforms::platform::{Pin, PinController, PinDirection, Platform};
use crate::system_io::{fs_open, fs_read_chunk};
use log::{info, trace, warn};
use std::path::Path;
use std::sync::Arc;

/// Completion clock pulses sent while waiting for `done` before the
/// bitstream is declared bad.
pub const MAX_DONE_WAIT_PULSES: u32 = 16384;

/// Extra clock pulses sent after `done` goes high, letting the start-up
/// sequence inside the part run to the end.
pub const SETTLE_CLOCK_PULSES: u32 = 10;

/// Lifecycle of the programming interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpgaState {
    Undefined,
    Reset,
    ReadyToProgram,
    Programmed,
}

impl std::fmt::Display for FpgaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FpgaState::Undefined => "undefined",
            FpgaState::Reset => "reset",
            FpgaState::ReadyToProgram => "ready-to-program",
            FpgaState::Programmed => "programmed",
        };
        write!(f, "{name}")
    }
}

/// The four serial-configuration pins, claimed together for the duration
/// of one programming session.
///
/// Fields are declared in release order: dropping the value hands back
/// `done`, `din`, `cclk` and finally `prog`, the reverse of how they were
/// claimed.
pub(crate) struct ProgrammingPins {
    _done: ClaimedPin,
    _din: ClaimedPin,
    _cclk: ClaimedPin,
    _prog: ClaimedPin,
}

impl ProgrammingPins {
    /// Claim `prog`, `cclk` and `din` as high outputs and `done` as an
    /// input. A failed claim releases everything claimed so far.
    pub(crate) fn claim(platform: &Arc<dyn Platform>) -> Result<Self, SkFpgaError> {
        let prog = ClaimedPin::claim(platform.clone(), Pin::Prog, PinDirection::OutputHigh)?;
        let cclk = ClaimedPin::claim(platform.clone(), Pin::Cclk, PinDirection::OutputHigh)?;
        let din = ClaimedPin::claim(platform.clone(), Pin::Din, PinDirection::OutputHigh)?;
        let done = ClaimedPin::claim(platform.clone(), Pin::Done, PinDirection::Input)?;
        Ok(ProgrammingPins {
            _done: done,
            _din: din,
            _cclk: cclk,
            _prog: prog,
        })
    }
}

/// Shift one byte into the configuration interface, MSB first, with one
/// clock pulse per bit.
pub(crate) fn shift_byte(pins: &dyn PinController, byte: u8) -> Result<(), SkFpgaError> {
    for bit in (0..8u8).rev() {
        pins.set(Pin::Din, (byte >> bit) & 1 == 1)?;
        pins.set(Pin::Cclk, true)?;
        pins.set(Pin::Cclk, false)?;
    }
    Ok(())
}

impl SkFpga {
    /// Current lifecycle state of the programming interface.
    pub fn state(&self) -> FpgaState {
        self.state
    }

    /// Claim the configuration pins and restart the configuration logic.
    ///
    /// Calling this while a session is already open drops the previous
    /// claims first and starts over, so a client that lost track can
    /// always begin from scratch. Only an `Undefined` device refuses; it
    /// wants a reset first.
    pub fn prepare_to_program(&mut self) -> Result<(), SkFpgaError> {
        if self.state == FpgaState::Undefined {
            return Err(SkFpgaError::State(
                "the device is undefined, assert reset to recover".to_string(),
            ));
        }
        // hand back claims from any interrupted session before reclaiming
        self.programming_pins = None;
        let pins = ProgrammingPins::claim(&self.platform)?;
        if let Err(e) = self.pulse_prog() {
            self.state = FpgaState::Undefined;
            return Err(e);
        }
        self.programming_pins = Some(pins);
        self.state = FpgaState::ReadyToProgram;
        info!("configuration logic restarted, ready for bitstream data");
        Ok(())
    }

    /// A low pulse on `prog` tells the part to forget its configuration.
    fn pulse_prog(&self) -> Result<(), SkFpgaError> {
        self.platform.pins().set(Pin::Prog, false)?;
        self.platform.pins().set(Pin::Prog, true)
    }

    /// Shift a chunk of bitstream bytes into the part.
    pub fn program_chunk(&mut self, data: &[u8]) -> Result<(), SkFpgaError> {
        if self.state != FpgaState::ReadyToProgram {
            return Err(SkFpgaError::State(format!(
                "cannot accept bitstream data in state {}",
                self.state
            )));
        }
        if self.programming_pins.is_none() {
            return Err(SkFpgaError::State(
                "the last attempt timed out, prepare again to retry".to_string(),
            ));
        }
        for byte in data {
            if let Err(e) = shift_byte(self.platform.pins(), *byte) {
                self.abort_programming();
                return Err(e);
            }
        }
        trace!("shifted {} bitstream bytes", data.len());
        Ok(())
    }

    /// Clock the part until `done` goes high, then let it start up.
    ///
    /// The configuration pins are handed back whichever way this ends. On
    /// success the device is `Programmed`. If `done` never rises within
    /// [`MAX_DONE_WAIT_PULSES`] extra clocks the attempt fails with
    /// `ProgrammingTimeout` and the device stays `ReadyToProgram`; a fresh
    /// `prepare_to_program` retries from the top.
    pub fn finish_programming(&mut self) -> Result<(), SkFpgaError> {
        if self.state != FpgaState::ReadyToProgram {
            return Err(SkFpgaError::State(format!(
                "nothing to finish in state {}",
                self.state
            )));
        }
        if self.programming_pins.is_none() {
            return Err(SkFpgaError::State(
                "the last attempt timed out, prepare again to retry".to_string(),
            ));
        }
        let result = self.drive_completion();
        self.programming_pins = None;
        match result {
            Ok(pulses) => {
                self.state = FpgaState::Programmed;
                info!("programming complete, done rose after {pulses} completion pulses");
                Ok(())
            }
            // a timeout is not terminal: the configuration logic is still
            // listening, so the state survives for a retry
            Err(e @ SkFpgaError::ProgrammingTimeout { .. }) => {
                warn!("done never rose, the bitstream is likely bad or truncated");
                Err(e)
            }
            Err(e) => {
                self.state = FpgaState::Undefined;
                Err(e)
            }
        }
    }

    fn drive_completion(&self) -> Result<u32, SkFpgaError> {
        let pins = self.platform.pins();
        pins.set(Pin::Din, true)?;
        let mut pulses: u32 = 0;
        while !pins.get(Pin::Done)? {
            if pulses >= MAX_DONE_WAIT_PULSES {
                return Err(SkFpgaError::ProgrammingTimeout { pulses });
            }
            pins.set(Pin::Cclk, true)?;
            pins.set(Pin::Cclk, false)?;
            pulses += 1;
        }
        for _ in 0..SETTLE_CLOCK_PULSES {
            pins.set(Pin::Cclk, true)?;
            pins.set(Pin::Cclk, false)?;
        }
        Ok(pulses)
    }

    /// Program a complete bitstream file in one call.
    ///
    /// The file is validated before the part is touched, then streamed in
    /// scratch-sized chunks. Returns the number of bytes programmed.
    pub fn program_bitstream(&mut self, path: &Path) -> Result<u64, SkFpgaError> {
        info!("programming bitstream from {path:?}");
        let mut file = fs_open(path)?;
        self.prepare_to_program()?;
        let mut buf = vec![0u8; SCRATCH_CAPACITY];
        let mut total: u64 = 0;
        loop {
            let read = match fs_read_chunk(&mut file, path, &mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.abort_programming();
                    return Err(e);
                }
            };
            self.program_chunk(&buf[..read])?;
            total += read as u64;
        }
        self.finish_programming()?;
        info!("programmed {total} bytes from {path:?}");
        Ok(total)
    }

    pub(crate) fn abort_programming(&mut self) {
        warn!("programming aborted, releasing the configuration pins");
        self.programming_pins = None;
        self.state = FpgaState::Undefined;
    }
}

#[cfg(test)]
mod test_bit_shifting {
    use super::*;
    use crate::config::BoardConfig;
    use crate::platforms::simulated_components::sim_pins::SimPins;

    fn claimed_pins() -> SimPins {
        let pins = SimPins::new(&BoardConfig::defaults().pins);
        pins.claim(Pin::Din, PinDirection::OutputHigh).unwrap();
        pins.claim(Pin::Cclk, PinDirection::OutputLow).unwrap();
        pins
    }

    #[test]
    fn test_bits_leave_msb_first() {
        let pins = claimed_pins();
        shift_byte(&pins, 0xB0).unwrap();
        assert_eq!(
            pins.din_bits_at_cclk_rise(),
            vec![true, false, true, true, false, false, false, false]
        );
    }

    #[test]
    fn test_one_byte_is_sixteen_clock_transitions() {
        let pins = claimed_pins();
        shift_byte(&pins, 0xB0).unwrap();
        assert_eq!(pins.transition_count(Pin::Cclk), 16);
    }

    #[test]
    fn test_all_zero_and_all_one_bytes() {
        let pins = claimed_pins();
        shift_byte(&pins, 0x00).unwrap();
        shift_byte(&pins, 0xFF).unwrap();
        let bits = pins.din_bits_at_cclk_rise();
        assert_eq!(&bits[..8], &[false; 8]);
        assert_eq!(&bits[8..], &[true; 8]);
    }
}

#[cfg(test)]
mod test_programming_cycle {
    use super::*;
    use crate::device::address::AddressSelector;
    use crate::device::testing::{bring_up, small_board};
    use googletest::prelude::*;

    #[test]
    fn test_prepare_claims_pins_and_restarts_the_logic() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.prepare_to_program().unwrap();
        assert_eq!(fpga.state(), FpgaState::ReadyToProgram);
        for pin in [Pin::Prog, Pin::Cclk, Pin::Din, Pin::Done] {
            assert!(sim.sim_pins().is_claimed(pin), "{pin} not claimed");
        }
        let events = sim.sim_pins().set_events();
        let prog_levels: Vec<bool> = events
            .iter()
            .filter(|(pin, _)| *pin == Pin::Prog)
            .map(|(_, level)| *level)
            .collect();
        assert_eq!(prog_levels, vec![false, true]);
    }

    #[test]
    fn test_whole_cycle_reaches_programmed() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.prepare_to_program().unwrap();
        fpga.program_chunk(&[0xAA, 0x55]).unwrap();
        fpga.finish_programming().unwrap();
        assert_eq!(fpga.state(), FpgaState::Programmed);
        for pin in [Pin::Prog, Pin::Cclk, Pin::Din, Pin::Done] {
            assert!(!sim.sim_pins().is_claimed(pin), "{pin} still claimed");
        }
    }

    #[test]
    fn test_a_programmed_part_serves_data() {
        let (_sim, mut fpga) = bring_up(small_board());
        fpga.open_session(":1.7").unwrap();
        fpga.set_reset(false).unwrap();
        fpga.set_reset(true).unwrap();
        fpga.prepare_to_program().unwrap();
        fpga.program_chunk(&[0xAA, 0x55, 0x0F]).unwrap();
        fpga.finish_programming().unwrap();
        assert_eq!(fpga.state(), FpgaState::Programmed);

        fpga.set_selector(AddressSelector::Cs0);
        fpga.set_word(0x2000, 0x1055).unwrap();
        assert_eq!(fpga.get_word(0x2000).unwrap(), 0x1055);
    }

    #[test]
    fn test_completion_pulses_until_done_rises() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.prepare_to_program().unwrap();
        sim.sim_pins().set_done_after_pulses(20);
        fpga.program_chunk(&[0xFF]).unwrap();
        // 8 clock rises so far, done wants 20: 12 completion pulses
        sim.sim_pins().clear_events();
        fpga.finish_programming().unwrap();
        let expected = 2 * (12 + SETTLE_CLOCK_PULSES as usize);
        assert_eq!(sim.sim_pins().transition_count(Pin::Cclk), expected);
    }

    #[gtest]
    fn test_a_part_that_never_finishes_times_out() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.prepare_to_program().unwrap();
        sim.sim_pins().set_done_after_pulses(u32::MAX);
        fpga.program_chunk(&[0x00, 0x11, 0x22]).unwrap();

        let result = fpga.finish_programming();
        assert_that!(
            result,
            err(displays_as(contains_substring("ProgrammingTimeout")))
        );
        // the timeout edge: the state survives, the pins do not
        assert_eq!(fpga.state(), FpgaState::ReadyToProgram);
        for pin in [Pin::Prog, Pin::Cclk, Pin::Din, Pin::Done] {
            assert!(!sim.sim_pins().is_claimed(pin), "{pin} still claimed");
        }
        expect_that!(
            fpga.program_chunk(&[0xAA]),
            err(displays_as(contains_substring("prepare again")))
        );
        expect_that!(
            fpga.finish_programming(),
            err(displays_as(contains_substring("prepare again")))
        );

        // a retry from the top goes through
        sim.sim_pins().set_done_after_pulses(4);
        fpga.prepare_to_program().unwrap();
        fpga.program_chunk(&[0xAA]).unwrap();
        fpga.finish_programming().unwrap();
        assert_eq!(fpga.state(), FpgaState::Programmed);
    }

    #[gtest]
    fn test_pin_io_failure_leaves_the_device_undefined() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.prepare_to_program().unwrap();
        sim.sim_pins().fail_next_set("injected");

        let result = fpga.program_chunk(&[0xFF]);
        assert_that!(result, err(displays_as(contains_substring("injected"))));
        assert_eq!(fpga.state(), FpgaState::Undefined);
        assert!(!sim.sim_pins().is_claimed(Pin::Prog));

        // undefined refuses another session until reset is asserted
        expect_that!(
            fpga.prepare_to_program(),
            err(displays_as(contains_substring("assert reset")))
        );
        fpga.set_reset(false).unwrap();
        assert_eq!(fpga.state(), FpgaState::Reset);
        fpga.set_reset(true).unwrap();
        expect_that!(fpga.prepare_to_program(), ok(anything()));
    }

    #[gtest]
    fn test_data_outside_a_session_is_rejected() {
        let (_sim, mut fpga) = bring_up(small_board());
        expect_that!(
            fpga.program_chunk(&[0xAA]),
            err(displays_as(contains_substring("cannot accept bitstream data")))
        );
        expect_that!(
            fpga.finish_programming(),
            err(displays_as(contains_substring("nothing to finish")))
        );
    }

    #[test]
    fn test_prepare_twice_starts_over() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.prepare_to_program().unwrap();
        fpga.program_chunk(&[0xAA]).unwrap();
        fpga.prepare_to_program().unwrap();
        assert_eq!(fpga.state(), FpgaState::ReadyToProgram);
        // one prog pulse per prepare call
        let events = sim.sim_pins().set_events();
        let prog_lows = events
            .iter()
            .filter(|(pin, level)| *pin == Pin::Prog && !level)
            .count();
        assert_eq!(prog_lows, 2);
    }

    #[test]
    fn test_stream_write_feeds_the_pipeline_mid_programming() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.prepare_to_program().unwrap();
        // no selector is set and the chunk is byte-granular; neither
        // matters while the part is accepting configuration data
        assert_eq!(fpga.stream_write(0x0, &[0xB0]).unwrap(), 1);
        assert_eq!(
            sim.sim_pins().din_bits_at_cclk_rise(),
            vec![true, false, true, true, false, false, false, false]
        );
        fpga.finish_programming().unwrap();
        assert_eq!(fpga.state(), FpgaState::Programmed);
    }

    #[test]
    fn test_bitstream_file_end_to_end() {
        let (sim, mut fpga) = bring_up(small_board());
        let path = std::env::temp_dir().join("skfpgad-program-cycle.bin");
        let payload: Vec<u8> = (0u8..10).collect();
        std::fs::write(&path, &payload).unwrap();

        let programmed = fpga.program_bitstream(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(programmed, 10);
        assert_eq!(fpga.state(), FpgaState::Programmed);
        let bits = sim.sim_pins().din_bits_at_cclk_rise();
        // ten payload bytes, then the settle pulses with din held high
        assert_eq!(bits.len(), 80 + SETTLE_CLOCK_PULSES as usize);
        assert_eq!(&bits[..8], &[false; 8], "first byte is 0x00");
        assert!(bits[80..].iter().all(|bit| *bit));
    }

    #[gtest]
    fn test_a_missing_file_fails_before_touching_the_part() {
        let (sim, mut fpga) = bring_up(small_board());
        let result = fpga.program_bitstream(Path::new("/nonexistent/skfpgad/missing.bin"));
        assert_that!(result, err(displays_as(contains_substring("IORead"))));
        assert_eq!(fpga.state(), FpgaState::Reset);
        assert!(!sim.sim_pins().is_claimed(Pin::Prog));
        assert!(sim.sim_pins().set_events().is_empty());
    }
}
