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

//! The FPGA device aggregate.
//!
//! [`SkFpga`] owns everything the daemon holds on behalf of the board:
//! the chip-select window handles, the lifetime pin claims (`reset`,
//! `host_irq`, `fpga_irq`), the DMA scratch buffer, the exclusive client
//! session and the programming state. Every resource is held through a
//! value whose drop releases it, so a failed bring-up unwinds the parts
//! already acquired. The windows themselves are mapped on first use and
//! released again when the session closes; the hardware behind them keeps
//! its contents across those cycles.
//!
//! The programming operations live in [`crate::device::program`] and the
//! staged transfers in [`crate::device::dma`]; both are further `impl`
//! blocks on [`SkFpga`].

pub mod address;
pub mod dma;
pub mod notify;
pub mod program;
pub mod timings;

use crate::config::{BoardConfig, SCRATCH_CAPACITY};
use crate::device::address::{AddressSelector, ChipSelect, DataTarget, resolve_data_address};
use crate::device::notify::{FPGA_IRQ_POLL_INTERVAL, InterruptNotifier, watch_fpga_irq};
use crate::device::program::{FpgaState, ProgrammingPins};
use crate::device::timings::TimingConfig;
use crate::error::SkFpgaError;
use crate::platforms::platform::{MappedRegion, Pin, PinDirection, Platform};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One claimed pin, released again when the value is dropped.
pub(crate) struct ClaimedPin {
    platform: Arc<dyn Platform>,
    pin: Pin,
}

impl ClaimedPin {
    pub(crate) fn claim(
        platform: Arc<dyn Platform>,
        pin: Pin,
        direction: PinDirection,
    ) -> Result<Self, SkFpgaError> {
        platform.pins().claim(pin, direction)?;
        Ok(ClaimedPin { platform, pin })
    }
}

impl Drop for ClaimedPin {
    fn drop(&mut self) {
        if let Err(e) = self.platform.pins().release(self.pin) {
            warn!("failed to release pin {}: {e}", self.pin);
        }
    }
}

/// The board's FPGA with its windows, pins and client session.
pub struct SkFpga {
    pub(crate) config: BoardConfig,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) notifier: Arc<InterruptNotifier>,
    pub(crate) state: FpgaState,
    /// Held only between prepare and finish; dropping releases the pins.
    pub(crate) programming_pins: Option<ProgrammingPins>,
    pub(crate) selector: Option<AddressSelector>,
    /// Bus name of the client holding the exclusive session.
    pub(crate) session: Option<String>,
    pub(crate) dma_busy: bool,
    pub(crate) scratch: Vec<u8>,
    /// Window handles, mapped on first use and released with the session.
    pub(crate) cs0: Option<Box<dyn MappedRegion>>,
    pub(crate) cs1: Option<Box<dyn MappedRegion>>,
    irq_watch: Option<JoinHandle<()>>,
    _reset: ClaimedPin,
    _fpga_irq: ClaimedPin,
    _host_irq: ClaimedPin,
}

fn default_timings(config: &BoardConfig) -> TimingConfig {
    TimingConfig {
        setup: config.default_setup,
        pulse: config.default_pulse,
        cycle: config.default_cycle,
        mode: config.default_mode,
    }
}

impl SkFpga {
    /// Bring the device up: claim the lifetime pins, prepare the bus and
    /// program the default timings into both slots. The chip-select
    /// windows stay unmapped until a data command first needs one.
    ///
    /// Fails without leaking: everything acquired before the failing step
    /// is released on the way out.
    pub fn new(config: BoardConfig, platform: Arc<dyn Platform>) -> Result<SkFpga, SkFpgaError> {
        config.validate()?;
        info!(
            "bringing up {} with {} addressing on the {} platform",
            config.compatible,
            config.address_policy,
            platform.compatible()
        );
        let reset = ClaimedPin::claim(platform.clone(), Pin::Reset, PinDirection::OutputHigh)?;
        let fpga_irq = ClaimedPin::claim(platform.clone(), Pin::FpgaIrq, PinDirection::Input)?;
        let host_irq = ClaimedPin::claim(platform.clone(), Pin::HostIrq, PinDirection::OutputLow)?;
        platform.prepare_bus()?;
        timings::write_timings(platform.memory(), config.cs0_slot, &default_timings(&config))?;
        timings::write_timings(platform.memory(), config.cs1_slot, &default_timings(&config))?;
        info!("device up, bus prepared and default timings applied");
        Ok(SkFpga {
            config,
            platform,
            notifier: Arc::new(InterruptNotifier::new()),
            state: FpgaState::Reset,
            programming_pins: None,
            selector: None,
            session: None,
            dma_busy: false,
            scratch: vec![0u8; SCRATCH_CAPACITY],
            cs0: None,
            cs1: None,
            irq_watch: None,
            _reset: reset,
            _fpga_irq: fpga_irq,
            _host_irq: host_irq,
        })
    }

    /// The event channel completions and interrupts are published on.
    pub fn notifier(&self) -> Arc<InterruptNotifier> {
        self.notifier.clone()
    }

    /// Open the exclusive session for `owner`.
    pub fn open_session(&mut self, owner: &str) -> Result<(), SkFpgaError> {
        if let Some(existing) = &self.session {
            return Err(SkFpgaError::Busy(format!(
                "the device is already opened by {existing}"
            )));
        }
        self.session = Some(owner.to_string());
        info!("session opened by {owner}");
        Ok(())
    }

    /// Close `owner`'s session. The window mappings acquired on the way
    /// are released again; closing in the middle of a programming session
    /// also releases the configuration pins and falls back to the reset
    /// baseline.
    pub fn close_session(&mut self, owner: &str) -> Result<(), SkFpgaError> {
        match &self.session {
            None => Err(SkFpgaError::Session("the device is not open".to_string())),
            Some(existing) if existing != owner => Err(SkFpgaError::Session(format!(
                "the session belongs to {existing}"
            ))),
            Some(_) => {
                self.session = None;
                if self.state == FpgaState::ReadyToProgram {
                    warn!("session closed mid-programming, releasing the configuration pins");
                    self.programming_pins = None;
                    self.state = FpgaState::Reset;
                }
                if self.cs0.is_some() || self.cs1.is_some() {
                    debug!("unmapping the chip-select windows");
                    self.cs0 = None;
                    self.cs1 = None;
                }
                info!("session closed by {owner}");
                Ok(())
            }
        }
    }

    /// Check that `owner` holds the session, as every mutating command
    /// must.
    pub fn require_session(&self, owner: &str) -> Result<(), SkFpgaError> {
        match &self.session {
            Some(existing) if existing == owner => Ok(()),
            Some(existing) => Err(SkFpgaError::Session(format!(
                "the device is opened by {existing}"
            ))),
            None => Err(SkFpgaError::Session(
                "open the device before issuing commands".to_string(),
            )),
        }
    }

    pub fn set_selector(&mut self, selector: AddressSelector) {
        debug!("address selector set to {selector}");
        self.selector = Some(selector);
    }

    pub fn selector(&self) -> Option<AddressSelector> {
        self.selector
    }

    fn resolve(&self, addr: u32, len: u32) -> Result<DataTarget, SkFpgaError> {
        resolve_data_address(
            self.config.address_policy,
            self.selector,
            addr,
            len,
            self.config.window_size,
            self.scratch.len() as u32,
        )
    }

    /// Map the window behind `cs` if this is its first use.
    pub(crate) fn ensure_window(&mut self, cs: ChipSelect) -> Result<(), SkFpgaError> {
        let (slot, base, label) = match cs {
            ChipSelect::Cs0 => (&mut self.cs0, self.config.cs0_base, "cs0 window"),
            ChipSelect::Cs1 => (&mut self.cs1, self.config.cs1_base, "cs1 window"),
        };
        if slot.is_none() {
            debug!("mapping the {label} on first use");
            *slot = Some(
                self.platform
                    .memory()
                    .map(base, self.config.window_size, label)?,
            );
        }
        Ok(())
    }

    fn window(&mut self, cs: ChipSelect) -> Result<&dyn MappedRegion, SkFpgaError> {
        self.ensure_window(cs)?;
        match cs {
            ChipSelect::Cs0 => self.cs0.as_deref(),
            ChipSelect::Cs1 => self.cs1.as_deref(),
        }
        .ok_or_else(|| SkFpgaError::Internal(format!("the {cs} window is not mapped")))
    }

    /// Write one 16-bit word at a client data address.
    pub fn set_word(&mut self, addr: u32, value: u16) -> Result<(), SkFpgaError> {
        match self.resolve(addr, 2)? {
            DataTarget::Window(cs, offset) => self.window(cs)?.write_u16(offset, value),
            DataTarget::Scratch(offset) => {
                let at = offset as usize;
                self.scratch[at..at + 2].copy_from_slice(&value.to_le_bytes());
                Ok(())
            }
        }
    }

    /// Read one 16-bit word from a client data address.
    pub fn get_word(&mut self, addr: u32) -> Result<u16, SkFpgaError> {
        match self.resolve(addr, 2)? {
            DataTarget::Window(cs, offset) => self.window(cs)?.read_u16(offset),
            DataTarget::Scratch(offset) => {
                let at = offset as usize;
                Ok(u16::from_le_bytes([self.scratch[at], self.scratch[at + 1]]))
            }
        }
    }

    /// Write a chunk of 16-bit words starting at a client data address.
    /// Returns the number of bytes written.
    ///
    /// While a programming cycle is open the chunk goes to the bit-serial
    /// pipeline instead and `addr` is ignored.
    pub fn stream_write(&mut self, addr: u32, data: &[u8]) -> Result<u32, SkFpgaError> {
        if data.len() > SCRATCH_CAPACITY {
            return Err(SkFpgaError::Argument(format!(
                "chunk of {:#x} bytes exceeds the {SCRATCH_CAPACITY:#x} byte transfer limit",
                data.len()
            )));
        }
        let len = data.len() as u32;
        if self.state == FpgaState::ReadyToProgram {
            self.program_chunk(data)?;
            return Ok(len);
        }
        match self.resolve(addr, len)? {
            DataTarget::Window(cs, offset) => {
                let region = self.window(cs)?;
                for (i, pair) in data.chunks_exact(2).enumerate() {
                    let word = u16::from_le_bytes([pair[0], pair[1]]);
                    region.write_u16(offset + (2 * i) as u32, word)?;
                }
            }
            DataTarget::Scratch(offset) => {
                let at = offset as usize;
                self.scratch[at..at + data.len()].copy_from_slice(data);
            }
        }
        Ok(len)
    }

    /// Read `len` bytes of 16-bit words starting at a client data address.
    pub fn stream_read(&mut self, addr: u32, len: u32) -> Result<Vec<u8>, SkFpgaError> {
        if len as usize > SCRATCH_CAPACITY {
            return Err(SkFpgaError::Argument(format!(
                "chunk of {len:#x} bytes exceeds the {SCRATCH_CAPACITY:#x} byte transfer limit"
            )));
        }
        let mut out = vec![0u8; len as usize];
        match self.resolve(addr, len)? {
            DataTarget::Window(cs, offset) => {
                let region = self.window(cs)?;
                for i in (0..len).step_by(2) {
                    let word = region.read_u16(offset + i)?;
                    let at = i as usize;
                    out[at..at + 2].copy_from_slice(&word.to_le_bytes());
                }
            }
            DataTarget::Scratch(offset) => {
                let at = offset as usize;
                out.copy_from_slice(&self.scratch[at..at + len as usize]);
            }
        }
        Ok(out)
    }

    /// Program one timing slot of the static memory controller.
    pub fn set_timings(&self, slot: u8, values: &TimingConfig) -> Result<(), SkFpgaError> {
        timings::write_timings(self.platform.memory(), slot, values)
    }

    /// Read one timing slot back from the controller.
    pub fn get_timings(&self, slot: u8) -> Result<TimingConfig, SkFpgaError> {
        timings::read_timings(self.platform.memory(), slot)
    }

    /// Drive the reset line. The line is active low; driving it low
    /// returns the device to the reset baseline from any state, dropping
    /// an interrupted programming session on the way.
    pub fn set_reset(&mut self, level: bool) -> Result<(), SkFpgaError> {
        self.platform.pins().set(Pin::Reset, level)?;
        if !level {
            if self.programming_pins.is_some() {
                warn!("reset asserted mid-programming, releasing the configuration pins");
                self.programming_pins = None;
            }
            self.state = FpgaState::Reset;
        }
        Ok(())
    }

    pub fn reset_level(&self) -> Result<bool, SkFpgaError> {
        self.platform.pins().get(Pin::Reset)
    }

    /// Drive the interrupt line going from the host to the FPGA design.
    pub fn set_host_irq(&self, level: bool) -> Result<(), SkFpgaError> {
        self.platform.pins().set(Pin::HostIrq, level)
    }

    pub fn host_irq_level(&self) -> Result<bool, SkFpgaError> {
        self.platform.pins().get(Pin::HostIrq)
    }

    /// Sample the interrupt line driven by the FPGA design.
    pub fn fpga_irq_level(&self) -> Result<bool, SkFpgaError> {
        self.platform.pins().get(Pin::FpgaIrq)
    }

    /// Start polling the FPGA interrupt line, publishing an event per
    /// rising edge. Returns whether a new watcher was started; calling
    /// again while one runs is a no-op.
    pub fn enable_irq_watch(&mut self) -> Result<bool, SkFpgaError> {
        if let Some(handle) = &self.irq_watch {
            if !handle.is_finished() {
                debug!("interrupt watcher already running");
                return Ok(false);
            }
        }
        self.irq_watch = Some(tokio::spawn(watch_fpga_irq(
            self.platform.clone(),
            self.notifier.clone(),
            FPGA_IRQ_POLL_INTERVAL,
        )));
        info!("interrupt watcher enabled");
        Ok(true)
    }

    /// Stop the interrupt watcher. Returns `true` when a running watcher
    /// was actually stopped.
    pub fn disable_irq_watch(&mut self) -> bool {
        match self.irq_watch.take() {
            Some(watch) if !watch.is_finished() => {
                watch.abort();
                info!("interrupt watcher disabled");
                true
            }
            _ => false,
        }
    }

    /// Physical placement of the window the selector points at, for
    /// clients that map the bus themselves. The window is mapped before
    /// the placement is handed out, so the bus timings behind it are live.
    pub fn window_placement(&mut self) -> Result<(u32, u32), SkFpgaError> {
        match self.selector {
            None => Err(SkFpgaError::State(
                "no address selector has been set".to_string(),
            )),
            Some(AddressSelector::Cs0) => {
                self.ensure_window(ChipSelect::Cs0)?;
                Ok((self.config.cs0_base, self.config.window_size))
            }
            Some(AddressSelector::Cs1) => {
                self.ensure_window(ChipSelect::Cs1)?;
                Ok((self.config.cs1_base, self.config.window_size))
            }
            Some(AddressSelector::Dma) => Err(SkFpgaError::Argument(
                "the scratch buffer has no physical address".to_string(),
            )),
        }
    }

    /// Key-value description of the board and the device's current state.
    pub fn board_info(&self) -> Vec<(String, String)> {
        let selector = match self.selector {
            Some(selector) => selector.to_string(),
            None => "unset".to_string(),
        };
        let session = match &self.session {
            Some(owner) => owner.clone(),
            None => "none".to_string(),
        };
        [
            ("compatible", self.config.compatible.clone()),
            ("platform", self.platform.compatible().to_string()),
            ("window_size", format!("{:#x}", self.config.window_size)),
            ("cs0_base", format!("{:#010x}", self.config.cs0_base)),
            ("cs1_base", format!("{:#010x}", self.config.cs1_base)),
            ("cs0_slot", self.config.cs0_slot.to_string()),
            ("cs1_slot", self.config.cs1_slot.to_string()),
            ("clock_rate", self.config.clock_rate.to_string()),
            ("address_policy", self.config.address_policy.to_string()),
            ("state", self.state.to_string()),
            ("selector", selector),
            ("session", session),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl Drop for SkFpga {
    fn drop(&mut self) {
        if let Some(handle) = self.irq_watch.take() {
            handle.abort();
        }
        debug!("FPGA device released");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::platforms::simulated::SimulatedPlatform;

    /// Board description with windows small enough for test backings.
    pub(crate) fn small_board() -> BoardConfig {
        let mut config = BoardConfig::defaults();
        config.window_size = 0x4000;
        config
    }

    /// A device on a fresh simulated platform, keeping the typed platform
    /// handle around for waveform and memory inspection.
    pub(crate) fn bring_up(config: BoardConfig) -> (Arc<SimulatedPlatform>, SkFpga) {
        let sim = Arc::new(SimulatedPlatform::new(&config));
        let platform: Arc<dyn Platform> = sim.clone();
        let fpga = SkFpga::new(config, platform).unwrap();
        (sim, fpga)
    }
}

#[cfg(test)]
mod test_bring_up {
    use super::testing::{bring_up, small_board};
    use super::*;
    use crate::platforms::platform::PinController;
    use crate::platforms::simulated::SimulatedPlatform;
    use googletest::prelude::*;

    #[test]
    fn test_lifetime_pins_and_bus_preparation() {
        let (sim, _fpga) = bring_up(small_board());
        assert!(sim.sim_pins().is_claimed(Pin::Reset));
        assert!(sim.sim_pins().is_claimed(Pin::FpgaIrq));
        assert!(sim.sim_pins().is_claimed(Pin::HostIrq));
        assert_eq!(sim.sim_pins().level(Pin::Reset), Some(true));
        assert_eq!(sim.sim_pins().level(Pin::HostIrq), Some(false));
        assert_eq!(sim.bus_prepare_calls(), 1);
    }

    #[test]
    fn test_default_timings_land_in_both_slots() {
        let (_sim, fpga) = bring_up(small_board());
        let expected = TimingConfig {
            setup: fpga.config.default_setup,
            pulse: fpga.config.default_pulse,
            cycle: fpga.config.default_cycle,
            mode: fpga.config.default_mode,
        };
        assert_eq!(fpga.get_timings(fpga.config.cs0_slot).unwrap(), expected);
        assert_eq!(fpga.get_timings(fpga.config.cs1_slot).unwrap(), expected);
    }

    #[gtest]
    fn test_bring_up_surfaces_a_bus_map_failure() {
        let config = small_board();
        let sim = Arc::new(SimulatedPlatform::new(&config));
        // first mapping at bring-up is the timing controller block
        sim.sim_memory().fail_next_map("injected");
        let platform: Arc<dyn Platform> = sim.clone();
        let result = SkFpga::new(config, platform);
        expect_that!(
            result.as_ref().map(|_| ()),
            err(displays_as(contains_substring("smc: injected")))
        );
        assert!(!sim.sim_pins().is_claimed(Pin::Reset));
        assert!(!sim.sim_pins().is_claimed(Pin::FpgaIrq));
    }

    #[test]
    fn test_failed_bring_up_leaves_nothing_claimed() {
        let config = small_board();
        let sim = Arc::new(SimulatedPlatform::new(&config));
        // occupy the reset line so the claim step fails
        sim.sim_pins()
            .claim(Pin::Reset, PinDirection::OutputHigh)
            .unwrap();
        let platform: Arc<dyn Platform> = sim.clone();
        assert!(SkFpga::new(config, platform).is_err());
        assert!(!sim.sim_pins().is_claimed(Pin::FpgaIrq));
        assert!(!sim.sim_pins().is_claimed(Pin::HostIrq));

        sim.sim_pins().release(Pin::Reset).unwrap();
        let platform: Arc<dyn Platform> = sim.clone();
        assert!(SkFpga::new(small_board(), platform).is_ok());
    }
}

#[cfg(test)]
mod test_sessions {
    use super::testing::{bring_up, small_board};
    use super::*;
    use googletest::prelude::*;

    #[gtest]
    fn test_second_open_is_refused_naming_the_owner() {
        let (_sim, mut fpga) = bring_up(small_board());
        fpga.open_session(":1.7").unwrap();
        let result = fpga.open_session(":1.8");
        assert_that!(result, err(displays_as(contains_substring(":1.7"))));
    }

    #[gtest]
    fn test_commands_require_the_session() {
        let (_sim, mut fpga) = bring_up(small_board());
        expect_that!(
            fpga.require_session(":1.7"),
            err(displays_as(contains_substring("open the device")))
        );
        fpga.open_session(":1.7").unwrap();
        expect_that!(fpga.require_session(":1.7"), ok(anything()));
        expect_that!(
            fpga.require_session(":1.8"),
            err(displays_as(contains_substring(":1.7")))
        );
    }

    #[gtest]
    fn test_close_by_a_stranger_is_refused() {
        let (_sim, mut fpga) = bring_up(small_board());
        fpga.open_session(":1.7").unwrap();
        let result = fpga.close_session(":1.8");
        assert_that!(result, err(displays_as(contains_substring(":1.7"))));
        assert_that!(fpga.close_session(":1.7"), ok(anything()));
        // and after closing the session can change hands
        assert_that!(fpga.open_session(":1.8"), ok(anything()));
    }

    #[test]
    fn test_close_mid_programming_releases_the_pins() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.open_session(":1.7").unwrap();
        fpga.prepare_to_program().unwrap();
        assert!(sim.sim_pins().is_claimed(Pin::Prog));

        fpga.close_session(":1.7").unwrap();
        assert_eq!(fpga.state(), FpgaState::Reset);
        assert!(!sim.sim_pins().is_claimed(Pin::Prog));
        assert!(!sim.sim_pins().is_claimed(Pin::Done));
    }

    #[test]
    fn test_windows_release_with_the_session() {
        let (_sim, mut fpga) = bring_up(small_board());
        fpga.open_session(":1.7").unwrap();
        fpga.set_selector(AddressSelector::Cs0);
        fpga.set_word(0x40, 0x1055).unwrap();
        assert!(fpga.cs0.is_some());

        fpga.close_session(":1.7").unwrap();
        assert!(fpga.cs0.is_none());
        assert!(fpga.cs1.is_none());

        // the bus keeps its contents, only the local mapping went away
        fpga.open_session(":1.8").unwrap();
        assert_eq!(fpga.get_word(0x40).unwrap(), 0x1055);
    }
}


#[cfg(test)]
mod test_linear_addressing {
    use super::testing::{bring_up, small_board};
    use super::*;
    use crate::config::AddressPolicy;
    use googletest::prelude::*;

    fn linear_board() -> BoardConfig {
        let mut config = small_board();
        config.address_policy = AddressPolicy::Linear;
        config
    }

    #[test]
    fn test_addresses_fold_across_both_windows() {
        let (sim, mut fpga) = bring_up(linear_board());
        fpga.set_word(0x0, 0xAAAA).unwrap();
        fpga.set_word(0x4000, 0xBBBB).unwrap();
        assert_eq!(fpga.get_word(0x0).unwrap(), 0xAAAA);
        assert_eq!(fpga.get_word(0x4000).unwrap(), 0xBBBB);
        // the upper half landed in the cs1 range, not at cs0 offset 0x4000
        let cs1_base = fpga.config.cs1_base;
        assert!(sim.sim_memory().write_count(cs1_base) > 0);
    }

    #[gtest]
    fn test_ranges_crossing_the_window_boundary_are_rejected() {
        let (_sim, mut fpga) = bring_up(linear_board());
        let result = fpga.stream_write(0x3FFE, &[1, 2, 3, 4]);
        assert_that!(
            result,
            err(displays_as(contains_substring("crosses the window boundary")))
        );
    }
}

#[cfg(test)]
mod test_reset_line {
    use super::testing::{bring_up, small_board};
    use super::*;

    #[test]
    fn test_reset_assert_returns_to_baseline() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.set_reset(false).unwrap();
        assert_eq!(sim.sim_pins().level(Pin::Reset), Some(false));
        assert_eq!(fpga.state(), FpgaState::Reset);
        fpga.set_reset(true).unwrap();
        assert!(fpga.reset_level().unwrap());
        assert_eq!(fpga.state(), FpgaState::Reset);
    }

    #[test]
    fn test_reset_drops_an_open_programming_session() {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.prepare_to_program().unwrap();
        assert!(sim.sim_pins().is_claimed(Pin::Cclk));
        fpga.set_reset(false).unwrap();
        assert_eq!(fpga.state(), FpgaState::Reset);
        assert!(!sim.sim_pins().is_claimed(Pin::Cclk));
    }

    #[test]
    fn test_host_irq_line_follows_commands() {
        let (_sim, fpga) = bring_up(small_board());
        assert!(!fpga.host_irq_level().unwrap());
        fpga.set_host_irq(true).unwrap();
        assert!(fpga.host_irq_level().unwrap());
        fpga.set_host_irq(false).unwrap();
        assert!(!fpga.host_irq_level().unwrap());
    }
}

#[cfg(test)]
mod test_irq_watch {
    use super::testing::{bring_up, small_board};
    use super::*;
    use crate::device::notify::DriverEvent;
    use googletest::prelude::*;
    use std::time::Duration;

    #[gtest]
    #[tokio::test]
    async fn test_enable_is_idempotent() {
        let (_sim, mut fpga) = bring_up(small_board());
        assert_that!(fpga.enable_irq_watch(), ok(eq(&true)));
        assert_that!(fpga.enable_irq_watch(), ok(eq(&false)));
    }

    #[gtest]
    #[tokio::test]
    async fn test_disable_stops_the_watcher() {
        let (_sim, mut fpga) = bring_up(small_board());
        assert!(!fpga.disable_irq_watch(), "nothing to stop yet");
        fpga.enable_irq_watch().unwrap();
        assert!(fpga.disable_irq_watch());
        assert!(!fpga.disable_irq_watch());
        // arming again after a stop starts a fresh watcher
        assert_that!(fpga.enable_irq_watch(), ok(eq(&true)));
    }

    #[gtest]
    #[tokio::test]
    async fn test_rising_edge_reaches_subscribers() {
        let (sim, mut fpga) = bring_up(small_board());
        let mut events = fpga.notifier().subscribe();
        fpga.enable_irq_watch().unwrap();

        sim.raise_fpga_irq(true);
        let event = tokio::time::timeout(Duration::from_millis(500), events.recv()).await;
        assert_that!(event.unwrap(), ok(eq(&DriverEvent::FpgaInterrupt)));
    }
}
