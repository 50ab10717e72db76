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

//! Staged transfers between the scratch buffer and the memory windows.
//!
//! The board has no descriptor-based DMA engine visible from here; a
//! transfer is a word-by-word copy between the in-daemon scratch buffer
//! and one chip-select window. Transfers run either synchronously inside
//! the calling command or asynchronously on a worker task, in which case
//! the outcome arrives as a [`DriverEvent::DmaComplete`] notification
//! only. At most one transfer is in flight at a time.

use crate::device::address::{ChipSelect, DataTarget, resolve_data_address};
use crate::device::SkFpga;
use crate::device::notify::DriverEvent;
use crate::error::SkFpgaError;
use crate::platforms::platform::MappedRegion;
use log::{debug, trace};
use std::str::FromStr;

/// Direction of a staged transfer, named from the FPGA's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// Scratch buffer contents go out to the window.
    ToFpga,
    /// Window contents come back into the scratch buffer.
    FromFpga,
}

impl std::fmt::Display for DmaDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DmaDirection::ToFpga => write!(f, "to-fpga"),
            DmaDirection::FromFpga => write!(f, "from-fpga"),
        }
    }
}

impl FromStr for DmaDirection {
    type Err = SkFpgaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to-fpga" => Ok(DmaDirection::ToFpga),
            "from-fpga" => Ok(DmaDirection::FromFpga),
            other => Err(SkFpgaError::Argument(format!(
                "unknown transfer direction {other:?}, expected to-fpga or from-fpga"
            ))),
        }
    }
}

impl SkFpga {
    /// Run a transfer synchronously. The completion notification is
    /// published as well, so observers see the same events in both modes.
    pub fn dma_copy(
        &mut self,
        addr: u32,
        len: u32,
        direction: DmaDirection,
    ) -> Result<u32, SkFpgaError> {
        if self.dma_busy {
            return Err(SkFpgaError::Busy(
                "another DMA transfer is in flight".to_string(),
            ));
        }
        self.dma_execute(addr, len, direction)
    }

    /// Validate and reserve an asynchronous transfer. The caller is
    /// expected to run [`SkFpga::run_reserved_dma`] with the same
    /// parameters on a worker task.
    pub fn reserve_dma(
        &mut self,
        addr: u32,
        len: u32,
        direction: DmaDirection,
    ) -> Result<(), SkFpgaError> {
        if self.dma_busy {
            return Err(SkFpgaError::Busy(
                "another DMA transfer is in flight".to_string(),
            ));
        }
        // resolve now so the requester gets argument errors immediately
        self.dma_target(addr, len)?;
        self.dma_busy = true;
        trace!("reserved {direction} transfer of {len:#x} bytes at {addr:#010x}");
        Ok(())
    }

    /// Run a transfer reserved by [`SkFpga::reserve_dma`] and release the
    /// reservation.
    pub fn run_reserved_dma(
        &mut self,
        addr: u32,
        len: u32,
        direction: DmaDirection,
    ) -> Result<u32, SkFpgaError> {
        self.dma_busy = false;
        self.dma_execute(addr, len, direction)
    }

    fn dma_execute(
        &mut self,
        addr: u32,
        len: u32,
        direction: DmaDirection,
    ) -> Result<u32, SkFpgaError> {
        let result = self.dma_words(addr, len, direction);
        self.notifier.publish(DriverEvent::DmaComplete {
            addr,
            len,
            direction,
            outcome: result.as_ref().copied().map_err(|e| e.to_string()),
        });
        result
    }

    /// Resolve the window side of a transfer, rejecting scratch targets
    /// and lengths the scratch buffer cannot stage.
    fn dma_target(&self, addr: u32, len: u32) -> Result<(ChipSelect, u32), SkFpgaError> {
        if len as usize > self.scratch.len() {
            return Err(SkFpgaError::Argument(format!(
                "transfer of {len:#x} bytes exceeds the {:#x} byte scratch buffer",
                self.scratch.len()
            )));
        }
        let target = resolve_data_address(
            self.config.address_policy,
            self.selector,
            addr,
            len,
            self.config.window_size,
            self.scratch.len() as u32,
        )?;
        match target {
            DataTarget::Window(cs, offset) => Ok((cs, offset)),
            DataTarget::Scratch(_) => Err(SkFpgaError::Argument(
                "DMA transfers must target a chip-select window, not the scratch buffer"
                    .to_string(),
            )),
        }
    }

    fn dma_words(
        &mut self,
        addr: u32,
        len: u32,
        direction: DmaDirection,
    ) -> Result<u32, SkFpgaError> {
        let (cs, offset) = self.dma_target(addr, len)?;
        self.ensure_window(cs)?;
        // field borrow, so the scratch buffer stays reachable in the loop
        let region: &dyn MappedRegion = match cs {
            ChipSelect::Cs0 => self.cs0.as_deref(),
            ChipSelect::Cs1 => self.cs1.as_deref(),
        }
        .ok_or_else(|| SkFpgaError::Internal(format!("the {cs} window is not mapped")))?;
        for i in (0..len).step_by(2) {
            let at = i as usize;
            match direction {
                DmaDirection::ToFpga => {
                    let word = u16::from_le_bytes([self.scratch[at], self.scratch[at + 1]]);
                    region.write_u16(offset + i, word)?;
                }
                DmaDirection::FromFpga => {
                    let word = region.read_u16(offset + i)?;
                    self.scratch[at..at + 2].copy_from_slice(&word.to_le_bytes());
                }
            }
        }
        debug!("{direction} transfer of {len:#x} bytes at {addr:#010x} complete");
        Ok(len)
    }
}

#[cfg(test)]
mod test_direction_names {
    use super::*;

    #[test]
    fn direction_names_round_trip() {
        for direction in [DmaDirection::ToFpga, DmaDirection::FromFpga] {
            assert_eq!(
                DmaDirection::from_str(&direction.to_string()).unwrap(),
                direction
            );
        }
        assert!(DmaDirection::from_str("sideways").is_err());
    }
}

#[cfg(test)]
mod test_transfers {
    use super::*;
    use crate::config::SCRATCH_CAPACITY;
    use crate::device::address::AddressSelector;
    use crate::device::testing::{bring_up, small_board};
    use crate::platforms::simulated::SimulatedPlatform;
    use googletest::prelude::*;
    use std::sync::Arc;

    /// Device with the selector already pointing at the cs1 window.
    fn transfer_device() -> (Arc<SimulatedPlatform>, SkFpga) {
        let (sim, mut fpga) = bring_up(small_board());
        fpga.set_selector(AddressSelector::Cs1);
        (sim, fpga)
    }

    #[test]
    fn test_to_fpga_moves_the_scratch_buffer_into_the_window() {
        let (_sim, mut fpga) = transfer_device();
        let payload = [0x10, 0x32, 0x54, 0x76];
        fpga.scratch[..4].copy_from_slice(&payload);

        assert_eq!(fpga.dma_copy(0x40, 4, DmaDirection::ToFpga).unwrap(), 4);
        assert_eq!(fpga.get_word(0x40).unwrap(), 0x3210);
        assert_eq!(fpga.get_word(0x42).unwrap(), 0x7654);
    }

    #[test]
    fn test_from_fpga_fills_the_scratch_buffer() {
        let (_sim, mut fpga) = transfer_device();
        fpga.set_word(0x80, 0xBEEF).unwrap();
        fpga.set_word(0x82, 0xF00D).unwrap();

        assert_eq!(fpga.dma_copy(0x80, 4, DmaDirection::FromFpga).unwrap(), 4);
        assert_eq!(&fpga.scratch[..2], &0xBEEFu16.to_le_bytes());
        assert_eq!(&fpga.scratch[2..4], &0xF00Du16.to_le_bytes());
    }

    #[gtest]
    fn test_reserved_transfers_hold_the_busy_flag() {
        let (_sim, mut fpga) = transfer_device();
        fpga.reserve_dma(0x0, 8, DmaDirection::ToFpga).unwrap();
        expect_that!(
            fpga.dma_copy(0x0, 8, DmaDirection::ToFpga),
            err(displays_as(contains_substring("Busy")))
        );
        expect_that!(
            fpga.reserve_dma(0x100, 8, DmaDirection::ToFpga),
            err(displays_as(contains_substring("Busy")))
        );
        assert_that!(
            fpga.run_reserved_dma(0x0, 8, DmaDirection::ToFpga),
            ok(eq(&8))
        );
        // the reservation is gone once the transfer ran
        expect_that!(fpga.dma_copy(0x0, 8, DmaDirection::ToFpga), ok(anything()));
    }

    #[test]
    fn test_every_transfer_publishes_a_completion() {
        let (_sim, mut fpga) = transfer_device();
        let mut events = fpga.notifier().subscribe();

        fpga.dma_copy(0x20, 2, DmaDirection::FromFpga).unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            DriverEvent::DmaComplete {
                addr: 0x20,
                len: 2,
                direction: DmaDirection::FromFpga,
                outcome: Ok(2),
            }
        );

        fpga.reserve_dma(0x20, 2, DmaDirection::ToFpga).unwrap();
        fpga.run_reserved_dma(0x20, 2, DmaDirection::ToFpga).unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            DriverEvent::DmaComplete {
                addr: 0x20,
                len: 2,
                direction: DmaDirection::ToFpga,
                outcome: Ok(2),
            }
        );
    }

    #[test]
    fn test_completions_report_the_byte_count() {
        let (_sim, mut fpga) = transfer_device();
        let mut events = fpga.notifier().subscribe();

        // three words move as six bytes and the payload counts bytes
        fpga.dma_copy(0x10, 6, DmaDirection::FromFpga).unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            DriverEvent::DmaComplete {
                addr: 0x10,
                len: 6,
                direction: DmaDirection::FromFpga,
                outcome: Ok(6),
            }
        );
    }

    #[gtest]
    fn test_scratch_targets_are_refused() {
        let (_sim, mut fpga) = transfer_device();
        fpga.set_selector(AddressSelector::Dma);
        let result = fpga.dma_copy(0x0, 4, DmaDirection::ToFpga);
        assert_that!(
            result,
            err(displays_as(contains_substring("chip-select window")))
        );
    }

    #[gtest]
    fn test_oversized_transfers_are_refused_up_front() {
        let (_sim, mut fpga) = transfer_device();
        let result = fpga.reserve_dma(0x0, (SCRATCH_CAPACITY + 2) as u32, DmaDirection::ToFpga);
        assert_that!(
            result,
            err(displays_as(contains_substring("scratch buffer")))
        );
        // a failed reservation does not leave the device busy
        expect_that!(fpga.dma_copy(0x0, 2, DmaDirection::ToFpga), ok(anything()));
    }
}
