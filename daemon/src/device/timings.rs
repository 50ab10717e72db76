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

//! Static memory controller timing access.
//!
//! Each chip select has a timing slot of four 32-bit registers in the SMC
//! block: setup, pulse, cycle and mode, at a fixed stride. Writing a slot
//! is exactly four register stores and no read-modify-write, so a full
//! [`TimingConfig`] is always supplied. The SMC block is mapped only for
//! the duration of one access.

use crate::error::SkFpgaError;
use crate::platforms::platform::MemoryMapper;
use log::debug;

/// Physical base of the static memory controller block.
const SMC_BASE: u32 = 0xFFFF_E800;
/// Byte length of the static memory controller block.
const SMC_SPAN: u32 = 0xFF;
/// Byte distance between consecutive timing slots.
const SMC_SLOT_STRIDE: u32 = 0x10;
const SMC_SETUP_OFFSET: u32 = 0x00;
const SMC_PULSE_OFFSET: u32 = 0x04;
const SMC_CYCLE_OFFSET: u32 = 0x08;
const SMC_MODE_OFFSET: u32 = 0x0C;
/// Timing slots on this controller, one per static chip select.
pub const SMC_SLOT_COUNT: u8 = 6;

/// One chip select's complete timing register set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub setup: u32,
    pub pulse: u32,
    pub cycle: u32,
    pub mode: u32,
}

fn slot_base(slot: u8) -> Result<u32, SkFpgaError> {
    if slot >= SMC_SLOT_COUNT {
        return Err(SkFpgaError::Argument(format!(
            "timing slot {slot} does not exist, the controller has {SMC_SLOT_COUNT} slots"
        )));
    }
    Ok(SMC_SLOT_STRIDE * u32::from(slot))
}

/// Program one timing slot. Performs exactly four 32-bit register writes.
pub fn write_timings(
    memory: &dyn MemoryMapper,
    slot: u8,
    timings: &TimingConfig,
) -> Result<(), SkFpgaError> {
    let base = slot_base(slot)?;
    let smc = memory.map(SMC_BASE, SMC_SPAN, "smc")?;
    smc.write_u32(base + SMC_SETUP_OFFSET, timings.setup)?;
    smc.write_u32(base + SMC_PULSE_OFFSET, timings.pulse)?;
    smc.write_u32(base + SMC_CYCLE_OFFSET, timings.cycle)?;
    smc.write_u32(base + SMC_MODE_OFFSET, timings.mode)?;
    debug!("programmed timing slot {slot}: {timings:x?}");
    Ok(())
}

/// Read one timing slot back from the controller.
pub fn read_timings(memory: &dyn MemoryMapper, slot: u8) -> Result<TimingConfig, SkFpgaError> {
    let base = slot_base(slot)?;
    let smc = memory.map(SMC_BASE, SMC_SPAN, "smc")?;
    Ok(TimingConfig {
        setup: smc.read_u32(base + SMC_SETUP_OFFSET)?,
        pulse: smc.read_u32(base + SMC_PULSE_OFFSET)?,
        cycle: smc.read_u32(base + SMC_CYCLE_OFFSET)?,
        mode: smc.read_u32(base + SMC_MODE_OFFSET)?,
    })
}

#[cfg(test)]
mod test_timings {
    use super::*;
    use crate::platforms::simulated_components::sim_memory::SimMemory;
    use googletest::prelude::*;

    const SAMPLE: TimingConfig = TimingConfig {
        setup: 0x0101_0101,
        pulse: 0x0A0A_0A0A,
        cycle: 0x000E_000E,
        mode: 0x3 | 1 << 12,
    };

    #[gtest]
    fn written_timings_read_back_identically() {
        let memory = SimMemory::new();
        write_timings(&memory, 1, &SAMPLE).expect("write succeeds");
        assert_that!(read_timings(&memory, 1), ok(eq(&SAMPLE)));
    }

    #[gtest]
    fn writing_a_slot_is_exactly_four_stores() {
        let memory = SimMemory::new();
        write_timings(&memory, 0, &SAMPLE).expect("write succeeds");
        expect_that!(memory.write_count(SMC_BASE), eq(4));
    }

    #[gtest]
    fn slots_do_not_overlap() {
        let memory = SimMemory::new();
        let other = TimingConfig {
            setup: 0x0202_0202,
            pulse: 0x0B0B_0B0B,
            cycle: 0x001E_001E,
            mode: 0x3,
        };
        write_timings(&memory, 0, &SAMPLE).expect("write succeeds");
        write_timings(&memory, 1, &other).expect("write succeeds");
        expect_that!(read_timings(&memory, 0), ok(eq(&SAMPLE)));
        expect_that!(read_timings(&memory, 1), ok(eq(&other)));
    }

    #[gtest]
    fn slots_beyond_the_controller_are_rejected() {
        let memory = SimMemory::new();
        assert_that!(
            write_timings(&memory, SMC_SLOT_COUNT, &SAMPLE),
            err(displays_as(contains_substring("does not exist")))
        );
        assert_that!(
            read_timings(&memory, u8::MAX),
            err(displays_as(contains_substring("does not exist")))
        );
    }
}
