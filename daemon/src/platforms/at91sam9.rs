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

//! Platform implementation for AT91SAM9 boards.
//!
//! Targets the StarterKit SK-AT91SAM9M10G45EK carrier with its Spartan-6
//! on the external bus interface. Pins go through the sysfs GPIO backend
//! and register windows through `/dev/mem`.
//!
//! # Bus preparation
//!
//! On this SoC the CS1 chip select powers up assigned to the SDRAM
//! controller. [`Platform::prepare_bus`] flips the assignment bit in the
//! bus matrix EBICSA register so CS1 decodes as a static-memory window,
//! which is where the second FPGA window lives.

use crate::config::BoardConfig;
use crate::error::SkFpgaError;
use crate::platforms::at91sam9_components::devmem::DevMemMapper;
use crate::platforms::at91sam9_components::sysfs_gpio::SysfsGpio;
use crate::platforms::platform::{
    MemoryMapper, PinController, Platform, register_platform,
};
use log::{info, trace};

/// Physical base of the AT91SAM9G45 bus matrix block.
const MATRIX_BASE: u32 = 0xFFFF_EA00;
/// Byte length of the bus matrix block.
const MATRIX_SPAN: u32 = 0x200;
/// Offset of the chip-select assignment register inside the matrix block.
const MATRIX_EBICSA_OFFSET: u32 = 0x128;
/// EBICSA bit assigning CS1 to the SDRAM controller; cleared for SMC use.
const EBICSA_CS1_SDRAM: u32 = 1 << 1;

const COMPATIBLE: &str = "sk,at91-xc6slx";

/// Platform implementation for the AT91SAM9 external bus interface.
#[derive(Debug)]
pub struct At91Sam9Platform {
    pins: SysfsGpio,
    memory: DevMemMapper,
}

impl At91Sam9Platform {
    pub fn new(config: &BoardConfig) -> Self {
        trace!("creating new at91sam9 platform");
        At91Sam9Platform {
            pins: SysfsGpio::new(&config.pins),
            memory: DevMemMapper::new(),
        }
    }

    /// Constructor with the signature the platform registry stores.
    pub fn construct(config: &BoardConfig) -> Result<Box<dyn Platform>, SkFpgaError> {
        Ok(Box::new(At91Sam9Platform::new(config)))
    }

    pub fn register() {
        register_platform(COMPATIBLE, At91Sam9Platform::construct);
    }
}

impl Platform for At91Sam9Platform {
    fn compatible(&self) -> &'static str {
        COMPATIBLE
    }

    fn pins(&self) -> &dyn PinController {
        &self.pins
    }

    fn memory(&self) -> &dyn MemoryMapper {
        &self.memory
    }

    fn prepare_bus(&self) -> Result<(), SkFpgaError> {
        let matrix = self.memory.map(MATRIX_BASE, MATRIX_SPAN, "bus matrix")?;
        let ebicsa = matrix.read_u32(MATRIX_EBICSA_OFFSET)?;
        matrix.write_u32(MATRIX_EBICSA_OFFSET, ebicsa & !EBICSA_CS1_SDRAM)?;
        info!(
            "assigned CS1 to the static memory controller (EBICSA {ebicsa:#010x} -> {:#010x})",
            ebicsa & !EBICSA_CS1_SDRAM
        );
        Ok(())
    }
}
