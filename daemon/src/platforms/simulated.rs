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

//! Simulated platform implementation.
//!
//! This platform drives no hardware at all. Pins are recorded by
//! [`SimPins`] and memory accesses land in [`SimMemory`] heap buffers. It
//! serves two purposes:
//!
//! - **Fallback** - when the board's compatibility string matches no
//!   registered platform the daemon comes up on this one, keeping the whole
//!   command surface exercisable on a development host.
//! - **Test backend** - the driver test suites construct it directly and
//!   inspect the recorded pin waveforms and memory contents.
//!
//! # Registration
//!
//! Registered under the compatibility string "simulated" at daemon startup;
//! a board description with `compatible = "simulated"` selects it
//! explicitly.

use crate::config::BoardConfig;
use crate::error::SkFpgaError;
use crate::platforms::platform::{
    MemoryMapper, Pin, PinController, Platform, register_platform,
};
use crate::platforms::simulated_components::sim_memory::SimMemory;
use crate::platforms::simulated_components::sim_pins::SimPins;
use log::trace;
use std::sync::atomic::{AtomicU32, Ordering};

/// Platform implementation backed entirely by process memory.
#[derive(Debug)]
pub struct SimulatedPlatform {
    pins: SimPins,
    memory: SimMemory,
    bus_prepare_calls: AtomicU32,
}

impl SimulatedPlatform {
    pub fn new(config: &BoardConfig) -> Self {
        trace!("creating new simulated platform");
        SimulatedPlatform {
            pins: SimPins::new(&config.pins),
            memory: SimMemory::new(),
            bus_prepare_calls: AtomicU32::new(0),
        }
    }

    /// Constructor with the signature the platform registry stores.
    pub fn construct(config: &BoardConfig) -> Result<Box<dyn Platform>, SkFpgaError> {
        Ok(Box::new(SimulatedPlatform::new(config)))
    }

    pub fn register() {
        register_platform("simulated", SimulatedPlatform::construct);
    }

    /// Typed access to the recording pin controller, for test inspection.
    pub fn sim_pins(&self) -> &SimPins {
        &self.pins
    }

    /// Typed access to the memory backing, for test inspection.
    pub fn sim_memory(&self) -> &SimMemory {
        &self.memory
    }

    /// How many times [`Platform::prepare_bus`] ran.
    pub fn bus_prepare_calls(&self) -> u32 {
        self.bus_prepare_calls.load(Ordering::Relaxed)
    }

    /// Inject an external interrupt level, as the FPGA design would drive it.
    pub fn raise_fpga_irq(&self, level: bool) {
        self.pins.drive_input(Pin::FpgaIrq, level);
    }
}

impl Platform for SimulatedPlatform {
    fn compatible(&self) -> &'static str {
        "simulated"
    }

    fn pins(&self) -> &dyn PinController {
        &self.pins
    }

    fn memory(&self) -> &dyn MemoryMapper {
        &self.memory
    }

    fn prepare_bus(&self) -> Result<(), SkFpgaError> {
        self.bus_prepare_calls.fetch_add(1, Ordering::Relaxed);
        trace!("simulated platform: bus preparation recorded");
        Ok(())
    }
}
