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

//! Control-pin access through the sysfs GPIO interface.
//!
//! Each claim exports the line under `/sys/class/gpio/` and writes its
//! direction file; outputs are configured with the `high`/`low` direction
//! tokens so the line comes up at its initial level without glitching
//! through the opposite state. Releasing unexports the line again.

use crate::config::{GPIO_CONTROL_DIR, PinAssignments};
use crate::error::SkFpgaError;
use crate::platforms::platform::{Pin, PinController, PinDirection};
use crate::system_io::{fs_read, fs_write};
use log::{trace, warn};
use std::path::PathBuf;

fn direction_token(direction: PinDirection) -> &'static str {
    match direction {
        PinDirection::Input => "in",
        PinDirection::OutputHigh => "high",
        PinDirection::OutputLow => "low",
    }
}

/// A [`PinController`] over the kernel's sysfs GPIO interface.
#[derive(Debug)]
pub struct SysfsGpio {
    assignments: PinAssignments,
    control_dir: PathBuf,
}

impl SysfsGpio {
    pub fn new(assignments: &PinAssignments) -> Self {
        SysfsGpio {
            assignments: assignments.clone(),
            control_dir: PathBuf::from(GPIO_CONTROL_DIR),
        }
    }

    fn line_dir(&self, line: u32) -> PathBuf {
        self.control_dir.join(format!("gpio{line}"))
    }

    fn line_file(&self, line: u32, file: &str) -> PathBuf {
        self.line_dir(line).join(file)
    }

    fn write_direction(&self, line: u32, direction: PinDirection) -> Result<(), SkFpgaError> {
        fs_write(
            &self.line_file(line, "direction"),
            false,
            direction_token(direction),
        )
    }
}

impl PinController for SysfsGpio {
    fn claim(&self, pin: Pin, direction: PinDirection) -> Result<(), SkFpgaError> {
        let line = pin.line(&self.assignments);
        if self.line_dir(line).is_dir() {
            // a previous daemon instance went down without unexporting
            warn!("GPIO line {line} for pin {pin} is already exported, adopting it");
        } else if let Err(e) = fs_write(&self.control_dir.join("export"), false, line.to_string()) {
            return Err(SkFpgaError::PinClaim {
                pin,
                reason: format!("exporting line {line} failed: {e}"),
            });
        }
        if let Err(e) = self.write_direction(line, direction) {
            if let Err(unexport_err) =
                fs_write(&self.control_dir.join("unexport"), false, line.to_string())
            {
                warn!("could not unexport line {line} after failed claim: {unexport_err}");
            }
            return Err(SkFpgaError::PinClaim {
                pin,
                reason: format!("configuring line {line} failed: {e}"),
            });
        }
        trace!("claimed pin {pin} on line {line} as {}", direction_token(direction));
        Ok(())
    }

    fn release(&self, pin: Pin) -> Result<(), SkFpgaError> {
        let line = pin.line(&self.assignments);
        if !self.line_dir(line).is_dir() {
            trace!("pin {pin} on line {line} is not exported, nothing to release");
            return Ok(());
        }
        fs_write(&self.control_dir.join("unexport"), false, line.to_string())
    }

    fn set_direction(&self, pin: Pin, direction: PinDirection) -> Result<(), SkFpgaError> {
        self.write_direction(pin.line(&self.assignments), direction)
    }

    fn set(&self, pin: Pin, value: bool) -> Result<(), SkFpgaError> {
        let line = pin.line(&self.assignments);
        fs_write(
            &self.line_file(line, "value"),
            false,
            if value { "1" } else { "0" },
        )
    }

    fn get(&self, pin: Pin) -> Result<bool, SkFpgaError> {
        let line = pin.line(&self.assignments);
        let raw = fs_read(&self.line_file(line, "value"))?;
        match raw.trim_end_matches(['\n', '\0']) {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(SkFpgaError::Internal(format!(
                "unexpected value {other:?} for pin {pin} on line {line}"
            ))),
        }
    }
}
