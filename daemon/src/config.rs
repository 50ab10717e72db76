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

//! Board description and fixed system paths.
//!
//! The daemon drives exactly one board, described by a [`BoardConfig`] record
//! that is loaded once at startup and treated as immutable afterwards. The
//! record is assembled from three layers: built-in defaults for the
//! SK-AT91SAM9M10G45EK-XC6SLX board, the vendor file under
//! [`VENDOR_CONFIG_PATH`], and the user file under [`USER_CONFIG_PATH`].
//! User values win over vendor values, which win over the defaults, merged
//! field by field.

use crate::error::SkFpgaError;
use crate::system_io::fs_read;
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// The sysfs GPIO control directory used by the sysfs pin backend.
/// Typically `/sys/class/gpio/`.
pub static GPIO_CONTROL_DIR: &str = "/sys/class/gpio/";

/// The physical-memory device node used by the register-window mapper.
pub static DEV_MEM_PATH: &str = "/dev/mem";

/// Vendor layer of the board description, shipped with the package.
pub static VENDOR_CONFIG_PATH: &str = "/usr/lib/skfpgad/board.toml";

/// User layer of the board description. Values set here override the vendor
/// file and the built-in defaults.
pub static USER_CONFIG_PATH: &str = "/etc/skfpgad/board.toml";

/// Well-known bus name the daemon claims on the system bus.
pub static DBUS_SERVICE_NAME: &str = "com.canonical.skfpgad";

/// Object path of the read-only status interface.
pub static DBUS_STATUS_PATH: &str = "/com/canonical/skfpgad/status";

/// Object path of the mutating control interface.
pub static DBUS_CONTROL_PATH: &str = "/com/canonical/skfpgad/control";

/// Capacity of the staging buffer shared by the streaming path, the
/// bitstream loader and DMA payloads. Streamed chunks and DMA transfers are
/// rejected when they exceed this.
pub const SCRATCH_CAPACITY: usize = 4096;

const DEFAULT_COMPATIBLE: &str = "sk,at91-xc6slx";
const DEFAULT_WINDOW_SIZE: u32 = 0x0100_0000;
const DEFAULT_CS0_BASE: u32 = 0x1000_0000;
const DEFAULT_CS1_BASE: u32 = 0x2000_0000;
const DEFAULT_CS0_SLOT: u8 = 0;
const DEFAULT_CS1_SLOT: u8 = 1;
const DEFAULT_CLOCK_RATE: u32 = 133_333_333;
const DEFAULT_SETUP: u32 = 0x0101_0101;
const DEFAULT_PULSE: u32 = 0x0A0A_0A0A;
const DEFAULT_CYCLE: u32 = 0x000E_000E;
const DEFAULT_MODE: u32 = 0x3 | 1 << 12;

const DEFAULT_PIN_PROG: u32 = 104;
const DEFAULT_PIN_CCLK: u32 = 105;
const DEFAULT_PIN_DIN: u32 = 106;
const DEFAULT_PIN_RESET: u32 = 107;
const DEFAULT_PIN_DONE: u32 = 108;
const DEFAULT_PIN_HOST_IRQ: u32 = 109;
const DEFAULT_PIN_FPGA_IRQ: u32 = 110;

/// How a logical data address picks a chip-select window.
///
/// `Explicit` uses the device's address selector and a 0-based offset per
/// window; `Linear` folds both windows into one doubled address space with
/// CS1 occupying the upper half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressPolicy {
    #[default]
    Explicit,
    Linear,
}

impl std::fmt::Display for AddressPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressPolicy::Explicit => write!(f, "explicit"),
            AddressPolicy::Linear => write!(f, "linear"),
        }
    }
}

/// GPIO line number for each control-pin role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinAssignments {
    pub reset: u32,
    pub prog: u32,
    pub cclk: u32,
    pub din: u32,
    pub done: u32,
    pub host_irq: u32,
    pub fpga_irq: u32,
}

/// The complete, validated board description.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Device-tree style compatible string used for platform matching.
    pub compatible: String,
    /// Byte size of each chip-select memory window.
    pub window_size: u32,
    /// Physical base address of the CS0 window.
    pub cs0_base: u32,
    /// Physical base address of the CS1 window.
    pub cs1_base: u32,
    /// Static memory controller timing slot backing CS0.
    pub cs0_slot: u8,
    /// Static memory controller timing slot backing CS1.
    pub cs1_slot: u8,
    /// External bus clock rate in Hz, informational.
    pub clock_rate: u32,
    pub address_policy: AddressPolicy,
    pub pins: PinAssignments,
    /// Timing register values programmed into both slots at startup.
    pub default_setup: u32,
    pub default_pulse: u32,
    pub default_cycle: u32,
    pub default_mode: u32,
}

/// Top level of the on-disk TOML layout; every section is optional.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    board: Option<BoardSection>,
    pins: Option<PinsSection>,
    timings: Option<TimingsSection>,
}

#[derive(Debug, Default, Deserialize)]
struct BoardSection {
    compatible: Option<String>,
    window_size: Option<u32>,
    cs0_base: Option<u32>,
    cs1_base: Option<u32>,
    cs0_slot: Option<u8>,
    cs1_slot: Option<u8>,
    clock_rate: Option<u32>,
    address_policy: Option<AddressPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct PinsSection {
    reset: Option<u32>,
    prog: Option<u32>,
    cclk: Option<u32>,
    din: Option<u32>,
    done: Option<u32>,
    host_irq: Option<u32>,
    fpga_irq: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingsSection {
    setup: Option<u32>,
    pulse: Option<u32>,
    cycle: Option<u32>,
    mode: Option<u32>,
}

impl BoardSection {
    fn merge(self, fallback: BoardSection) -> BoardSection {
        BoardSection {
            compatible: self.compatible.or(fallback.compatible),
            window_size: self.window_size.or(fallback.window_size),
            cs0_base: self.cs0_base.or(fallback.cs0_base),
            cs1_base: self.cs1_base.or(fallback.cs1_base),
            cs0_slot: self.cs0_slot.or(fallback.cs0_slot),
            cs1_slot: self.cs1_slot.or(fallback.cs1_slot),
            clock_rate: self.clock_rate.or(fallback.clock_rate),
            address_policy: self.address_policy.or(fallback.address_policy),
        }
    }
}

impl PinsSection {
    fn merge(self, fallback: PinsSection) -> PinsSection {
        PinsSection {
            reset: self.reset.or(fallback.reset),
            prog: self.prog.or(fallback.prog),
            cclk: self.cclk.or(fallback.cclk),
            din: self.din.or(fallback.din),
            done: self.done.or(fallback.done),
            host_irq: self.host_irq.or(fallback.host_irq),
            fpga_irq: self.fpga_irq.or(fallback.fpga_irq),
        }
    }
}

impl TimingsSection {
    fn merge(self, fallback: TimingsSection) -> TimingsSection {
        TimingsSection {
            setup: self.setup.or(fallback.setup),
            pulse: self.pulse.or(fallback.pulse),
            cycle: self.cycle.or(fallback.cycle),
            mode: self.mode.or(fallback.mode),
        }
    }
}

impl TomlConfig {
    fn merge(self, fallback: TomlConfig) -> TomlConfig {
        TomlConfig {
            board: match (self.board, fallback.board) {
                (Some(a), Some(b)) => Some(a.merge(b)),
                (a, b) => a.or(b),
            },
            pins: match (self.pins, fallback.pins) {
                (Some(a), Some(b)) => Some(a.merge(b)),
                (a, b) => a.or(b),
            },
            timings: match (self.timings, fallback.timings) {
                (Some(a), Some(b)) => Some(a.merge(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

fn toml_str_to_config(toml_string: &str, origin: &Path) -> Result<TomlConfig, SkFpgaError> {
    toml::from_str(toml_string).map_err(|e| SkFpgaError::TomlDe {
        file: origin.into(),
        e,
    })
}

/// Read one config layer, treating a missing file as an empty layer.
/// A file that exists but does not parse is a fatal configuration error.
fn read_config_layer(file_path: &Path) -> Result<TomlConfig, SkFpgaError> {
    if !file_path.is_file() {
        debug!("No config file at {file_path:?}, skipping layer");
        return Ok(TomlConfig::default());
    }
    toml_str_to_config(&fs_read(file_path)?, file_path)
}

impl BoardConfig {
    /// The built-in description of the reference board.
    pub fn defaults() -> BoardConfig {
        BoardConfig {
            compatible: DEFAULT_COMPATIBLE.to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
            cs0_base: DEFAULT_CS0_BASE,
            cs1_base: DEFAULT_CS1_BASE,
            cs0_slot: DEFAULT_CS0_SLOT,
            cs1_slot: DEFAULT_CS1_SLOT,
            clock_rate: DEFAULT_CLOCK_RATE,
            address_policy: AddressPolicy::default(),
            pins: PinAssignments {
                reset: DEFAULT_PIN_RESET,
                prog: DEFAULT_PIN_PROG,
                cclk: DEFAULT_PIN_CCLK,
                din: DEFAULT_PIN_DIN,
                done: DEFAULT_PIN_DONE,
                host_irq: DEFAULT_PIN_HOST_IRQ,
                fpga_irq: DEFAULT_PIN_FPGA_IRQ,
            },
            default_setup: DEFAULT_SETUP,
            default_pulse: DEFAULT_PULSE,
            default_cycle: DEFAULT_CYCLE,
            default_mode: DEFAULT_MODE,
        }
    }

    /// Load the board description from the standard locations, user layer
    /// over vendor layer over the built-in defaults.
    pub fn load() -> Result<BoardConfig, SkFpgaError> {
        let vendor = read_config_layer(Path::new(VENDOR_CONFIG_PATH))?;
        let user = read_config_layer(Path::new(USER_CONFIG_PATH))?;
        let config = BoardConfig::from_toml(user.merge(vendor))?;
        debug!("Loaded board config: {config:?}");
        Ok(config)
    }

    fn from_toml(toml: TomlConfig) -> Result<BoardConfig, SkFpgaError> {
        let board = toml.board.unwrap_or_default();
        let pins = toml.pins.unwrap_or_default();
        let timings = toml.timings.unwrap_or_default();
        let defaults = BoardConfig::defaults();
        let config = BoardConfig {
            compatible: board.compatible.unwrap_or(defaults.compatible),
            window_size: board.window_size.unwrap_or(defaults.window_size),
            cs0_base: board.cs0_base.unwrap_or(defaults.cs0_base),
            cs1_base: board.cs1_base.unwrap_or(defaults.cs1_base),
            cs0_slot: board.cs0_slot.unwrap_or(defaults.cs0_slot),
            cs1_slot: board.cs1_slot.unwrap_or(defaults.cs1_slot),
            clock_rate: board.clock_rate.unwrap_or(defaults.clock_rate),
            address_policy: board.address_policy.unwrap_or(defaults.address_policy),
            pins: PinAssignments {
                reset: pins.reset.unwrap_or(defaults.pins.reset),
                prog: pins.prog.unwrap_or(defaults.pins.prog),
                cclk: pins.cclk.unwrap_or(defaults.pins.cclk),
                din: pins.din.unwrap_or(defaults.pins.din),
                done: pins.done.unwrap_or(defaults.pins.done),
                host_irq: pins.host_irq.unwrap_or(defaults.pins.host_irq),
                fpga_irq: pins.fpga_irq.unwrap_or(defaults.pins.fpga_irq),
            },
            default_setup: timings.setup.unwrap_or(defaults.default_setup),
            default_pulse: timings.pulse.unwrap_or(defaults.default_pulse),
            default_cycle: timings.cycle.unwrap_or(defaults.default_cycle),
            default_mode: timings.mode.unwrap_or(defaults.default_mode),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject descriptions the driver cannot safely operate on.
    pub fn validate(&self) -> Result<(), SkFpgaError> {
        if self.window_size == 0 || self.window_size & 0x1 != 0 {
            return Err(SkFpgaError::Config(format!(
                "window size {:#x} must be a non-zero even byte count",
                self.window_size
            )));
        }
        let cs0 = self.cs0_base as u64..self.cs0_base as u64 + self.window_size as u64;
        let cs1 = self.cs1_base as u64..self.cs1_base as u64 + self.window_size as u64;
        if cs0.contains(&cs1.start) || cs1.contains(&cs0.start) {
            return Err(SkFpgaError::Config(format!(
                "chip-select windows overlap: cs0 {:#010x} and cs1 {:#010x} with size {:#x}",
                self.cs0_base, self.cs1_base, self.window_size
            )));
        }
        let lines = [
            self.pins.reset,
            self.pins.prog,
            self.pins.cclk,
            self.pins.din,
            self.pins.done,
            self.pins.host_irq,
            self.pins.fpga_irq,
        ];
        for (i, line) in lines.iter().enumerate() {
            if lines[i + 1..].contains(line) {
                return Err(SkFpgaError::Config(format!(
                    "GPIO line {line} is assigned to more than one pin role"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_board_config {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    fn parse(s: &str) -> TomlConfig {
        toml_str_to_config(s, Path::new("test.toml")).expect("test input must parse")
    }

    #[gtest]
    fn defaults_pass_validation() {
        expect_that!(BoardConfig::defaults().validate(), ok(anything()));
    }

    #[gtest]
    fn user_layer_wins_per_field() {
        let user = parse("[board]\nwindow_size = 0x2000\n");
        let vendor = parse("[board]\nwindow_size = 0x4000\ncs1_base = 0x30000000\n");
        let config = BoardConfig::from_toml(user.merge(vendor)).expect("merge result is valid");
        expect_that!(config.window_size, eq(0x2000));
        expect_that!(config.cs1_base, eq(0x3000_0000));
        // untouched fields fall through to the built-in defaults
        expect_that!(config.cs0_base, eq(DEFAULT_CS0_BASE));
    }

    #[gtest]
    fn address_policy_parses_from_lowercase_name() {
        let config = BoardConfig::from_toml(parse("[board]\naddress_policy = \"linear\"\n"))
            .expect("policy name is valid");
        expect_that!(config.address_policy, eq(AddressPolicy::Linear));
    }

    #[gtest]
    fn bad_toml_is_a_parse_error() {
        let result = toml_str_to_config("[board\nwindow_size = 1", Path::new("broken.toml"));
        assert_that!(result, err(displays_as(contains_substring("broken.toml"))));
    }

    #[gtest]
    #[rstest]
    #[case::zero_window("[board]\nwindow_size = 0\n", "non-zero even")]
    #[case::odd_window("[board]\nwindow_size = 0x1001\n", "non-zero even")]
    #[case::overlapping_windows(
        "[board]\ncs0_base = 0x10000000\ncs1_base = 0x10001000\n",
        "windows overlap"
    )]
    #[case::duplicate_pin("[pins]\nreset = 104\n", "more than one pin role")]
    fn invalid_descriptions_are_rejected(#[case] toml: &str, #[case] message: &str) {
        let result = BoardConfig::from_toml(parse(toml));
        assert_that!(result, err(displays_as(contains_substring(message))));
    }
}
