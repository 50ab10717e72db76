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

//! Platform abstraction layer for board access.
//!
//! This module defines the trait system that separates the driver logic from
//! the way a concrete board exposes its pins and register windows. The
//! platform system uses a registry-based approach where platform
//! implementations register themselves with compatibility strings in the
//! Linux device tree style, and the board description selects one at startup.
//!
//! # Architecture
//!
//! The platform abstraction consists of three leaf traits plus one umbrella:
//! - [`PinController`] - claim, drive and sample the named control pins
//! - [`MappedRegion`] - one mapped physical register or memory window
//! - [`MemoryMapper`] - produce [`MappedRegion`]s for physical ranges
//! - [`Platform`] - bundles the above and hooks bus preparation
//!
//! # Platform Discovery
//!
//! At startup the daemon matches the board's `compatible` string against the
//! registered platform compatibility strings. Compatibility strings can
//! include comma-separated components, all of which must match for a platform
//! to be selected. When nothing matches, the daemon falls back to the
//! simulated platform so that the full command surface stays exercisable on a
//! development host.

use crate::config::{BoardConfig, PinAssignments};
use crate::error::SkFpgaError;
use crate::platforms::simulated::SimulatedPlatform;
use log::{trace, warn};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};

/// Type alias for platform constructor functions.
///
/// Platform constructors receive the board description and return a boxed
/// [`Platform`] trait object. These functions are stored in the platform
/// registry and called once a compatibility string has been matched.
pub type PlatformConstructor = fn(&BoardConfig) -> Result<Box<dyn Platform>, SkFpgaError>;

/// Global registry of platform implementations.
///
/// Maps compatibility strings to platform constructor functions. It is filled
/// at daemon startup via [`register_platform`] and queried through
/// [`platform_for_board`].
pub static PLATFORM_REGISTRY: OnceLock<Mutex<HashMap<&'static str, PlatformConstructor>>> =
    OnceLock::new();

/// The FPGA control pins, named for their role on the board rather than
/// their GPIO line number. The serial-configuration pins (`Prog`, `Cclk`,
/// `Din`, `Done`) are only claimed while a programming session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    Reset,
    HostIrq,
    FpgaIrq,
    Prog,
    Cclk,
    Din,
    Done,
}

impl Pin {
    /// Look up the GPIO line backing this role in the board description.
    pub fn line(self, pins: &PinAssignments) -> u32 {
        match self {
            Pin::Reset => pins.reset,
            Pin::HostIrq => pins.host_irq,
            Pin::FpgaIrq => pins.fpga_irq,
            Pin::Prog => pins.prog,
            Pin::Cclk => pins.cclk,
            Pin::Din => pins.din,
            Pin::Done => pins.done,
        }
    }
}

impl std::fmt::Display for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Pin::Reset => "reset",
            Pin::HostIrq => "host_irq",
            Pin::FpgaIrq => "fpga_irq",
            Pin::Prog => "prog",
            Pin::Cclk => "cclk",
            Pin::Din => "din",
            Pin::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Requested configuration of a pin at claim time or reconfiguration.
///
/// Outputs are claimed with their initial level folded in so the line never
/// glitches through the wrong state between claim and first write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    OutputHigh,
    OutputLow,
}

/// Trait for claiming and driving the board's control pins.
///
/// A pin must be claimed before any other operation on it; operating on an
/// unclaimed pin is an [`SkFpgaError::PinClaim`] error, as is claiming a line
/// that another role already holds.
pub trait PinController: Send + Sync {
    /// Claim the GPIO line behind `pin` and configure it.
    ///
    /// # Returns: `Result<(), SkFpgaError>`
    /// * `Ok(())` - Pin claimed and configured
    /// * `Err(SkFpgaError::PinClaim)` - Line busy or claim rejected by the backend
    fn claim(&self, pin: Pin, direction: PinDirection) -> Result<(), SkFpgaError>;

    /// Release a previously claimed pin. Releasing an unclaimed pin is not an
    /// error so that teardown paths can release unconditionally.
    fn release(&self, pin: Pin) -> Result<(), SkFpgaError>;

    /// Reconfigure a claimed pin without releasing it.
    fn set_direction(&self, pin: Pin, direction: PinDirection) -> Result<(), SkFpgaError>;

    /// Drive a claimed output pin to `value`.
    fn set(&self, pin: Pin, value: bool) -> Result<(), SkFpgaError>;

    /// Sample the current level of a claimed pin.
    fn get(&self, pin: Pin) -> Result<bool, SkFpgaError>;
}

/// One mapped physical range, unmapped when the value is dropped.
///
/// Accesses are offset-based against the start of the region. All
/// implementations reject accesses that leave the region or that are torn
/// across the 16-bit bus lanes; see [`bounds_check`].
pub trait MappedRegion: Send + Sync {
    /// Physical base address this region was mapped at.
    fn phys_base(&self) -> u32;

    /// Byte length of the region.
    fn span(&self) -> u32;

    fn read_u16(&self, offset: u32) -> Result<u16, SkFpgaError>;

    fn write_u16(&self, offset: u32, value: u16) -> Result<(), SkFpgaError>;

    fn read_u32(&self, offset: u32) -> Result<u32, SkFpgaError>;

    fn write_u32(&self, offset: u32, value: u32) -> Result<(), SkFpgaError>;
}

/// Trait for mapping physical address ranges into the daemon.
pub trait MemoryMapper: Send + Sync {
    /// Map `span` bytes starting at `phys_base`. The `label` names the range
    /// in logs and errors, e.g. `"cs0 window"` or `"smc"`.
    ///
    /// # Returns: `Result<Box<dyn MappedRegion>, SkFpgaError>`
    /// * `Ok(region)` - Live mapping, released on drop
    /// * `Err(SkFpgaError::Map)` - The backend could not map the range
    fn map(
        &self,
        phys_base: u32,
        span: u32,
        label: &str,
    ) -> Result<Box<dyn MappedRegion>, SkFpgaError>;
}

/// Trait representing a complete board access implementation.
///
/// The trait extends `Any` to allow for runtime type checking and
/// downcasting, which the tests use to reach into the simulated backend.
pub trait Platform: Any + Send + Sync {
    /// The compatibility string this platform was registered under.
    fn compatible(&self) -> &'static str;

    fn pins(&self) -> &dyn PinController;

    fn memory(&self) -> &dyn MemoryMapper;

    /// One-time bus preparation, run at bring-up before the first timing
    /// values are written. On AT91 boards this hands the CS1 chip-select
    /// to the external bus interface; the simulated platform records the
    /// call and does nothing.
    fn prepare_bus(&self) -> Result<(), SkFpgaError>;
}

/// Validate an access of `width` bytes at `offset` against a region of
/// `span` bytes.
///
/// # Returns: `Result<(), SkFpgaError>`
/// * `Ok(())` - Access lies inside the region and respects the bus alignment
/// * `Err(SkFpgaError::OutOfRange)` - Access crosses the end of the region
/// * `Err(SkFpgaError::Misaligned)` - Offset is not a multiple of the width
pub fn bounds_check(span: u32, offset: u32, width: u32) -> Result<(), SkFpgaError> {
    if offset % width != 0 {
        return Err(SkFpgaError::Misaligned { addr: offset });
    }
    match offset.checked_add(width) {
        Some(end) if end <= span => Ok(()),
        _ => Err(SkFpgaError::OutOfRange {
            addr: offset,
            len: width,
            bound: span,
        }),
    }
}

/// Physical ranges with a live mapping, shared between a [`MemoryMapper`]
/// and the regions it has handed out.
///
/// Mappers reserve a range before mapping and the region releases it again
/// on drop, so overlapping ranges can never be live at the same time and a
/// failed map leaves no reservation behind.
pub type LiveRanges = Arc<Mutex<Vec<(u32, u32)>>>;

/// Reserve `span` bytes at `phys_base` against the live set.
///
/// # Returns: `Result<(), SkFpgaError>`
/// * `Ok(())` - Range reserved, release with [`release_range`]
/// * `Err(SkFpgaError::Busy)` - The range overlaps a live mapping
///
/// # Panics
///
/// Panics if the range lock is poisoned (should never happen in normal
/// operation).
pub fn reserve_range(
    live: &LiveRanges,
    phys_base: u32,
    span: u32,
    label: &str,
) -> Result<(), SkFpgaError> {
    let mut ranges = live.lock().expect("couldnt get live mapping ranges");
    for &(base, len) in ranges.iter() {
        if (phys_base as u64) < base as u64 + len as u64
            && (base as u64) < phys_base as u64 + span as u64
        {
            return Err(SkFpgaError::Busy(format!(
                "{label}: {span:#x} bytes at {phys_base:#010x} overlap the \
                live mapping at {base:#010x}+{len:#x}"
            )));
        }
    }
    ranges.push((phys_base, span));
    Ok(())
}

/// Release a reservation made by [`reserve_range`]. Releasing a range that
/// is not reserved is a no-op so drop paths can release unconditionally.
///
/// # Panics
///
/// Panics if the range lock is poisoned (should never happen in normal
/// operation).
pub fn release_range(live: &LiveRanges, phys_base: u32, span: u32) {
    let mut ranges = live.lock().expect("couldnt get live mapping ranges");
    if let Some(at) = ranges.iter().position(|&range| range == (phys_base, span)) {
        ranges.swap_remove(at);
    }
}

/// Match a platform compatibility string to a registered platform.
///
/// The matching is done by splitting both strings on commas and ensuring
/// ***all*** components in the query string are present in the registered
/// compatibility string, mirroring how device tree compatible lists are
/// matched.
///
/// # Returns: `Result<PlatformConstructor, SkFpgaError>`
/// * `Ok(constructor)` - Constructor for the first matching platform
/// * `Err(SkFpgaError::Internal)` - Registry not initialized or lock failure
/// * `Err(SkFpgaError::Argument)` - No matching platform found
fn match_platform_string(platform_string: &str) -> Result<PlatformConstructor, SkFpgaError> {
    let registry = PLATFORM_REGISTRY
        .get()
        .ok_or(SkFpgaError::Internal(String::from(
            "couldn't get PLATFORM_REGISTRY",
        )))?
        .lock()
        .map_err(|_| SkFpgaError::Internal(String::from("couldn't lock PLATFORM_REGISTRY")))?;

    for (compat_string, platform_constructor) in registry.iter() {
        let compat_set: HashSet<&str> = compat_string.split(',').collect();
        let compat_found = platform_string.split(',').all(|x| compat_set.contains(x));
        if compat_found {
            return Ok(*platform_constructor);
        }
    }

    Err(SkFpgaError::Argument(format!(
        "skfpgad could not match {platform_string} to a known platform."
    )))
}

/// Construct the platform for a board description.
///
/// Matches the board's `compatible` string against the registry; if no
/// registered platform matches, falls back to the simulated platform with a
/// warning so that the daemon always comes up.
///
/// # Returns: `Result<Box<dyn Platform>, SkFpgaError>`
/// * `Ok(Box<dyn Platform>)` - Platform instance (matched or simulated fallback)
/// * `Err(SkFpgaError)` - The matched platform refused the board description
pub fn platform_for_board(config: &BoardConfig) -> Result<Box<dyn Platform>, SkFpgaError> {
    trace!("Matching board compatible string: '{}'", config.compatible);
    match match_platform_string(&config.compatible) {
        Ok(constructor) => constructor(config),
        Err(_) => {
            warn!(
                "{} not supported. Defaulting to simulated platform.",
                config.compatible
            );
            SimulatedPlatform::construct(config)
        }
    }
}

/// Initialize the platform registry.
///
/// Called automatically by [`register_platform`] via `OnceLock::get_or_init`.
pub fn init_platform_registry() -> Mutex<HashMap<&'static str, PlatformConstructor>> {
    Mutex::new(HashMap::new())
}

/// Register a platform implementation in the global registry.
///
/// The compatibility string should be a comma-separated list of components
/// that match the device tree compatible property. Platforms are registered
/// at daemon startup before the board description is matched.
///
/// # Panics
///
/// Panics if the registry lock is poisoned (should never happen in normal
/// operation).
pub fn register_platform(compatible: &'static str, constructor: PlatformConstructor) {
    let mut registry = PLATFORM_REGISTRY
        .get_or_init(init_platform_registry)
        .lock()
        .expect("couldnt get PLATFORM_REGISTRY");

    registry.insert(compatible, constructor);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_registry() {
        register_platform("sk,at91-xc6slx", SimulatedPlatform::construct);
        register_platform("simulated", SimulatedPlatform::construct);
    }

    #[test]
    fn test_match_platform_string_empty_string_fails() {
        setup_test_registry();
        let result = match_platform_string("");

        assert!(
            result.is_err(),
            "Empty string should fail to match any platform"
        );
    }

    #[test]
    fn test_match_platform_string_full_match_succeeds() {
        setup_test_registry();
        let result = match_platform_string("sk,at91-xc6slx");

        assert!(result.is_ok(), "Full match should succeed");
    }

    #[test]
    fn test_match_platform_string_single_component_succeeds() {
        setup_test_registry();
        let result = match_platform_string("sk");

        assert!(result.is_ok(), "Single component 'sk' should succeed");
    }

    #[test]
    fn test_match_platform_string_mixed_valid_invalid_fails() {
        setup_test_registry();
        let result = match_platform_string("sk,unknown-die");

        assert!(
            result.is_err(),
            "Mix of valid and invalid components should fail"
        );
    }

    #[test]
    fn test_match_platform_string_case_sensitive() {
        setup_test_registry();
        let result = match_platform_string("SK,AT91-XC6SLX");

        assert!(
            result.is_err(),
            "Case sensitive matching should fail for uppercase"
        );
    }

    #[test]
    fn test_unmatched_board_falls_back_to_simulated() {
        setup_test_registry();
        let mut config = BoardConfig::defaults();
        config.compatible = "acme,unknown-board".to_string();

        let platform = platform_for_board(&config).expect("fallback construction succeeds");
        assert_eq!(
            platform.compatible(),
            "simulated",
            "Unmatched boards should land on the simulated platform"
        );
    }

    #[test]
    fn test_bounds_check_accepts_in_range_accesses() {
        assert!(bounds_check(0x100, 0x00, 2).is_ok());
        assert!(bounds_check(0x100, 0xFE, 2).is_ok());
        assert!(bounds_check(0x100, 0xFC, 4).is_ok());
    }

    #[test]
    fn test_bounds_check_rejects_region_overrun() {
        assert!(bounds_check(0x100, 0x100, 2).is_err(), "start at end");
        assert!(bounds_check(0x100, 0xFE, 4).is_err(), "crosses the end");
        assert!(
            bounds_check(0x100, u32::MAX - 1, 2).is_err(),
            "offset arithmetic must not wrap"
        );
    }

    #[test]
    fn test_bounds_check_rejects_torn_accesses() {
        assert!(bounds_check(0x100, 0x01, 2).is_err(), "odd 16-bit offset");
        assert!(
            bounds_check(0x100, 0x02, 4).is_err(),
            "16-bit aligned but not 32-bit aligned"
        );
    }

    #[test]
    fn test_overlapping_reservations_are_refused() {
        let live = LiveRanges::default();
        reserve_range(&live, 0x1000, 0x100, "first").unwrap();
        assert!(reserve_range(&live, 0x10FF, 0x10, "tail").is_err());
        assert!(reserve_range(&live, 0x0F01, 0x100, "head").is_err());
        assert!(
            reserve_range(&live, 0x1100, 0x100, "adjacent").is_ok(),
            "back-to-back ranges do not overlap"
        );
    }

    #[test]
    fn test_released_ranges_can_be_reserved_again() {
        let live = LiveRanges::default();
        reserve_range(&live, 0x1000, 0x100, "first").unwrap();
        release_range(&live, 0x1000, 0x100);
        assert!(reserve_range(&live, 0x1000, 0x100, "second").is_ok());
    }
}
