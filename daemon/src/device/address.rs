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

//! Translation of client data addresses onto the chip-select windows.
//!
//! A client addresses FPGA data with a plain 32-bit offset. Where those
//! offsets land depends on the board's address policy:
//!
//! - **explicit**: the offset is window-relative and the device's address
//!   selector picks the window (or the DMA scratch buffer). This is the
//!   serial-console style the board has always used.
//! - **linear**: both windows form one doubled address space, CS1 in the
//!   upper half, and the selector is ignored for data access.
//!
//! All data moves as 16-bit quantities over the external bus, so odd
//! addresses and odd lengths are rejected here before anything touches a
//! mapping, as are ranges that cross out of their window.

use crate::config::AddressPolicy;
use crate::error::SkFpgaError;
use std::str::FromStr;

/// The two static-memory chip selects wired to the FPGA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipSelect {
    Cs0,
    Cs1,
}

impl std::fmt::Display for ChipSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChipSelect::Cs0 => write!(f, "cs0"),
            ChipSelect::Cs1 => write!(f, "cs1"),
        }
    }
}

/// What the device's address selector can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSelector {
    Cs0,
    Cs1,
    /// The in-daemon staging buffer used by DMA transfers.
    Dma,
}

impl std::fmt::Display for AddressSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressSelector::Cs0 => write!(f, "cs0"),
            AddressSelector::Cs1 => write!(f, "cs1"),
            AddressSelector::Dma => write!(f, "dma"),
        }
    }
}

impl FromStr for AddressSelector {
    type Err = SkFpgaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cs0" => Ok(AddressSelector::Cs0),
            "cs1" => Ok(AddressSelector::Cs1),
            "dma" => Ok(AddressSelector::Dma),
            other => Err(SkFpgaError::Argument(format!(
                "unknown address selector {other:?}, expected cs0, cs1 or dma"
            ))),
        }
    }
}

/// A fully resolved data location: either an offset into one chip-select
/// window or an offset into the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTarget {
    Window(ChipSelect, u32),
    Scratch(u32),
}

/// Resolve a client data address to a concrete target.
///
/// # Arguments
///
/// * `policy` - The board's address policy
/// * `selector` - The device's current address selector, if one was set
/// * `addr` - Client address, in bytes
/// * `len` - Length of the access, in bytes (`2` for single-word access)
/// * `window_size` - Byte size of each chip-select window
/// * `scratch_size` - Byte size of the DMA scratch buffer
///
/// # Returns: `Result<DataTarget, SkFpgaError>`
/// * `Ok(DataTarget)` - Where the access lands
/// * `Err(SkFpgaError::Misaligned)` - Odd address
/// * `Err(SkFpgaError::Argument)` - Odd length, or a range crossing windows
/// * `Err(SkFpgaError::State)` - Explicit policy with no selector set
/// * `Err(SkFpgaError::OutOfRange)` - Range leaves the addressed target
pub fn resolve_data_address(
    policy: AddressPolicy,
    selector: Option<AddressSelector>,
    addr: u32,
    len: u32,
    window_size: u32,
    scratch_size: u32,
) -> Result<DataTarget, SkFpgaError> {
    if addr % 2 != 0 {
        return Err(SkFpgaError::Misaligned { addr });
    }
    if len % 2 != 0 {
        return Err(SkFpgaError::Argument(format!(
            "length {len:#x} is not a whole number of 16-bit words"
        )));
    }
    let end = addr
        .checked_add(len)
        .ok_or(SkFpgaError::OutOfRange {
            addr,
            len,
            bound: window_size,
        })?;

    match policy {
        AddressPolicy::Explicit => {
            let selector = selector.ok_or_else(|| {
                SkFpgaError::State("no address selector has been set".to_string())
            })?;
            let (bound, target) = match selector {
                AddressSelector::Cs0 => (window_size, DataTarget::Window(ChipSelect::Cs0, addr)),
                AddressSelector::Cs1 => (window_size, DataTarget::Window(ChipSelect::Cs1, addr)),
                AddressSelector::Dma => (scratch_size, DataTarget::Scratch(addr)),
            };
            if end > bound {
                return Err(SkFpgaError::OutOfRange { addr, len, bound });
            }
            Ok(target)
        }
        AddressPolicy::Linear => {
            let folded = u64::from(window_size) * 2;
            if u64::from(end) > folded {
                return Err(SkFpgaError::OutOfRange {
                    addr,
                    len,
                    bound: window_size.saturating_mul(2),
                });
            }
            if addr < window_size {
                if end > window_size {
                    return Err(SkFpgaError::Argument(format!(
                        "range {addr:#x}+{len:#x} crosses the window boundary at {window_size:#x}"
                    )));
                }
                Ok(DataTarget::Window(ChipSelect::Cs0, addr))
            } else {
                Ok(DataTarget::Window(ChipSelect::Cs1, addr - window_size))
            }
        }
    }
}
