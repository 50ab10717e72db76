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

//! Dma command implementation.
//!
//! Moves data between the daemon's scratch buffer and the chip-select
//! window the current selector points at. A background transfer returns
//! once the daemon has queued it; its outcome arrives as a
//! `dma_complete` signal, which `skfpga watch` prints.

use crate::set::{close_device, open_device};

/// Argument parser for the dma command
pub async fn dma_handler(
    direction: &str,
    addr: u32,
    len: u32,
    background: bool,
) -> Result<String, zbus::Error> {
    let proxy = open_device().await?;
    let result = proxy.start_dma(addr, len, direction, !background).await;
    close_device(&proxy).await;

    let moved = result?;
    Ok(if background {
        format!("{direction} transfer of {len:#x} bytes queued")
    } else {
        format!("{direction} transfer moved {moved:#x} bytes")
    })
}
