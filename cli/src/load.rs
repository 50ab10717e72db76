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

//! Load command implementation.
//!
//! Programs the FPGA from a bitstream file. The daemon reads the file
//! itself, so the path is made absolute here before it crosses the bus.

use crate::set::{close_device, open_device};

/// Argument parser for the load command
pub async fn load_handler(file: &str) -> Result<String, zbus::Error> {
    let path = std::path::absolute(file)
        .map_err(|e| zbus::Error::Failure(format!("cannot resolve '{file}': {e}")))?;
    let path_str = path.to_string_lossy();

    let proxy = open_device().await?;
    let result = proxy.program_bitstream(path_str.as_ref()).await;
    close_device(&proxy).await;

    let written = result?;
    Ok(format!("programmed {written} bytes from {path_str}"))
}
