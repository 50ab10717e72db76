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

use crate::platforms::platform::Pin;
use log::error;
use std::path::PathBuf;
use zbus::fdo;

#[derive(Debug, thiserror::Error)]
pub enum SkFpgaError {
    #[error("SkFpgaError::Config: invalid board configuration: {0}")]
    Config(String),
    #[error("SkFpgaError::TomlDe: failed to parse config file {file:?}: {e}")]
    TomlDe { file: PathBuf, e: toml::de::Error },
    #[error("SkFpgaError::Argument: {0}")]
    Argument(String),
    #[error("SkFpgaError::Session: {0}")]
    Session(String),
    #[error("SkFpgaError::Busy: {0}")]
    Busy(String),
    #[error("SkFpgaError::State: FPGA state is not as expected: {0}")]
    State(String),
    #[error("SkFpgaError::PinClaim: failed to acquire {pin} pin: {reason}")]
    PinClaim { pin: Pin, reason: String },
    #[error(
        "SkFpgaError::OutOfRange: access of {len} bytes at {addr:#010x} exceeds the {bound:#010x} byte address space"
    )]
    OutOfRange { addr: u32, len: u32, bound: u32 },
    #[error("SkFpgaError::Misaligned: address {addr:#010x} is not 16-bit aligned")]
    Misaligned { addr: u32 },
    #[error(
        "SkFpgaError::ProgrammingTimeout: done pin stayed low after {pulses} completion clock pulses"
    )]
    ProgrammingTimeout { pulses: u32 },
    #[error("SkFpgaError::Map: failed to map {len:#x} bytes at {phys:#010x}: {reason}")]
    Map { phys: u32, len: u32, reason: String },
    #[error("SkFpgaError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("SkFpgaError::IOWrite: An IO error occurred when writing to {file:?}: {e}")]
    IOWrite { file: PathBuf, e: std::io::Error },
    #[error("SkFpgaError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl From<SkFpgaError> for fdo::Error {
    fn from(err: SkFpgaError) -> Self {
        error!("{err}");
        match err {
            SkFpgaError::Config(..) => fdo::Error::InvalidArgs(err.to_string()),
            SkFpgaError::TomlDe { .. } => fdo::Error::InvalidArgs(err.to_string()),
            SkFpgaError::Argument(..) => fdo::Error::InvalidArgs(err.to_string()),
            SkFpgaError::OutOfRange { .. } => fdo::Error::InvalidArgs(err.to_string()),
            SkFpgaError::Misaligned { .. } => fdo::Error::InvalidArgs(err.to_string()),
            SkFpgaError::IORead { .. } => fdo::Error::IOError(err.to_string()),
            SkFpgaError::IOWrite { .. } => fdo::Error::IOError(err.to_string()),
            SkFpgaError::Map { .. } => fdo::Error::IOError(err.to_string()),
            _ => fdo::Error::Failed(err.to_string()),
        }
    }
}
