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

//! Error Wrapping File System I/O Helpers
//!
//! This module provides convenient wrappers around standard Rust file system
//! operations, with automatic conversion to `SkFpgaError` types. All functions
//! include trace logging and provide error context including file paths. The
//! sysfs pin backend and the bitstream loader are the main consumers.

use crate::error::SkFpgaError;
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Arguments
///
/// * `file_path` - Path to the file to read
///
/// # Returns: `Result<String, SkFpgaError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(SkFpgaError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, SkFpgaError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(SkFpgaError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Write a string value to a file.
///
/// # Arguments
///
/// * `file_path` - Path to the file to write
/// * `create` - If `true`, create the file if it doesn't exist; if `false`, file must already exist
/// * `value` - The string value to write (implements `AsRef<str>`)
///
/// # Returns: `Result<(), SkFpgaError>`
/// * `Ok(())` - Write succeeded
/// * `Err(SkFpgaError::IOWrite)` - If the write fails (permissions, file doesn't exist when create=false, etc.)
pub fn fs_write(file_path: &Path, create: bool, value: impl AsRef<str>) -> Result<(), SkFpgaError> {
    trace!(
        "Attempting to write {:?} to {:?}",
        value.as_ref(),
        file_path
    );
    let result = OpenOptions::new()
        .create(create)
        .read(false)
        .write(true)
        .open(file_path)
        .and_then(|mut f| write!(f, "{}", value.as_ref()));
    match result {
        Ok(_) => {
            trace!("Write done.");
            Ok(())
        }
        Err(e) => Err(SkFpgaError::IOWrite {
            file: file_path.into(),
            e,
        }),
    }
}

/// Open a file for chunked binary reading, as done by the bitstream loader.
pub fn fs_open(file_path: &Path) -> Result<File, SkFpgaError> {
    trace!("Attempting to open {file_path:?}");
    OpenOptions::new()
        .read(true)
        .open(file_path)
        .map_err(|e| SkFpgaError::IORead {
            file: file_path.into(),
            e,
        })
}

/// Read the next chunk from an open file into `buf`.
///
/// # Returns: `Result<usize, SkFpgaError>`
/// * `Ok(n)` - Number of bytes placed at the start of `buf`; `0` means end of file
/// * `Err(SkFpgaError::IORead)` - If the read fails
pub fn fs_read_chunk(
    file: &mut File,
    file_path: &Path,
    buf: &mut [u8],
) -> Result<usize, SkFpgaError> {
    file.read(buf).map_err(|e| SkFpgaError::IORead {
        file: file_path.into(),
        e,
    })
}
