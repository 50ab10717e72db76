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

pub mod control_interface;
pub mod status_interface;

use crate::error::SkFpgaError;
use std::path::Path;
use zbus::message::Header;

/// Unique bus name of the caller, used as the session owner key.
pub(crate) fn message_sender(header: &Header<'_>) -> Result<String, SkFpgaError> {
    match header.sender() {
        Some(name) => Ok(name.to_string()),
        None => Err(SkFpgaError::Session(
            "the message carries no sender, cannot attribute the session".to_string(),
        )),
    }
}

/// Helper function to check that a bitstream path is one the daemon can
/// sensibly open before any device state is touched.
pub(crate) fn validate_bitstream_path(path_str: &str) -> Result<&Path, SkFpgaError> {
    if path_str.is_empty() {
        return Err(SkFpgaError::Argument(
            "a bitstream path is required. Provided path is empty.".to_string(),
        ));
    }
    let path = Path::new(path_str);
    if !path.is_absolute() {
        return Err(SkFpgaError::Argument(format!(
            "{path_str} is not an absolute path. The daemon does not resolve relative paths."
        )));
    }
    if !path.exists() || path.is_dir() {
        return Err(SkFpgaError::Argument(format!(
            "{path_str} is not a valid path to a bitstream file."
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod test_validate_bitstream_path {
    use crate::comm::dbus::validate_bitstream_path;
    use googletest::prelude::*;
    use rstest::*;
    use std::path::Path;

    #[gtest]
    #[rstest]
    #[case::empty("", "a bitstream path is required")]
    #[case::relative("design.bit", "not an absolute path")]
    #[case::missing("/nonexistent/skfpgad/design.bit", "not a valid path")]
    #[case::directory("/", "not a valid path")]
    fn should_fail(#[case] path: &str, #[case] fragment: &str) {
        let result = validate_bitstream_path(path);
        assert_that!(result, err(displays_as(contains_substring(fragment))));
    }

    #[gtest]
    fn an_existing_file_passes() {
        let path = std::env::temp_dir().join("skfpgad-validate-bitstream-path.bin");
        std::fs::write(&path, b"not a real bitstream").unwrap();
        let path_str = path.to_str().unwrap();
        let result = validate_bitstream_path(path_str);
        assert_that!(result, ok(eq(&Path::new(path_str))));
        let _ = std::fs::remove_file(&path);
    }
}
