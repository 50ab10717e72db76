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

//! Status and get command implementations.
//!
//! Everything here goes through the read-only status interface, so no
//! device session is taken and a busy device can still be inspected.

use crate::GetSubcommand;
use crate::proxies::status_proxy;
use zbus::Connection;

/// Sends the dbus command to read the board description
async fn call_get_board_info() -> Result<Vec<(String, String)>, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.get_board_info().await
}

/// Sends the dbus command to read one timing slot
async fn call_get_timings(slot: u8) -> Result<(u32, u32, u32, u32), zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.get_timings(slot).await
}

/// Sends the dbus command to read one 16-bit word
async fn call_get_word(addr: u32) -> Result<u16, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.get_word(addr).await
}

/// Sends the dbus command to read the current address selector
async fn call_get_address_selector() -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.get_address_selector().await
}

/// Sends the dbus command to read one pin level by name
async fn call_get_pin(pin: &str) -> Result<bool, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    match pin {
        "reset" => proxy.get_reset().await,
        "host-irq" => proxy.get_host_irq().await,
        "fpga-irq" => proxy.get_fpga_irq().await,
        other => Err(zbus::Error::Failure(format!("'{other}' is not a pin"))),
    }
}

fn level_name(level: bool) -> &'static str {
    if level { "high" } else { "low" }
}

/// Pulls one field out of the board description.
fn info_field<'a>(info: &'a [(String, String)], field: &str) -> Result<&'a str, zbus::Error> {
    info.iter()
        .find(|(key, _)| key == field)
        .map(|(_, value)| value.as_str())
        .ok_or_else(|| zbus::Error::Failure(format!("daemon did not report a '{field}' field")))
}

/// Renders the board description, pin levels and both timing slots as an
/// ascii table.
async fn get_full_status_message() -> Result<String, zbus::Error> {
    let info = call_get_board_info().await?;
    let mut ret_string = String::from("---- BOARD ----\n| field | value |\n");
    for (field, value) in &info {
        ret_string += format!("| {field} | {value} |\n").as_str();
    }

    ret_string += "\n---- PINS ----\n| pin | level |\n";
    for pin in ["reset", "host-irq", "fpga-irq"] {
        let level = call_get_pin(pin).await?;
        ret_string += format!("| {pin} | {} |\n", level_name(level)).as_str();
    }

    ret_string += "\n---- TIMINGS ----\n| slot | setup | pulse | cycle | mode |\n";
    for field in ["cs0_slot", "cs1_slot"] {
        let slot: u8 = info_field(&info, field)?.parse().map_err(|_| {
            zbus::Error::Failure(format!("'{field}' in the board description is not a slot"))
        })?;
        let (setup, pulse, cycle, mode) = call_get_timings(slot).await?;
        ret_string += format!(
            "| {slot} | {setup:#010x} | {pulse:#010x} | {cycle:#010x} | {mode:#010x} |\n"
        )
        .as_str();
    }
    Ok(ret_string)
}

/// Argument parser for the status command
pub async fn status_handler() -> Result<String, zbus::Error> {
    get_full_status_message().await
}

/// Argument parser for the get command
pub async fn get_handler(sub_command: &GetSubcommand) -> Result<String, zbus::Error> {
    match sub_command {
        GetSubcommand::Word { addr } => {
            let value = call_get_word(*addr).await?;
            Ok(format!("{value:#06x}"))
        }
        GetSubcommand::Timings { slot } => {
            let (setup, pulse, cycle, mode) = call_get_timings(*slot).await?;
            Ok(format!(
                "setup: {setup:#010x}\npulse: {pulse:#010x}\ncycle: {cycle:#010x}\nmode: {mode:#010x}"
            ))
        }
        GetSubcommand::Selector => call_get_address_selector().await,
        GetSubcommand::Reset => Ok(level_name(call_get_pin("reset").await?).to_string()),
        GetSubcommand::HostIrq => Ok(level_name(call_get_pin("host-irq").await?).to_string()),
        GetSubcommand::FpgaIrq => Ok(level_name(call_get_pin("fpga-irq").await?).to_string()),
    }
}
