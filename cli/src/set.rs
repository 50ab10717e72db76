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

//! Set command implementation.
//!
//! All commands here mutate the device, and the daemon only accepts
//! mutations from the client holding the exclusive session. The session
//! is keyed to the unique bus name of the connection, so every handler
//! opens it, runs its one operation and closes it again over a single
//! connection.

use crate::SetSubcommand;
use crate::proxies::control_proxy::ControlProxy;
use log::warn;
use zbus::Connection;

/// Opens the exclusive device session on a fresh connection.
pub async fn open_device() -> Result<ControlProxy<'static>, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = ControlProxy::new(&connection).await?;
    proxy.open().await?;
    Ok(proxy)
}

/// Releases the session taken by [`open_device`]. A close failure is
/// logged rather than propagated, so it cannot mask the result of the
/// operation that ran inside the session.
pub async fn close_device(proxy: &ControlProxy<'_>) {
    if let Err(e) = proxy.close().await {
        warn!("failed to release the device session: {e}");
    }
}

/// Argument parser for the set command
pub async fn set_handler(sub_command: &SetSubcommand) -> Result<String, zbus::Error> {
    let proxy = open_device().await?;
    let result = match sub_command {
        SetSubcommand::Word { addr, value } => proxy.set_word(*addr, *value).await,
        SetSubcommand::Timings {
            slot,
            setup,
            pulse,
            cycle,
            mode,
        } => proxy.set_timings(*slot, *setup, *pulse, *cycle, *mode).await,
        SetSubcommand::Selector { name } => proxy.set_address_selector(name).await,
        SetSubcommand::Reset { level } => proxy.set_reset(*level).await,
        SetSubcommand::HostIrq { level } => proxy.set_host_irq(*level).await,
        SetSubcommand::FpgaIrq { enable } => proxy.enable_fpga_irq(*enable).await,
    };
    close_device(&proxy).await;
    result
}
