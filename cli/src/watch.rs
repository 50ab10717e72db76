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

//! Watch command implementation.
//!
//! Arms the daemon's interrupt watcher, then subscribes to the status
//! interface signals and prints them until interrupted or until the
//! daemon goes away. The session is released again before the
//! subscription starts, so a watch does not block other clients.

use crate::proxies::status_proxy::StatusProxy;
use crate::set::{close_device, open_device};
use futures_lite::StreamExt;
use zbus::Connection;

/// Argument parser for the watch command
pub async fn watch_handler() -> Result<String, zbus::Error> {
    {
        let proxy = open_device().await?;
        let armed = proxy.enable_fpga_irq(true).await;
        close_device(&proxy).await;
        println!("{}", armed?);
    }

    let connection = Connection::system().await?;
    let proxy = StatusProxy::new(&connection).await?;
    let mut completions = proxy.receive_dma_complete().await?;
    let mut interrupts = proxy.receive_external_event().await?;
    println!("watching, interrupt to stop");

    loop {
        tokio::select! {
            Some(signal) = completions.next() => {
                let args = signal.args()?;
                if *args.ok() {
                    println!(
                        "dma complete: {} moved {:#x} bytes at {:#010x}",
                        args.direction(),
                        args.bytes(),
                        args.addr(),
                    );
                } else {
                    println!(
                        "dma failed: {} of {:#x} bytes at {:#010x}: {}",
                        args.direction(),
                        args.len(),
                        args.addr(),
                        args.detail(),
                    );
                }
            }
            Some(_) = interrupts.next() => {
                println!("interrupt raised by the FPGA design");
            }
            else => break,
        }
    }
    Ok("signal stream closed".to_string())
}
