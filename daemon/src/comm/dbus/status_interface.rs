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

use crate::device::SkFpga;
use log::info;
use std::sync::Arc;
use tokio::sync::Mutex;
use zbus::object_server::SignalEmitter;
use zbus::{fdo, interface};

/// The read-only half of the D-Bus surface. No session is needed to
/// observe the device, only to change it.
pub struct StatusInterface {
    pub device: Arc<Mutex<SkFpga>>,
}

#[interface(name = "com.canonical.skfpgad.status")]
impl StatusInterface {
    async fn get_state(&self) -> Result<String, fdo::Error> {
        info!("get_state called");
        Ok(self.device.lock().await.state().to_string())
    }

    async fn get_timings(&self, slot: u8) -> Result<(u32, u32, u32, u32), fdo::Error> {
        info!("get_timings called with slot: {slot}");
        let values = self.device.lock().await.get_timings(slot)?;
        Ok((values.setup, values.pulse, values.cycle, values.mode))
    }

    async fn get_word(&self, addr: u32) -> Result<u16, fdo::Error> {
        info!("get_word called with addr: {addr:#010x}");
        Ok(self.device.lock().await.get_word(addr)?)
    }

    async fn stream_read(&self, addr: u32, len: u32) -> Result<Vec<u8>, fdo::Error> {
        info!("stream_read called with addr: {addr:#010x} and len: {len:#x}");
        Ok(self.device.lock().await.stream_read(addr, len)?)
    }

    async fn get_reset(&self) -> Result<bool, fdo::Error> {
        info!("get_reset called");
        Ok(self.device.lock().await.reset_level()?)
    }

    async fn get_host_irq(&self) -> Result<bool, fdo::Error> {
        info!("get_host_irq called");
        Ok(self.device.lock().await.host_irq_level()?)
    }

    async fn get_fpga_irq(&self) -> Result<bool, fdo::Error> {
        info!("get_fpga_irq called");
        Ok(self.device.lock().await.fpga_irq_level()?)
    }

    async fn get_address_selector(&self) -> Result<String, fdo::Error> {
        info!("get_address_selector called");
        Ok(match self.device.lock().await.selector() {
            Some(selector) => selector.to_string(),
            None => "unset".to_string(),
        })
    }

    async fn get_board_info(&self) -> Result<Vec<(String, String)>, fdo::Error> {
        info!("get_board_info called");
        Ok(self.device.lock().await.board_info())
    }

    /// Emitted when a staged transfer finishes, in both the synchronous
    /// and the background case. `bytes` is the transferred byte count;
    /// it is 0 and `detail` carries the error text when `ok` is false.
    #[zbus(signal)]
    pub async fn dma_complete(
        emitter: &SignalEmitter<'_>,
        addr: u32,
        len: u32,
        direction: String,
        ok: bool,
        bytes: u32,
        detail: String,
    ) -> zbus::Result<()>;

    /// Emitted for every rising edge seen on the interrupt line from the
    /// FPGA design while the watcher is enabled.
    #[zbus(signal)]
    pub async fn external_event(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;
}
