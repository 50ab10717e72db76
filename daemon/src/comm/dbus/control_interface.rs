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

use crate::comm::dbus::{message_sender, validate_bitstream_path};
use crate::device::address::AddressSelector;
use crate::device::SkFpga;
use crate::device::dma::DmaDirection;
use crate::device::timings::TimingConfig;
use log::{info, warn};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use zbus::message::Header;
use zbus::{fdo, interface};

/// The mutating half of the D-Bus surface. Every method except `open`
/// itself requires the caller to hold the exclusive session.
pub struct ControlInterface {
    pub device: Arc<Mutex<SkFpga>>,
}

#[interface(name = "com.canonical.skfpgad.control")]
impl ControlInterface {
    /// Take the exclusive session for the calling bus name.
    // TODO: drop the session automatically when the owning bus name
    // disappears, so a crashed client does not wedge the device.
    async fn open(&self, #[zbus(header)] header: Header<'_>) -> Result<String, fdo::Error> {
        let sender = message_sender(&header)?;
        info!("open called by {sender}");
        self.device.lock().await.open_session(&sender)?;
        Ok(format!("session opened for {sender}"))
    }

    async fn close(&self, #[zbus(header)] header: Header<'_>) -> Result<String, fdo::Error> {
        let sender = message_sender(&header)?;
        info!("close called by {sender}");
        self.device.lock().await.close_session(&sender)?;
        Ok(format!("session closed for {sender}"))
    }

    async fn set_timings(
        &self,
        #[zbus(header)] header: Header<'_>,
        slot: u8,
        setup: u32,
        pulse: u32,
        cycle: u32,
        mode: u32,
    ) -> Result<String, fdo::Error> {
        info!(
            "set_timings called with slot: {slot}, setup: {setup:#x}, pulse: {pulse:#x}, \
            cycle: {cycle:#x}, mode: {mode:#x}"
        );
        let device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        device.set_timings(
            slot,
            &TimingConfig {
                setup,
                pulse,
                cycle,
                mode,
            },
        )?;
        Ok(format!("timing slot {slot} programmed"))
    }

    async fn set_address_selector(
        &self,
        #[zbus(header)] header: Header<'_>,
        selector: &str,
    ) -> Result<String, fdo::Error> {
        info!("set_address_selector called with selector: {selector}");
        let selector = AddressSelector::from_str(selector)?;
        let mut device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        device.set_selector(selector);
        Ok(format!("address selector set to {selector}"))
    }

    async fn set_word(
        &self,
        #[zbus(header)] header: Header<'_>,
        addr: u32,
        value: u16,
    ) -> Result<String, fdo::Error> {
        info!("set_word called with addr: {addr:#010x} and value: {value:#06x}");
        let mut device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        device.set_word(addr, value)?;
        Ok(format!("{value:#06x} written to {addr:#010x}"))
    }

    /// Write a chunk of data starting at `addr`, returning the number of
    /// bytes written.
    async fn stream_write(
        &self,
        #[zbus(header)] header: Header<'_>,
        addr: u32,
        data: Vec<u8>,
    ) -> Result<u32, fdo::Error> {
        info!(
            "stream_write called with addr: {addr:#010x} and {:#x} bytes",
            data.len()
        );
        let mut device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        Ok(device.stream_write(addr, &data)?)
    }

    /// Configure the FPGA from a bitstream file, returning the number of
    /// bytes shifted out.
    async fn program_bitstream(
        &self,
        #[zbus(header)] header: Header<'_>,
        bitstream_path_str: &str,
    ) -> Result<u64, fdo::Error> {
        info!("program_bitstream called with path_str: {bitstream_path_str}");
        let path = validate_bitstream_path(bitstream_path_str)?;
        let mut device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        Ok(device.program_bitstream(path)?)
    }

    async fn set_reset(
        &self,
        #[zbus(header)] header: Header<'_>,
        level: bool,
    ) -> Result<String, fdo::Error> {
        info!("set_reset called with level: {level}");
        let mut device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        device.set_reset(level)?;
        Ok(format!("reset line driven {}", if level { "high" } else { "low" }))
    }

    async fn set_host_irq(
        &self,
        #[zbus(header)] header: Header<'_>,
        level: bool,
    ) -> Result<String, fdo::Error> {
        info!("set_host_irq called with level: {level}");
        let device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        device.set_host_irq(level)?;
        Ok(format!(
            "host interrupt line driven {}",
            if level { "high" } else { "low" }
        ))
    }

    /// Arm or disarm the watcher for the interrupt line coming from the
    /// FPGA design. Rising edges are reported through the `external_event`
    /// signal on the status interface.
    async fn enable_fpga_irq(
        &self,
        #[zbus(header)] header: Header<'_>,
        enable: bool,
    ) -> Result<String, fdo::Error> {
        info!("enable_fpga_irq called with enable: {enable}");
        let mut device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        let message = if enable {
            if device.enable_irq_watch()? {
                "interrupt watcher started"
            } else {
                "interrupt watcher already running"
            }
        } else if device.disable_irq_watch() {
            "interrupt watcher stopped"
        } else {
            "interrupt watcher was not running"
        };
        Ok(message.to_string())
    }

    /// Run a staged transfer between the scratch buffer and a window.
    ///
    /// With `synchronous` set the call returns the number of bytes moved.
    /// Without it the transfer runs on a worker task, the call returns 0
    /// immediately and the outcome arrives as a `dma_complete` signal on
    /// the status interface.
    async fn start_dma(
        &self,
        #[zbus(header)] header: Header<'_>,
        addr: u32,
        len: u32,
        direction: &str,
        synchronous: bool,
    ) -> Result<u32, fdo::Error> {
        info!(
            "start_dma called with addr: {addr:#010x}, len: {len:#x}, \
            direction: {direction}, synchronous: {synchronous}"
        );
        let direction = DmaDirection::from_str(direction)?;
        let mut device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        if synchronous {
            return Ok(device.dma_copy(addr, len, direction)?);
        }
        device.reserve_dma(addr, len, direction)?;
        let device = self.device.clone();
        tokio::spawn(async move {
            let mut device = device.lock().await;
            if let Err(e) = device.run_reserved_dma(addr, len, direction) {
                warn!("background {direction} transfer failed: {e}");
            }
        });
        Ok(0)
    }

    /// Physical base and size of the window the current selector points
    /// at, for clients that map the bus themselves.
    async fn map_memory(
        &self,
        #[zbus(header)] header: Header<'_>,
    ) -> Result<(u32, u32), fdo::Error> {
        info!("map_memory called");
        let mut device = self.device.lock().await;
        device.require_session(&message_sender(&header)?)?;
        Ok(device.window_placement()?)
    }
}
