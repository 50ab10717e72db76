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

//! FPGA daemon (skfpgad) - System service for the StarterKit board FPGA.
//!
//! This is the main entry point for the skfpgad daemon, which provides a
//! DBus service for an FPGA attached to the external bus interface of the
//! AT91SAM9-family StarterKit board. The daemon:
//! - Exposes two DBus interfaces: `control` and `status`
//! - Programs bitstreams over the serial slave configuration pins
//! - Serves both chip-select data windows and a DMA scratch buffer
//! - Reports transfer completions and FPGA interrupts as DBus signals
//! - Runs as a system service with appropriate privileges
//!
//! # DBus Service
//!
//! - **Service Name**: `com.canonical.skfpgad`
//! - **Status Interface**: `/com/canonical/skfpgad/status` - Read-only operations and signals
//! - **Control Interface**: `/com/canonical/skfpgad/control` - Write operations
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`
//!
//! # Architecture
//!
//! The daemon keeps the hardware behind a platform abstraction so the same
//! device logic drives the real board and a simulated stand-in. At startup,
//! the daemon:
//! 1. Registers all available platform implementations
//! 2. Loads the layered board description and matches it to a platform
//! 3. Brings the device up: claims pins, prepares the bus, applies timings
//! 4. Connects to the system DBus and advertises the service
//! 5. Forwards driver events as DBus signals and serves requests indefinitely
//!
//! # Platform Support
//!
//! - **AT91SAM9** (feature-gated, default): the StarterKit board itself,
//!   driven through `/dev/mem` and the sysfs GPIO interface
//! - **Simulated Platform**: in-memory stand-in used as a fallback and by
//!   the test suite

use log::{info, warn};
use std::error::Error;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use zbus::connection;

mod error;

mod comm;

mod config;
mod device;
mod platforms;
mod system_io;

use crate::comm::dbus::{control_interface::ControlInterface, status_interface::StatusInterface};
use crate::config::BoardConfig;
use crate::device::SkFpga;
use crate::device::notify::DriverEvent;
use crate::platforms::platform::platform_for_board;
use crate::platforms::simulated::SimulatedPlatform;

#[cfg(feature = "at91sam9")]
use crate::platforms::at91sam9::At91Sam9Platform;

/// Register all available platform implementations.
///
/// Called once at daemon startup. Each platform provides the pin and
/// memory access for one kind of hardware. Platforms are registered in
/// order of priority, with board-specific platforms registered before
/// the simulated fallback.
fn register_platforms() {
    #[cfg(feature = "at91sam9")]
    At91Sam9Platform::register();
    SimulatedPlatform::register();
}

/// Main entry point for the skfpgad daemon.
///
/// Initializes the daemon by:
/// 1. Setting up logging via `env_logger` (defaults to "info" level)
/// 2. Registering platform implementations
/// 3. Loading the board description and bringing the device up
/// 4. Connecting to the system DBus and advertising the service
/// 5. Forwarding driver events as signals and serving requests forever
///
/// # Returns: `Result<(), Box<dyn Error>>`
/// * `Ok(())` - Never returns under normal operation (runs until terminated)
/// * `Err(Box<dyn Error>)` - Initialization error (device bring-up or DBus
///   connection failed, etc.)
///
/// # Examples
///
/// ```bash
/// # Run with default logging (info level)
/// skfpgad
///
/// # Run with debug logging
/// RUST_LOG=debug skfpgad
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    register_platforms();

    let board = BoardConfig::load()?;
    let platform: Arc<dyn platforms::platform::Platform> =
        Arc::from(platform_for_board(&board)?);
    let fpga = SkFpga::new(board, platform)?;
    let notifier = fpga.notifier();
    let device = Arc::new(Mutex::new(fpga));

    let status_interface = StatusInterface {
        device: device.clone(),
    };
    let control_interface = ControlInterface {
        device: device.clone(),
    };

    let conn = connection::Builder::system()?
        .name(config::DBUS_SERVICE_NAME)?
        .serve_at(config::DBUS_STATUS_PATH, status_interface)?
        .serve_at(config::DBUS_CONTROL_PATH, control_interface)?
        .build()
        .await?;

    // Driver events become signals on the status interface.
    let status_ref = conn
        .object_server()
        .interface::<_, StatusInterface>(config::DBUS_STATUS_PATH)
        .await?;
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!("event forwarder lagged, {n} events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let result = match event {
                DriverEvent::DmaComplete {
                    addr,
                    len,
                    direction,
                    outcome,
                } => {
                    let (ok, bytes, detail) = match outcome {
                        Ok(bytes) => (true, bytes, String::new()),
                        Err(detail) => (false, 0, detail),
                    };
                    StatusInterface::dma_complete(
                        status_ref.signal_emitter(),
                        addr,
                        len,
                        direction.to_string(),
                        ok,
                        bytes,
                        detail,
                    )
                    .await
                }
                DriverEvent::FpgaInterrupt => {
                    StatusInterface::external_event(status_ref.signal_emitter()).await
                }
            };
            if let Err(e) = result {
                warn!("failed to emit event signal: {e}");
            }
        }
    });

    info!("Started {} dbus service", config::DBUS_SERVICE_NAME);
    // Do other things or go to wait forever
    pending::<()>().await;

    Ok(())
}
