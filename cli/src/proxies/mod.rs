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

//! DBus proxy interfaces for the skfpgad daemon.
//!
//! This module provides auto-generated DBus proxy traits that allow the CLI to communicate
//! with the skfpgad daemon over the system DBus. The proxies are generated using the `zbus`
//! crate's `#[proxy]` macro and provide type-safe, asynchronous access to the daemon's
//! DBus interfaces.
//!
//! # Modules
//!
//! - [`control_proxy`] - Write operations (session gate, programming, pins, timings, DMA)
//! - [`status_proxy`] - Read-only operations (device state, pins, timings, board info) and
//!   the completion signals
//!
//! # DBus Service Information
//!
//! - **Service Name**: `com.canonical.skfpgad`
//! - **Control Interface**: `com.canonical.skfpgad.control` at `/com/canonical/skfpgad/control`
//! - **Status Interface**: `com.canonical.skfpgad.status` at `/com/canonical/skfpgad/status`
//!
//! # Usage
//!
//! These proxies are used internally by the CLI's command handlers ([`load`], [`set`],
//! [`status`], [`dma`], [`watch`]) to communicate with the skfpgad daemon. The proxies
//! handle DBus connection management and method call marshalling automatically.
//!
//! The daemon keys its exclusive session to the caller's unique bus name, so a mutating
//! handler must issue `open`, the operation and `close` over one connection.
//!
//! [`load`]: ../load/index.html
//! [`set`]: ../set/index.html
//! [`status`]: ../status/index.html
//! [`dma`]: ../dma/index.html
//! [`watch`]: ../watch/index.html

pub mod control_proxy;
pub mod status_proxy;
