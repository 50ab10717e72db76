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

//! Driver event distribution.
//!
//! Completion of transfers and interrupts raised by the FPGA design are
//! published on a broadcast channel. The daemon forwards them to bus
//! signals; tests subscribe directly. Publishing never blocks and events
//! to a channel with no subscribers are simply dropped.
//!
//! The interrupt line itself has no userspace irq source on this board,
//! so [`watch_fpga_irq`] polls the claimed input at a fixed interval and
//! reports rising edges.

use crate::device::dma::DmaDirection;
use crate::platforms::platform::{Pin, Platform};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// How often the interrupt watcher samples the `fpga_irq` line.
pub const FPGA_IRQ_POLL_INTERVAL: Duration = Duration::from_millis(10);

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Events the driver reports to interested parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A staged transfer finished, successfully or not. `outcome` carries
    /// the transferred byte count or the failure text.
    DmaComplete {
        addr: u32,
        len: u32,
        direction: DmaDirection,
        outcome: Result<u32, String>,
    },
    /// Rising edge seen on the FPGA's interrupt line.
    FpgaInterrupt,
}

/// Fan-out point for [`DriverEvent`]s.
#[derive(Debug)]
pub struct InterruptNotifier {
    tx: broadcast::Sender<DriverEvent>,
}

impl InterruptNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        InterruptNotifier { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: DriverEvent) {
        trace!("publishing driver event: {event:?}");
        if self.tx.send(event).is_err() {
            trace!("no subscribers, event dropped");
        }
    }
}

impl Default for InterruptNotifier {
    fn default() -> Self {
        InterruptNotifier::new()
    }
}

/// Poll the `fpga_irq` input and publish a [`DriverEvent::FpgaInterrupt`]
/// for every rising edge. Runs until the surrounding task is aborted or
/// the line becomes unreadable.
pub async fn watch_fpga_irq(
    platform: Arc<dyn Platform>,
    notifier: Arc<InterruptNotifier>,
    interval: Duration,
) {
    let mut previous = match platform.pins().get(Pin::FpgaIrq) {
        Ok(level) => level,
        Err(e) => {
            warn!("cannot sample the interrupt line, watcher not starting: {e}");
            return;
        }
    };
    debug!("interrupt watcher started, sampling every {interval:?}");
    loop {
        tokio::time::sleep(interval).await;
        match platform.pins().get(Pin::FpgaIrq) {
            Ok(level) => {
                if level && !previous {
                    debug!("rising edge on the FPGA interrupt line");
                    notifier.publish(DriverEvent::FpgaInterrupt);
                }
                previous = level;
            }
            Err(e) => {
                warn!("interrupt line became unreadable, watcher stopping: {e}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod test_interrupt_watcher {
    use super::*;
    use crate::config::BoardConfig;
    use crate::platforms::platform::{PinController, PinDirection};
    use crate::platforms::simulated::SimulatedPlatform;
    use googletest::prelude::*;
    use tokio::time::timeout;

    fn watched_platform() -> Arc<SimulatedPlatform> {
        let platform = Arc::new(SimulatedPlatform::new(&BoardConfig::defaults()));
        platform
            .sim_pins()
            .claim(Pin::FpgaIrq, PinDirection::Input)
            .expect("claiming the interrupt input succeeds");
        platform
    }

    #[gtest]
    #[tokio::test]
    async fn rising_edge_is_reported() {
        let platform = watched_platform();
        let notifier = Arc::new(InterruptNotifier::new());
        let mut events = notifier.subscribe();
        let watcher = tokio::spawn(watch_fpga_irq(
            platform.clone(),
            notifier.clone(),
            Duration::from_millis(1),
        ));

        platform.raise_fpga_irq(true);
        let event = timeout(Duration::from_millis(500), events.recv())
            .await
            .expect("an event arrives before the timeout");
        assert_that!(event, ok(eq(&DriverEvent::FpgaInterrupt)));
        watcher.abort();
    }

    #[gtest]
    #[tokio::test]
    async fn a_held_line_is_one_edge() {
        let platform = watched_platform();
        let notifier = Arc::new(InterruptNotifier::new());
        let mut events = notifier.subscribe();
        let watcher = tokio::spawn(watch_fpga_irq(
            platform.clone(),
            notifier.clone(),
            Duration::from_millis(1),
        ));

        platform.raise_fpga_irq(true);
        timeout(Duration::from_millis(500), events.recv())
            .await
            .expect("the edge event arrives")
            .expect("the channel stays open");

        // line stays high: no further edges may be reported
        tokio::time::sleep(Duration::from_millis(20)).await;
        expect_that!(
            events.try_recv(),
            err(eq(&broadcast::error::TryRecvError::Empty))
        );
        watcher.abort();
    }
}
