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

//! In-memory register and window backing used by the simulated platform.
//!
//! Each distinct physical base address gets one byte vector that survives
//! map and unmap cycles, so a value written through one short-lived mapping
//! is visible through the next. That mirrors real registers, which keep
//! their contents between `ioremap` calls, and lets tests run write-read
//! round trips through the same code paths the hardware backend uses.

use crate::error::SkFpgaError;
use crate::platforms::platform::{
    LiveRanges, MappedRegion, MemoryMapper, bounds_check, release_range, reserve_range,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Backing {
    data: Vec<u8>,
    /// Total 16- and 32-bit stores into this range since creation.
    writes: u32,
}

/// A [`MemoryMapper`] backed by plain heap memory.
#[derive(Debug, Default)]
pub struct SimMemory {
    backings: Mutex<HashMap<u32, Arc<Mutex<Backing>>>>,
    /// Ranges with a live region; overlapping maps are refused.
    live: LiveRanges,
    /// When armed, the next `map` call fails with this reason.
    fail_next_map: Mutex<Option<String>>,
}

impl SimMemory {
    pub fn new() -> Self {
        SimMemory::default()
    }

    /// Arm a one-shot failure for the next `map` call, to exercise error
    /// paths that are unreachable with a cooperative backend.
    pub fn fail_next_map(&self, reason: &str) {
        *self
            .fail_next_map
            .lock()
            .expect("sim memory lock poisoned") = Some(reason.to_string());
    }

    /// Total stores made into the range at `phys_base` so far.
    pub fn write_count(&self, phys_base: u32) -> u32 {
        self.backings
            .lock()
            .expect("sim memory lock poisoned")
            .get(&phys_base)
            .map(|b| b.lock().expect("sim backing lock poisoned").writes)
            .unwrap_or(0)
    }

    fn backing(&self, phys_base: u32, span: u32) -> Arc<Mutex<Backing>> {
        let mut backings = self.backings.lock().expect("sim memory lock poisoned");
        let backing = backings.entry(phys_base).or_default();
        let mut inner = backing.lock().expect("sim backing lock poisoned");
        if inner.data.len() < span as usize {
            inner.data.resize(span as usize, 0);
        }
        drop(inner);
        backing.clone()
    }
}

impl MemoryMapper for SimMemory {
    fn map(
        &self,
        phys_base: u32,
        span: u32,
        label: &str,
    ) -> Result<Box<dyn MappedRegion>, SkFpgaError> {
        reserve_range(&self.live, phys_base, span, label)?;
        if let Some(reason) = self
            .fail_next_map
            .lock()
            .expect("sim memory lock poisoned")
            .take()
        {
            release_range(&self.live, phys_base, span);
            return Err(SkFpgaError::Map {
                phys: phys_base,
                len: span,
                reason: format!("{label}: {reason}"),
            });
        }
        Ok(Box::new(SimRegion {
            phys_base,
            span,
            backing: self.backing(phys_base, span),
            live: self.live.clone(),
        }))
    }
}

/// One live simulated mapping. Values are stored little-endian, like the
/// AT91 bus the hardware backend mirrors.
struct SimRegion {
    phys_base: u32,
    span: u32,
    backing: Arc<Mutex<Backing>>,
    live: LiveRanges,
}

impl MappedRegion for SimRegion {
    fn phys_base(&self) -> u32 {
        self.phys_base
    }

    fn span(&self) -> u32 {
        self.span
    }

    fn read_u16(&self, offset: u32) -> Result<u16, SkFpgaError> {
        bounds_check(self.span, offset, 2)?;
        let backing = self.backing.lock().expect("sim backing lock poisoned");
        let at = offset as usize;
        Ok(u16::from_le_bytes([backing.data[at], backing.data[at + 1]]))
    }

    fn write_u16(&self, offset: u32, value: u16) -> Result<(), SkFpgaError> {
        bounds_check(self.span, offset, 2)?;
        let mut backing = self.backing.lock().expect("sim backing lock poisoned");
        let at = offset as usize;
        backing.data[at..at + 2].copy_from_slice(&value.to_le_bytes());
        backing.writes += 1;
        Ok(())
    }

    fn read_u32(&self, offset: u32) -> Result<u32, SkFpgaError> {
        bounds_check(self.span, offset, 4)?;
        let backing = self.backing.lock().expect("sim backing lock poisoned");
        let at = offset as usize;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&backing.data[at..at + 4]);
        Ok(u32::from_le_bytes(bytes))
    }

    fn write_u32(&self, offset: u32, value: u32) -> Result<(), SkFpgaError> {
        bounds_check(self.span, offset, 4)?;
        let mut backing = self.backing.lock().expect("sim backing lock poisoned");
        let at = offset as usize;
        backing.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
        backing.writes += 1;
        Ok(())
    }
}

impl Drop for SimRegion {
    fn drop(&mut self) {
        release_range(&self.live, self.phys_base, self.span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_remapping() {
        let memory = SimMemory::new();
        {
            let region = memory.map(0x1000_0000, 0x100, "window").unwrap();
            region.write_u16(0x10, 0xBEEF).unwrap();
        }
        let region = memory.map(0x1000_0000, 0x100, "window").unwrap();
        assert_eq!(region.read_u16(0x10).unwrap(), 0xBEEF);
    }

    #[test]
    fn test_distinct_bases_do_not_alias() {
        let memory = SimMemory::new();
        let a = memory.map(0x1000_0000, 0x100, "a").unwrap();
        let b = memory.map(0x2000_0000, 0x100, "b").unwrap();
        a.write_u16(0x00, 0x1055).unwrap();
        assert_eq!(b.read_u16(0x00).unwrap(), 0x0000);
    }

    #[test]
    fn test_out_of_range_access_is_rejected() {
        let memory = SimMemory::new();
        let region = memory.map(0x1000_0000, 0x10, "tiny").unwrap();
        assert!(region.read_u16(0x10).is_err());
        assert!(region.write_u32(0x0E, 1).is_err());
    }

    #[test]
    fn test_armed_failure_fires_once() {
        let memory = SimMemory::new();
        memory.fail_next_map("injected");
        assert!(memory.map(0x1000_0000, 0x10, "w").is_err());
        // the failed map left no reservation behind
        assert!(memory.map(0x1000_0000, 0x10, "w").is_ok());
    }

    #[test]
    fn test_overlapping_live_mappings_are_refused() {
        let memory = SimMemory::new();
        let first = memory.map(0x1000_0000, 0x100, "first").unwrap();
        let refused = memory.map(0x1000_0080, 0x100, "second");
        assert!(matches!(refused, Err(SkFpgaError::Busy(_))));
        drop(first);
        assert!(memory.map(0x1000_0080, 0x100, "second").is_ok());
    }

    #[test]
    fn test_write_count_tracks_stores() {
        let memory = SimMemory::new();
        let region = memory.map(0xFFFF_E800, 0xFF, "smc").unwrap();
        region.write_u32(0x00, 1).unwrap();
        region.write_u32(0x04, 2).unwrap();
        region.read_u32(0x00).unwrap();
        assert_eq!(memory.write_count(0xFFFF_E800), 2);
    }
}
