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

//! Physical-memory access through `/dev/mem`.
//!
//! Register blocks and the chip-select windows are reached by mapping the
//! relevant physical range with `MAP_SHARED` and `O_SYNC`, so every access
//! goes to the bus uncached. Mappings must start on a page boundary while
//! some targets do not (the static memory controller block sits mid-page),
//! so the mapper maps from the preceding boundary and keeps the delta.
//! All accesses are volatile and writes are followed by a fence, keeping
//! the CPU from reordering stores the FPGA observes.

use crate::config::DEV_MEM_PATH;
use crate::error::SkFpgaError;
use crate::platforms::platform::{
    LiveRanges, MappedRegion, MemoryMapper, bounds_check, release_range, reserve_range,
};
use log::trace;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::ptr::{self, NonNull};
use std::sync::atomic::{Ordering, fence};

/// A [`MemoryMapper`] over `/dev/mem`.
#[derive(Debug, Default)]
pub struct DevMemMapper {
    /// Ranges with a live region; overlapping maps are refused.
    live: LiveRanges,
}

impl DevMemMapper {
    pub fn new() -> Self {
        DevMemMapper::default()
    }

    /// File offset, map length and in-page delta for a request starting
    /// anywhere in a page.
    ///
    /// The offset is widened to 64 bits before it reaches `mmap64`: the
    /// SMC and bus matrix blocks sit above `0x8000_0000`, past what the
    /// board's 32-bit `off_t` can carry.
    fn page_window(phys_base: u32, span: u32, page: u32) -> (libc::off64_t, usize, usize) {
        let aligned_base = phys_base & !(page - 1);
        let delta = (phys_base - aligned_base) as usize;
        (
            libc::off64_t::from(aligned_base),
            delta + span as usize,
            delta,
        )
    }

    /// Open `/dev/mem` and map the page-aligned range covering the request.
    fn map_reserved(
        phys_base: u32,
        span: u32,
        label: &str,
    ) -> Result<(NonNull<u8>, usize, usize, File), SkFpgaError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(DEV_MEM_PATH)
            .map_err(|e| SkFpgaError::Map {
                phys: phys_base,
                len: span,
                reason: format!("{label}: opening {DEV_MEM_PATH} failed: {e}"),
            })?;

        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u32;
        let (offset, map_len, delta) = Self::page_window(phys_base, span, page);

        let raw = unsafe {
            libc::mmap64(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(SkFpgaError::Map {
                phys: phys_base,
                len: span,
                reason: format!("{label}: {}", std::io::Error::last_os_error()),
            });
        }
        let base = NonNull::new(raw as *mut u8).ok_or_else(|| SkFpgaError::Map {
            phys: phys_base,
            len: span,
            reason: format!("{label}: mapping returned a null pointer"),
        })?;
        Ok((base, map_len, delta, file))
    }
}

impl MemoryMapper for DevMemMapper {
    fn map(
        &self,
        phys_base: u32,
        span: u32,
        label: &str,
    ) -> Result<Box<dyn MappedRegion>, SkFpgaError> {
        if phys_base % 4 != 0 {
            return Err(SkFpgaError::Map {
                phys: phys_base,
                len: span,
                reason: format!("{label}: physical base is not 32-bit aligned"),
            });
        }
        reserve_range(&self.live, phys_base, span, label)?;
        let (base, map_len, delta, file) = match Self::map_reserved(phys_base, span, label) {
            Ok(mapping) => mapping,
            Err(e) => {
                release_range(&self.live, phys_base, span);
                return Err(e);
            }
        };

        trace!("mapped {label}: {phys_base:#010x}+{span:#x} at {:p}", base);
        Ok(Box::new(DevMemRegion {
            base,
            map_len,
            delta,
            phys_base,
            span,
            live: self.live.clone(),
            _file: file,
        }))
    }
}

/// One live `/dev/mem` mapping, released on drop.
struct DevMemRegion {
    /// Start of the mapping, on a page boundary.
    base: NonNull<u8>,
    map_len: usize,
    /// Distance from `base` to the requested physical base.
    delta: usize,
    phys_base: u32,
    span: u32,
    live: LiveRanges,
    /// Kept open for the lifetime of the mapping.
    _file: File,
}

// The region owns its mapping exclusively and every access is volatile, so
// handing references across threads is sound.
unsafe impl Send for DevMemRegion {}
unsafe impl Sync for DevMemRegion {}

impl DevMemRegion {
    fn target(&self, offset: u32) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.delta + offset as usize) }
    }
}

impl MappedRegion for DevMemRegion {
    fn phys_base(&self) -> u32 {
        self.phys_base
    }

    fn span(&self) -> u32 {
        self.span
    }

    fn read_u16(&self, offset: u32) -> Result<u16, SkFpgaError> {
        bounds_check(self.span, offset, 2)?;
        Ok(unsafe { ptr::read_volatile(self.target(offset) as *const u16) })
    }

    fn write_u16(&self, offset: u32, value: u16) -> Result<(), SkFpgaError> {
        bounds_check(self.span, offset, 2)?;
        unsafe {
            ptr::write_volatile(self.target(offset) as *mut u16, value);
        }
        fence(Ordering::SeqCst);
        Ok(())
    }

    fn read_u32(&self, offset: u32) -> Result<u32, SkFpgaError> {
        bounds_check(self.span, offset, 4)?;
        Ok(unsafe { ptr::read_volatile(self.target(offset) as *const u32) })
    }

    fn write_u32(&self, offset: u32, value: u32) -> Result<(), SkFpgaError> {
        bounds_check(self.span, offset, 4)?;
        unsafe {
            ptr::write_volatile(self.target(offset) as *mut u32, value);
        }
        fence(Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for DevMemRegion {
    fn drop(&mut self) {
        trace!(
            "unmapping {:#010x}+{:#x} at {:p}",
            self.phys_base, self.span, self.base
        );
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut _, self.map_len);
        }
        release_range(&self.live, self.phys_base, self.span);
    }
}
