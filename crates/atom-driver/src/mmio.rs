//! Memory-mapped register transport.
//!
//! The register aperture arrives as a PCIe BAR mapped through sysfs. Most
//! register indices fall inside the mapped window and are plain volatile
//! accesses; indices beyond it go through the PCIE index/data pair under a
//! lock, with a readback after every posted write so the device sees the
//! sequence in order.

use crate::error::{AtomError, Result};
use crate::vi::regs::{PCIE_DATA, PCIE_INDEX};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

/// The device seam the interpreter runs against: 32-bit register reads and
/// writes by register index.
pub trait RegisterIo {
    /// Read register `reg`.
    fn read_register(&mut self, reg: u32) -> u32;
    /// Write `value` to register `reg`.
    fn write_register(&mut self, reg: u32, value: u32);
}

/// A memory-mapped PCIe BAR.
pub struct MmioRegion {
    ptr: NonNull<u8>,
    size: usize,
    _file: Option<File>,
}

impl std::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmioRegion")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size", &self.size)
            .finish()
    }
}

// SAFETY: the region owns its mapping exclusively; mmap'd memory is
// process-wide, so moving the owner between threads is fine.
unsafe impl Send for MmioRegion {}

// SAFETY: all accesses are volatile, bounds-checked, and take &self;
// concurrent register reads are idempotent at this layer. Ordering of the
// index/data sequence is the responsibility of RegisterWindow's lock.
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Map a PCIe BAR through its sysfs `resourceN` file.
    ///
    /// # Errors
    ///
    /// Returns [`AtomError::MapFailed`] if the resource file cannot be
    /// opened (device not enabled?) or the mapping fails.
    pub fn map_bar(pcie_address: &str, bar: usize) -> Result<Self> {
        let path = format!("/sys/bus/pci/devices/{pcie_address}/resource{bar}");
        tracing::debug!("mapping PCIe BAR: {path}");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| AtomError::MapFailed {
                reason: format!("cannot open {path}: {e}"),
            })?;

        // BAR sizes fit in usize on 64-bit, our only target.
        #[allow(clippy::cast_possible_truncation)]
        let size = file
            .metadata()
            .map_err(|e| AtomError::MapFailed {
                reason: format!("cannot stat {path}: {e}"),
            })?
            .len() as usize;
        if size == 0 {
            return Err(AtomError::MapFailed {
                reason: format!("{path} has size 0 (device not enabled?)"),
            });
        }

        // SAFETY: the fd was just opened and stays alive in the struct, the
        // size is non-zero and came from the kernel, and the mapping is
        // released exactly once in Drop.
        let ptr = unsafe {
            let addr = mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                0,
            )
            .map_err(|e| AtomError::MapFailed {
                reason: format!("mmap of {path} failed: {e}"),
            })?;
            NonNull::new(addr.cast::<u8>()).expect("rustix mmap returns non-null on success")
        };

        tracing::info!("mapped BAR{bar} for {pcie_address}: {size:#x} bytes at {ptr:p}");

        Ok(Self {
            ptr,
            size,
            _file: Some(file),
        })
    }

    /// An anonymous mapping standing in for device memory in tests.
    #[cfg(test)]
    pub(crate) fn anonymous(size: usize) -> Self {
        use rustix::mm::mmap_anonymous;
        // SAFETY: anonymous private mapping, released once in Drop.
        let ptr = unsafe {
            let addr = mmap_anonymous(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::PRIVATE,
            )
            .expect("anonymous mmap");
            NonNull::new(addr.cast::<u8>()).expect("anonymous mmap returns non-null")
        };
        Self {
            ptr,
            size,
            _file: None,
        }
    }

    /// Region size in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Volatile 32-bit read at a byte offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the region.
    pub fn read32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.size, "MMIO offset out of bounds");
        // SAFETY: ptr is valid for `size` bytes and the offset was checked;
        // the read must be volatile because the device owns the value.
        unsafe { std::ptr::read_volatile(self.ptr.as_ptr().add(offset).cast::<u32>()) }
    }

    /// Volatile 32-bit write at a byte offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the region.
    pub fn write32(&self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.size, "MMIO offset out of bounds");
        // SAFETY: as in read32; volatile so the store reaches the device.
        unsafe {
            std::ptr::write_volatile(self.ptr.as_ptr().add(offset).cast::<u32>(), value);
        }
    }
}

impl Drop for MmioRegion {
    fn drop(&mut self) {
        // SAFETY: the pointer/size pair came from mmap and Drop runs once.
        unsafe {
            let _ = munmap(self.ptr.as_ptr().cast(), self.size);
        }
        tracing::debug!("unmapped MMIO region ({:#x} bytes)", self.size);
    }
}

/// The register transport: direct window accesses with a PCIE index/data
/// fallback for registers beyond the mapped range.
#[derive(Debug)]
pub struct RegisterWindow {
    region: MmioRegion,
    // Concurrent users of the index/data pair (another POST, sysfs pokes)
    // would tear the two-step transaction.
    index_lock: Mutex<()>,
}

impl RegisterWindow {
    /// Wrap a mapped register BAR.
    pub fn new(region: MmioRegion) -> Self {
        Self {
            region,
            index_lock: Mutex::new(()),
        }
    }

    /// Read register `reg`.
    pub fn read(&self, reg: u32) -> u32 {
        let offset = reg as usize * 4;
        if offset + 4 <= self.region.size() {
            self.region.read32(offset)
        } else {
            let _guard = self
                .index_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.region.write32(PCIE_INDEX as usize * 4, reg * 4);
            let _ = self.region.read32(PCIE_INDEX as usize * 4);
            self.region.read32(PCIE_DATA as usize * 4)
        }
    }

    /// Write `value` to register `reg`.
    ///
    /// Register 0 has a firmware quirk on the direct path: the stored value
    /// is pre-shifted left by two.
    pub fn write(&self, reg: u32, value: u32) {
        let offset = reg as usize * 4;
        if offset + 4 <= self.region.size() {
            if reg == 0 {
                self.region.write32(0, value << 2);
            } else {
                self.region.write32(offset, value);
            }
        } else {
            let _guard = self
                .index_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.region.write32(PCIE_INDEX as usize * 4, reg * 4);
            let _ = self.region.read32(PCIE_INDEX as usize * 4);
            self.region.write32(PCIE_DATA as usize * 4, value);
            let _ = self.region.read32(PCIE_DATA as usize * 4);
        }
    }
}

impl RegisterIo for RegisterWindow {
    fn read_register(&mut self, reg: u32) -> u32 {
        self.read(reg)
    }

    fn write_register(&mut self, reg: u32, value: u32) {
        self.write(reg, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> RegisterWindow {
        RegisterWindow::new(MmioRegion::anonymous(0x100))
    }

    #[test]
    fn direct_window_read_write() {
        let w = window();
        w.write(0x10, 0xDEAD_BEEF);
        assert_eq!(w.read(0x10), 0xDEAD_BEEF);
    }

    #[test]
    fn register_zero_write_is_preshifted() {
        let w = window();
        w.write(0, 0x1234_5678);
        // The stored dword carries the quirk shift.
        assert_eq!(w.region.read32(0), 0x1234_5678 << 2);
    }

    #[test]
    fn out_of_window_write_goes_through_index_data() {
        let w = window();
        // Window is 0x100 bytes = 64 registers; 0x80 is beyond it.
        w.write(0x80, 0xCAFE_F00D);
        assert_eq!(w.region.read32(PCIE_INDEX as usize * 4), 0x80 * 4);
        assert_eq!(w.region.read32(PCIE_DATA as usize * 4), 0xCAFE_F00D);
    }

    #[test]
    fn out_of_window_read_goes_through_index_data() {
        let w = window();
        w.region.write32(PCIE_DATA as usize * 4, 0x1111_2222);
        assert_eq!(w.read(0x90), 0x1111_2222);
        assert_eq!(w.region.read32(PCIE_INDEX as usize * 4), 0x90 * 4);
    }
}
