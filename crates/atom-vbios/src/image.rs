//! Owned VBIOS byte buffer with bounds-checked reads.
//!
//! Every multi-byte integer in a VBIOS is little-endian and may sit at any
//! byte offset, so all reads here are byte-granular — no alignment is
//! assumed anywhere.

use crate::error::{Result, VbiosError};
use crate::layout::{Rom, RomTable};

/// An owned, immutable VBIOS image.
///
/// Typically 16 KiB–64 KiB copied out of the PCI expansion ROM. The buffer
/// is never modified after construction and may be shared freely.
#[derive(Debug, Clone)]
pub struct VbiosImage {
    bytes: Vec<u8>,
}

impl VbiosImage {
    /// Wrap an owned byte buffer.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the image holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check(&self, offset: u32, len: u32) -> Result<usize> {
        let end = u64::from(offset) + u64::from(len);
        if end > self.bytes.len() as u64 {
            return Err(VbiosError::OutOfRange {
                offset,
                len,
                size: self.bytes.len(),
            });
        }
        Ok(offset as usize)
    }

    /// Read one byte.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] if `offset` is past the image.
    pub fn read8(&self, offset: u32) -> Result<u8> {
        let off = self.check(offset, 1)?;
        Ok(self.bytes[off])
    }

    /// Read a little-endian u16 at any byte offset.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] if the read would exceed the image.
    pub fn read16(&self, offset: u32) -> Result<u16> {
        let off = self.check(offset, 2)?;
        Ok(u16::from_le_bytes([self.bytes[off], self.bytes[off + 1]]))
    }

    /// Read a little-endian u32 at any byte offset.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] if the read would exceed the image.
    pub fn read32(&self, offset: u32) -> Result<u32> {
        let off = self.check(offset, 4)?;
        Ok(u32::from_le_bytes([
            self.bytes[off],
            self.bytes[off + 1],
            self.bytes[off + 2],
            self.bytes[off + 3],
        ]))
    }

    /// Borrow `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] if the slice would exceed the image.
    pub fn slice(&self, offset: u32, len: u32) -> Result<&[u8]> {
        let off = self.check(offset, len)?;
        Ok(&self.bytes[off..off + len as usize])
    }

    /// Validate the load-time invariants of the image.
    ///
    /// # Errors
    ///
    /// Fails if the image is too small for the ROM header, the 0xAA55
    /// signature is missing, the ROM-table pointer is zero or out of range,
    /// or the ROM-table magic is neither `ATOM` nor `MOTA`.
    pub fn validate(&self) -> Result<()> {
        let rom = Rom::read_from(self, 0).map_err(|e| {
            tracing::debug!("VBIOS size is too small: {e}");
            e
        })?;

        if rom.signature != Rom::SIGNATURE {
            tracing::debug!("VBIOS signature incorrect {:#06x}", rom.signature);
            return Err(VbiosError::InvalidSignature {
                signature: rom.signature,
            });
        }
        if rom.rom_table_offset == 0 {
            tracing::debug!("cannot locate VBIOS ROM table header");
            return Err(VbiosError::MissingRomTable);
        }

        let rom_table = RomTable::read_from(self, u32::from(rom.rom_table_offset))?;
        if &rom_table.magic != b"ATOM" && &rom_table.magic != b"MOTA" {
            tracing::debug!("invalid VBIOS magic {:02x?}", rom_table.magic);
            return Err(VbiosError::InvalidRomTableMagic {
                magic: rom_table.magic,
            });
        }

        Ok(())
    }

    /// True iff [`validate`](Self::validate) succeeds.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
