//! Binary layouts of the VBIOS tables.
//!
//! Mirrors the vendor `atom.h` / `atomfirmware.h` structures: everything is
//! byte-packed little-endian with 1-byte alignment. Each type carries a
//! `SIZE` constant and a `read_from` constructor that refuses to read past
//! the image, so a decoded value always came from in-bounds bytes.

use crate::error::{Result, VbiosError};
use crate::image::VbiosImage;

/// A VBIOS command, identified by its index into the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command(pub u8);

impl Command {
    /// `AsicInit` — the POST procedure. Always command 0.
    pub const ASIC_INIT: Command = Command(0);
}

/// The legacy PC expansion ROM header at offset 0 of the image.
#[derive(Debug, Clone)]
pub struct Rom {
    /// `0xAA55` on every valid expansion ROM.
    pub signature: u16,
    /// Number of NUL-terminated strings before the VBIOS product name.
    pub number_of_strings: u8,
    /// ATI watermark bytes at offset 0x30.
    pub ati_magic: [u8; 10],
    /// Offset of the [`RomTable`].
    pub rom_table_offset: u16,
    /// Offset of the string block holding the VBIOS product name.
    pub vbios_name_offset: u16,
}

impl Rom {
    /// Total header size.
    pub const SIZE: u32 = 0x70;
    /// Expansion ROM signature.
    pub const SIGNATURE: u16 = 0xAA55;

    const NUMBER_OF_STRINGS: u32 = 0x2F;
    const ATI_MAGIC: u32 = 0x30;
    const ROM_TABLE_OFFSET: u32 = 0x48;
    const VBIOS_NAME_OFFSET: u32 = 0x6E;

    /// Decode the header at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] iff `offset + SIZE` exceeds the
    /// image.
    pub fn read_from(image: &VbiosImage, offset: u32) -> Result<Self> {
        image.slice(offset, Self::SIZE)?;
        let mut ati_magic = [0u8; 10];
        ati_magic.copy_from_slice(image.slice(offset + Self::ATI_MAGIC, 10)?);
        Ok(Self {
            signature: image.read16(offset)?,
            number_of_strings: image.read8(offset + Self::NUMBER_OF_STRINGS)?,
            ati_magic,
            rom_table_offset: image.read16(offset + Self::ROM_TABLE_OFFSET)?,
            vbios_name_offset: image.read16(offset + Self::VBIOS_NAME_OFFSET)?,
        })
    }
}

/// Common 4-byte header shared by every AtomBIOS table.
#[derive(Debug, Clone, Copy)]
pub struct TableHeader {
    /// Size of the whole table, header included.
    pub structure_size: u16,
    /// Layout revision.
    pub format_revision: u8,
    /// Content revision within the layout.
    pub content_revision: u8,
}

impl TableHeader {
    /// Header size.
    pub const SIZE: u32 = 4;

    /// Decode the header at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] iff the header exceeds the image.
    pub fn read_from(image: &VbiosImage, offset: u32) -> Result<Self> {
        image.slice(offset, Self::SIZE)?;
        Ok(Self {
            structure_size: image.read16(offset)?,
            format_revision: image.read8(offset + 2)?,
            content_revision: image.read8(offset + 3)?,
        })
    }
}

/// The master ROM table: magic plus pointers to every other table.
///
/// Fourteen u16 fields follow the magic; only the command-table and
/// data-table pointers are consulted here.
#[derive(Debug, Clone)]
pub struct RomTable {
    /// Common header.
    pub header: TableHeader,
    /// `"ATOM"` or `"MOTA"` depending on the toolchain that built the ROM.
    pub magic: [u8; 4],
    /// Offset of the [command table](crate::Vbios::command).
    pub cmd_table_offset: u16,
    /// Offset of the data table.
    pub data_table_offset: u16,
}

impl RomTable {
    /// Total table size: header, magic, 14 u16 fields.
    pub const SIZE: u32 = TableHeader::SIZE + 4 + 14 * 2;

    const MAGIC: u32 = TableHeader::SIZE;
    const CMD_TABLE_OFFSET: u32 = 30;
    const DATA_TABLE_OFFSET: u32 = 32;

    /// Decode the table at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] iff the table exceeds the image.
    pub fn read_from(image: &VbiosImage, offset: u32) -> Result<Self> {
        image.slice(offset, Self::SIZE)?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(image.slice(offset + Self::MAGIC, 4)?);
        Ok(Self {
            header: TableHeader::read_from(image, offset)?,
            magic,
            cmd_table_offset: image.read16(offset + Self::CMD_TABLE_OFFSET)?,
            data_table_offset: image.read16(offset + Self::DATA_TABLE_OFFSET)?,
        })
    }
}

/// Well-known indices into the V1.1 data table.
pub mod data_table {
    /// Firmware info (default clocks, firmware revision).
    pub const FIRMWARE_INFO: u16 = 4;
    /// The indirect-I/O access block.
    pub const INDIRECT_IO_ACCESS: u16 = 23;
    /// Number of entries in a V1.1 data table.
    pub const ENTRY_COUNT: u16 = 34;
}

/// Firmware info, format revision 2.2.
///
/// Many more fields follow in the ROM; only the leading ones are needed for
/// POST.
#[derive(Debug, Clone)]
pub struct FirmwareInfoV22 {
    /// Common header; accepted only as revision 2.2.
    pub header: TableHeader,
    /// Firmware build revision.
    pub firmware_revision: u32,
    /// Default engine clock in 10 kHz units.
    pub default_sclk_freq: u32,
    /// Default memory clock in 10 kHz units.
    pub default_mclk_freq: u32,
}

impl FirmwareInfoV22 {
    /// Size of the fields we decode.
    pub const SIZE: u32 = TableHeader::SIZE + 12;

    /// Decode the table at `offset`. The revision gate is applied by the
    /// caller, not here.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] iff the table exceeds the image.
    pub fn read_from(image: &VbiosImage, offset: u32) -> Result<Self> {
        image.slice(offset, Self::SIZE)?;
        Ok(Self {
            header: TableHeader::read_from(image, offset)?,
            firmware_revision: image.read32(offset + 4)?,
            default_sclk_freq: image.read32(offset + 8)?,
            default_mclk_freq: image.read32(offset + 12)?,
        })
    }
}

/// The 6-byte header in front of every command's bytecode.
#[derive(Debug, Clone, Copy)]
pub struct CommandTableEntry {
    /// Total entry size, header and bytecode.
    pub size: u16,
    /// Workspace bytes the command wants.
    pub work_space_size: u8,
    /// Parameter-space bytes the command wants (7-bit field).
    pub parameter_space_size: u8,
}

impl CommandTableEntry {
    /// Header size; the first opcode byte follows immediately.
    pub const SIZE: u32 = 6;

    /// Decode the entry header at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] iff the header exceeds the image.
    pub fn read_from(image: &VbiosImage, offset: u32) -> Result<Self> {
        image.slice(offset, Self::SIZE)?;
        Ok(Self {
            size: image.read16(offset)?,
            work_space_size: image.read8(offset + 4)?,
            // ps is a 7-bit field; the top bit is reserved.
            parameter_space_size: image.read8(offset + 5)? & 0x7F,
        })
    }
}

/// Everything the interpreter needs to run one command.
///
/// Not a ROM structure itself — it groups the entry offset with the decoded
/// [`CommandTableEntry`] fields.
#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    /// Image offset of the command's [`CommandTableEntry`].
    pub base: u16,
    /// Total entry size in bytes.
    pub size: u16,
    /// Workspace bytes.
    pub work_space_size: u8,
    /// Parameter-space bytes.
    pub parameter_space_size: u8,
}

/// Parameter block for `AsicInit`, format 1.1: two clocks and 14 reserved
/// dwords, 64 bytes total.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsicInitParameters {
    /// Engine clock in 10 kHz units.
    pub sclk_freq: u32,
    /// Memory clock in 10 kHz units.
    pub mclk_freq: u32,
}

impl AsicInitParameters {
    /// Parameter-space length in 32-bit words.
    pub const WORDS: usize = 16;

    /// Render the block as the word array the interpreter consumes.
    pub fn words(&self) -> [u32; Self::WORDS] {
        let mut words = [0u32; Self::WORDS];
        words[0] = self.sclk_freq;
        words[1] = self.mclk_freq;
        words
    }
}

/// Helper so errors can report the command that failed to resolve.
pub(crate) fn unsupported(cmd: Command) -> VbiosError {
    VbiosError::UnsupportedCommand { index: cmd.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_field_offsets() {
        // Fixed by the expansion ROM format; a wrong offset here reads
        // garbage pointers from every real image.
        assert_eq!(Rom::NUMBER_OF_STRINGS, 0x2F);
        assert_eq!(Rom::ATI_MAGIC, 0x30);
        assert_eq!(Rom::ROM_TABLE_OFFSET, 0x48);
        assert_eq!(Rom::VBIOS_NAME_OFFSET, 0x6E);
        assert_eq!(Rom::SIZE, 0x70);
    }

    #[test]
    fn rom_table_field_offsets() {
        assert_eq!(RomTable::CMD_TABLE_OFFSET, 30);
        assert_eq!(RomTable::DATA_TABLE_OFFSET, 32);
        assert_eq!(RomTable::SIZE, 36);
    }

    #[test]
    fn command_entry_layout() {
        assert_eq!(CommandTableEntry::SIZE, 6);

        let mut bytes = vec![0u8; 8];
        bytes[0] = 0x34; // size = 0x1234
        bytes[1] = 0x12;
        bytes[4] = 0x40; // ws
        bytes[5] = 0xFF; // ps = 0x7F after masking the reserved bit
        let img = VbiosImage::new(bytes);
        let entry = CommandTableEntry::read_from(&img, 0).unwrap();
        assert_eq!(entry.size, 0x1234);
        assert_eq!(entry.work_space_size, 0x40);
        assert_eq!(entry.parameter_space_size, 0x7F);
    }

    #[test]
    fn asic_init_parameter_block() {
        let params = AsicInitParameters {
            sclk_freq: 30_000,
            mclk_freq: 75_000,
        };
        let words = params.words();
        assert_eq!(words.len(), 16);
        assert_eq!(words[0], 30_000);
        assert_eq!(words[1], 75_000);
        assert!(words[2..].iter().all(|&w| w == 0));
    }
}
