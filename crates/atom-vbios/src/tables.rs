//! Validated VBIOS with cached table locations and the IIO program index.

use crate::error::{Result, VbiosError};
use crate::iio::{self, MAX_IIO_PROGRAMS};
use crate::image::VbiosImage;
use crate::layout::{
    data_table, unsupported, Command, CommandDescriptor, CommandTableEntry, FirmwareInfoV22, Rom,
    RomTable, TableHeader,
};

/// A validated VBIOS: the image plus everything the interpreter looks up
/// repeatedly — command-table and data-table offsets and the indirect-I/O
/// program index.
#[derive(Debug, Clone)]
pub struct Vbios {
    image: VbiosImage,
    rom: Rom,
    cmd_table_offset: u32,
    data_table_offset: u32,
    iio_offsets: [u16; MAX_IIO_PROGRAMS],
}

impl Vbios {
    /// Validate the image, cache the table pointers, and index the
    /// indirect-I/O programs.
    ///
    /// # Errors
    ///
    /// Fails if the image fails [`VbiosImage::validate`] or the indirect-I/O
    /// block is malformed.
    pub fn new(image: VbiosImage) -> Result<Self> {
        image.validate()?;

        let rom = Rom::read_from(&image, 0)?;
        let rom_table = RomTable::read_from(&image, u32::from(rom.rom_table_offset))?;
        let cmd_table_offset = u32::from(rom_table.cmd_table_offset);
        let data_table_offset = u32::from(rom_table.data_table_offset);

        // Sanity-check that both tables actually live inside the image.
        TableHeader::read_from(&image, cmd_table_offset)?;
        TableHeader::read_from(&image, data_table_offset)?;

        let mut bios = Self {
            image,
            rom,
            cmd_table_offset,
            data_table_offset,
            iio_offsets: [0; MAX_IIO_PROGRAMS],
        };

        let iio_base = u32::from(bios.datatable(data_table::INDIRECT_IO_ACCESS)?) + TableHeader::SIZE;
        bios.iio_offsets = iio::index_programs(&bios.image, iio_base)?;

        Ok(bios)
    }

    /// The underlying image.
    pub fn image(&self) -> &VbiosImage {
        &self.image
    }

    /// Read one image byte. See [`VbiosImage::read8`].
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] if `offset` is past the image.
    pub fn read8(&self, offset: u32) -> Result<u8> {
        self.image.read8(offset)
    }

    /// Read a little-endian word. See [`VbiosImage::read16`].
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] if the read would exceed the image.
    pub fn read16(&self, offset: u32) -> Result<u16> {
        self.image.read16(offset)
    }

    /// Read a little-endian dword. See [`VbiosImage::read32`].
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::OutOfRange`] if the read would exceed the image.
    pub fn read32(&self, offset: u32) -> Result<u32> {
        self.image.read32(offset)
    }

    /// Look up a data-table entry.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::InvalidDataTable`] if `index` is outside the
    /// table.
    pub fn datatable(&self, index: u16) -> Result<u16> {
        let header = TableHeader::read_from(&self.image, self.data_table_offset)?;
        let count = (header.structure_size.saturating_sub(TableHeader::SIZE as u16)) / 2;
        if index >= count.min(data_table::ENTRY_COUNT) {
            return Err(VbiosError::InvalidDataTable { index });
        }
        self.image
            .read16(self.data_table_offset + TableHeader::SIZE + u32::from(index) * 2)
    }

    /// Resolve a command to its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::UnsupportedCommand`] when the table entry is
    /// zero or the index is outside the command table.
    pub fn command(&self, cmd: Command) -> Result<CommandDescriptor> {
        let header = TableHeader::read_from(&self.image, self.cmd_table_offset)?;
        let count = (header.structure_size.saturating_sub(TableHeader::SIZE as u16)) / 2;
        if u16::from(cmd.0) >= count {
            return Err(unsupported(cmd));
        }

        let base = self
            .image
            .read16(self.cmd_table_offset + TableHeader::SIZE + u32::from(cmd.0) * 2)?;
        if base == 0 {
            return Err(unsupported(cmd));
        }

        let entry = CommandTableEntry::read_from(&self.image, u32::from(base))?;
        Ok(CommandDescriptor {
            base,
            size: entry.size,
            work_space_size: entry.work_space_size,
            parameter_space_size: entry.parameter_space_size,
        })
    }

    /// Firmware info with the revision gate applied.
    ///
    /// # Errors
    ///
    /// Returns [`VbiosError::UnsupportedFirmwareRevision`] unless the table
    /// is format revision 2, content revision 2.
    pub fn firmware_info(&self) -> Result<FirmwareInfoV22> {
        let offset = u32::from(self.datatable(data_table::FIRMWARE_INFO)?);
        let info = FirmwareInfoV22::read_from(&self.image, offset)?;
        if info.header.format_revision != 2 || info.header.content_revision != 2 {
            return Err(VbiosError::UnsupportedFirmwareRevision {
                format: info.header.format_revision,
                content: info.header.content_revision,
            });
        }
        Ok(info)
    }

    /// Entry offset of an indirect-I/O program, or 0 if the ROM has none
    /// with that id.
    pub fn iio_program(&self, program: u8) -> u16 {
        self.iio_offsets[usize::from(program)]
    }

    /// The VBIOS product name string, or `(unknown)` when the ROM carries
    /// none that we can decode.
    pub fn name(&self) -> String {
        self.name_string().unwrap_or_else(|| "(unknown)".into())
    }

    fn name_string(&self) -> Option<String> {
        if self.rom.number_of_strings == 0 {
            return None;
        }

        // The name sits after the atombios strings: skip them, then a \r\n.
        let mut pos = u32::from(self.rom.vbios_name_offset);
        for _ in 0..self.rom.number_of_strings {
            while self.image.read8(pos).ok()? != 0 {
                pos += 1;
            }
            pos += 1;
        }
        pos += 2;

        let mut name = Vec::new();
        while name.len() < 64 {
            match self.image.read8(pos + name.len() as u32) {
                Ok(0) | Err(_) => break,
                Ok(b) => name.push(b),
            }
        }
        while name.last().is_some_and(|&b| b <= b' ') {
            name.pop();
        }

        if name.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&name).into_owned())
    }
}
