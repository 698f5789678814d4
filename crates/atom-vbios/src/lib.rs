//! Pure model of an AMD AtomBIOS VBIOS image.
//!
//! This crate has **no hardware access** — it owns the ROM byte buffer and
//! knows how to read the packed little-endian structures inside it: the ROM
//! header, the ROM table, the command and data tables, firmware info, and
//! the indirect-I/O program region.
//!
//! Everything a running interpreter needs from the image goes through
//! [`Vbios`]: command descriptors, data-table offsets, the prebuilt IIO
//! program index, and raw byte/word/dword reads. Every access is
//! bounds-checked against the image; there is no way to read past the ROM.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`image`] | Owned byte buffer with bounds-checked little-endian reads |
//! | [`layout`] | Binary table layouts (ROM, ROM table, command/data tables, firmware info) |
//! | [`iio`] | Indirect-I/O opcode set and the one-time program indexer |
//! | `tables` | [`Vbios`]: validated image + table locator + IIO index |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod error;
pub mod iio;
pub mod image;
pub mod layout;
mod tables;

pub use error::{Result, VbiosError};
pub use image::VbiosImage;
pub use layout::{
    AsicInitParameters, Command, CommandDescriptor, CommandTableEntry, FirmwareInfoV22, Rom,
    RomTable, TableHeader,
};
pub use tables::Vbios;
