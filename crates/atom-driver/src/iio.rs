// SPDX-License-Identifier: AGPL-3.0-only

//! The indirect-I/O inner virtual machine.
//!
//! When the outer interpreter's port is set to indirect I/O, register
//! operands stop being plain MMIO accesses: each read or write runs a tiny
//! program from the VBIOS that mangles the register index and data through
//! a single 32-bit accumulator. Read programs carry the id the bytecode
//! names; write programs are selected by OR-ing in 0x80.

use crate::error::{AtomError, Result};
use crate::mmio::RegisterIo;
use atom_vbios::iio::IndirectIo;
use atom_vbios::Vbios;

/// Accumulator start value. Immaterial — every program overwrites the bits
/// it cares about — but kept at the vendor's fill pattern.
const TEMP_FILL: u32 = 0xCDCD_CDCD;

/// `w` consecutive ones from bit 0. The vendor formula shifts a full dword
/// by `32 - w`, which is undefined for `w == 32`; that width means "the
/// whole register" here.
pub(crate) fn bit_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// `w` ones starting at bit `shift`; empty when shifted clear off the top.
pub(crate) fn window_mask(width: u8, shift: u8) -> u32 {
    bit_mask(width).checked_shl(u32::from(shift)).unwrap_or(0)
}

/// Clear `width` bits of `temp` at `dst_shift`, then insert that many bits
/// of `source >> src_shift` there. Bits outside the window are untouched.
pub(crate) fn move_window(temp: u32, source: u32, width: u8, src_shift: u8, dst_shift: u8) -> u32 {
    let bits = source.checked_shr(u32::from(src_shift)).unwrap_or(0) & bit_mask(width);
    (temp & !window_mask(width, dst_shift)) | bits.checked_shl(u32::from(dst_shift)).unwrap_or(0)
}

/// Run indirect-I/O program `program` and return the accumulator.
///
/// `index` and `data` are the register index and write data of the outer
/// access; `io_attr` is the context's attribute word.
///
/// # Errors
///
/// Returns [`AtomError::InvalidIioProgram`] when the ROM has no such
/// program, and [`AtomError::InvalidIioOpcode`] when the program stream
/// contains a byte that is not an opcode (including a stray `Start`).
pub fn execute_iio<D: RegisterIo>(
    bios: &Vbios,
    device: &mut D,
    io_attr: u16,
    program: u8,
    index: u32,
    data: u32,
) -> Result<u32> {
    let entry = bios.iio_program(program);
    if entry == 0 {
        tracing::error!("invalid IIO program {program:#04x}");
        return Err(AtomError::InvalidIioProgram { program });
    }

    let mut pc = u32::from(entry);
    let mut read8 = |pc: &mut u32| -> Result<u8> {
        let b = bios.read8(*pc)?;
        *pc += 1;
        Ok(b)
    };

    let mut temp = TEMP_FILL;
    loop {
        let raw = read8(&mut pc)?;
        match IndirectIo::from_u8(raw) {
            Some(IndirectIo::Nop) => {}
            Some(IndirectIo::Read) => {
                let reg = u16::from_le_bytes([read8(&mut pc)?, read8(&mut pc)?]);
                temp = device.read_register(u32::from(reg));
            }
            Some(IndirectIo::Write) => {
                let reg = u16::from_le_bytes([read8(&mut pc)?, read8(&mut pc)?]);
                device.write_register(u32::from(reg), temp);
            }
            Some(IndirectIo::Clear) => {
                let width = read8(&mut pc)?;
                let shift = read8(&mut pc)?;
                temp &= !window_mask(width, shift);
            }
            Some(IndirectIo::Set) => {
                let width = read8(&mut pc)?;
                let shift = read8(&mut pc)?;
                temp |= window_mask(width, shift);
            }
            Some(IndirectIo::MoveIndex) => {
                let (w, s, d) = (read8(&mut pc)?, read8(&mut pc)?, read8(&mut pc)?);
                temp = move_window(temp, index, w, s, d);
            }
            Some(IndirectIo::MoveData) => {
                let (w, s, d) = (read8(&mut pc)?, read8(&mut pc)?, read8(&mut pc)?);
                temp = move_window(temp, data, w, s, d);
            }
            Some(IndirectIo::MoveAttr) => {
                let (w, s, d) = (read8(&mut pc)?, read8(&mut pc)?, read8(&mut pc)?);
                temp = move_window(temp, u32::from(io_attr), w, s, d);
            }
            // The two trailing bytes of End are part of the encoding but
            // carry nothing.
            Some(IndirectIo::End) => return Ok(temp),
            Some(IndirectIo::Start) | None => {
                tracing::error!("invalid IIO opcode {raw:#04x}");
                return Err(AtomError::InvalidIioOpcode { opcode: raw });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_width_masks() {
        assert_eq!(bit_mask(32), u32::MAX);
        assert_eq!(bit_mask(33), u32::MAX);
        assert_eq!(bit_mask(1), 1);
        assert_eq!(bit_mask(16), 0xFFFF);
        assert_eq!(window_mask(8, 8), 0xFF00);
        assert_eq!(window_mask(32, 0), u32::MAX);
    }

    #[test]
    fn move_window_preserves_outside_bits() {
        // Insert 4 bits of source>>8 at bit 16.
        let out = move_window(0xFFFF_FFFF, 0x0000_0A00, 4, 8, 16);
        assert_eq!(out, 0xFFFA_FFFF);
        // Untouched windows keep their old value.
        assert_eq!(out & 0xFFFF, 0xFFFF);
        assert_eq!(out >> 20, 0xFFF);
    }

    #[test]
    fn move_window_full_dword() {
        assert_eq!(move_window(0xDEAD_BEEF, 0x1234_5678, 32, 0, 0), 0x1234_5678);
    }
}
