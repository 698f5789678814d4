//! Indirect-I/O interpreter properties over synthetic programs.

mod common;

use atom_driver::iio::execute_iio;
use atom_driver::AtomError;
use common::{MockDevice, VbiosBuilder};

/// Accumulator fill pattern before a program's first write to it.
const FILL: u32 = 0xCDCD_CDCD;

#[test]
fn clear_and_set_carve_bit_windows() {
    let bios = VbiosBuilder::new()
        .asic_init(&[0x5B])
        // Clear 8 bits at 8, set 4 bits at 0.
        .iio_program(1, &[4, 8, 8, 5, 4, 0])
        .build();
    let mut dev = MockDevice::new();

    let out = execute_iio(&bios, &mut dev, 0, 1, 0, 0).unwrap();
    assert_eq!(out, (FILL & !0x0000_FF00) | 0x0000_000F);
}

#[test]
fn clear_width_32_clears_everything() {
    let bios = VbiosBuilder::new()
        .asic_init(&[0x5B])
        .iio_program(1, &[4, 32, 0])
        .build();
    let mut dev = MockDevice::new();

    assert_eq!(execute_iio(&bios, &mut dev, 0, 1, 0, 0).unwrap(), 0);
}

#[test]
fn move_index_inserts_a_window_and_preserves_the_rest() {
    // Insert 16 bits of index>>0 at bit 8.
    let bios = VbiosBuilder::new()
        .asic_init(&[0x5B])
        .iio_program(2, &[6, 16, 0, 8])
        .build();
    let mut dev = MockDevice::new();

    let out = execute_iio(&bios, &mut dev, 0, 2, 0x1234, 0).unwrap();
    assert_eq!(out, (FILL & 0xFF00_00FF) | (0x1234 << 8));
}

#[test]
fn move_data_and_attr_select_their_sources() {
    let bios = VbiosBuilder::new()
        .asic_init(&[0x5B])
        // temp <- data (full width), then low byte of attr>>4 into bits 0..4.
        .iio_program(3, &[8, 32, 0, 0, 7, 4, 4, 0])
        .build();
    let mut dev = MockDevice::new();

    let out = execute_iio(&bios, &mut dev, 0x00A5, 3, 0, 0xFFFF_FFFF).unwrap();
    assert_eq!(out, (0xFFFF_FFFF & !0xF) | 0xA);
}

#[test]
fn read_and_write_reach_the_device() {
    let bios = VbiosBuilder::new()
        .asic_init(&[0x5B])
        // temp <- reg 0x0100, set bit 0, write back.
        .iio_program(4, &[2, 0x00, 0x01, 5, 1, 0, 3, 0x00, 0x01])
        .build();
    let mut dev = MockDevice::new().with_reg(0x100, 0x1000_0000);

    let out = execute_iio(&bios, &mut dev, 0, 4, 0, 0).unwrap();
    assert_eq!(out, 0x1000_0001);
    assert_eq!(dev.reads, vec![0x100]);
    assert_eq!(dev.writes, vec![(0x100, 0x1000_0001)]);
}

#[test]
fn nop_is_a_nop() {
    let bios = VbiosBuilder::new()
        .asic_init(&[0x5B])
        .iio_program(5, &[0, 0, 0])
        .build();
    let mut dev = MockDevice::new();

    assert_eq!(execute_iio(&bios, &mut dev, 0, 5, 0, 0).unwrap(), FILL);
}

#[test]
fn unknown_program_id_fails() {
    let bios = VbiosBuilder::new().asic_init(&[0x5B]).build();
    let mut dev = MockDevice::new();

    assert!(matches!(
        execute_iio(&bios, &mut dev, 0, 9, 0, 0),
        Err(AtomError::InvalidIioProgram { program: 9 })
    ));
}

#[test]
fn stray_start_inside_a_program_fails() {
    // The body re-enters Start, which is only legal at top level.
    let bios = VbiosBuilder::new()
        .asic_init(&[0x5B])
        .iio_program(6, &[1, 7])
        .build();
    let mut dev = MockDevice::new();

    assert!(matches!(
        execute_iio(&bios, &mut dev, 0, 6, 0, 0),
        Err(AtomError::InvalidIioOpcode { opcode: 1 })
    ));
}
