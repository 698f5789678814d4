//! End-to-end interpreter scenarios over synthetic VBIOS images.

mod common;

use atom_driver::{execute, AtomError};
use atom_vbios::Command;
use common::{command_base, MockDevice, VbiosBuilder};

const EOT: u8 = 0x5B;

#[test]
fn smallest_valid_post() {
    // A lone Eot: POST succeeds without touching the device.
    let bios = VbiosBuilder::new().asic_init(&[EOT]).build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command::ASIC_INIT, &mut params, false).unwrap();

    assert!(dev.reads.is_empty());
    assert!(dev.writes.is_empty());
}

#[test]
fn simple_register_write() {
    // Move reg[0x1234] <- imm dword 0xEFBEADDE, then Eot.
    let code = [
        0x01, 0x05, 0x34, 0x12, 0xDE, 0xAD, 0xBE, 0xEF, // move
        EOT,
    ];
    let bios = VbiosBuilder::new().asic_init(&code).build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command::ASIC_INIT, &mut params, false).unwrap();

    // A dword move must not pre-read the destination register.
    assert!(dev.reads.is_empty());
    assert_eq!(dev.writes, vec![(0x1234, 0xEFBE_ADDE)]);
}

#[test]
fn conditional_jump_skips_poison_write() {
    // Compare two equal registers, jump over a register write to Eot.
    let code = [
        0x3C, 0x00, 0x10, 0x00, 0x11, 0x00, // compare reg[0x10], reg[0x11]
        0x44, 23, 0x00, // jump equal -> Eot (bytecode offset 17 + header 6)
        0x01, 0x05, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, // poison write
        EOT,
    ];
    let bios = VbiosBuilder::new().asic_init(&code).build();
    let mut dev = MockDevice::new().with_reg(0x10, 5).with_reg(0x11, 5);
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command::ASIC_INIT, &mut params, false).unwrap();

    assert_eq!(dev.reads, vec![0x10, 0x11]);
    assert!(dev.writes.is_empty(), "the jumped-over move must not run");
}

#[test]
fn conditional_jump_not_taken_executes_fallthrough() {
    let code = [
        0x3C, 0x00, 0x10, 0x00, 0x11, 0x00, // compare reg[0x10], reg[0x11]
        0x44, 23, 0x00, // jump equal -> Eot
        0x01, 0x05, 0x34, 0x12, 0x01, 0x00, 0x00, 0x00, // move reg[0x1234] <- 1
        EOT,
    ];
    let bios = VbiosBuilder::new().asic_init(&code).build();
    let mut dev = MockDevice::new().with_reg(0x10, 5).with_reg(0x11, 6);
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command::ASIC_INIT, &mut params, false).unwrap();

    assert_eq!(dev.writes, vec![(0x1234, 1)]);
}

#[test]
fn iio_write_selects_program_with_high_bit() {
    // SetPort ATI 3, then a register write: the interpreter must run IIO
    // program 3|0x80 with the move's index and data.
    let code = [
        0x37, 0x03, 0x00, // setport ati 3
        0x01, 0x05, 0x10, 0x00, 0x0D, 0x0C, 0x0B, 0x0A, // move reg[0x10] <- 0x0A0B0C0D
        EOT,
    ];
    let bios = VbiosBuilder::new()
        .asic_init(&code)
        // Program 0x83: temp <- data, then write it to register 0x100.
        .iio_program(0x83, &[8, 32, 0, 0, 3, 0x00, 0x01])
        .build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command::ASIC_INIT, &mut params, false).unwrap();

    assert!(dev.reads.is_empty());
    assert_eq!(dev.writes, vec![(0x100, 0x0A0B_0C0D)]);
}

#[test]
fn iio_read_uses_low_program_id() {
    // SetPort ATI 3, then a register read: runs IIO program 3 (no high bit).
    let code = [
        0x37, 0x03, 0x00, // setport ati 3
        0x02, 0x00, 0x00, 0x10, 0x00, // move ps[0] <- reg[0x10]
        EOT,
    ];
    let bios = VbiosBuilder::new()
        .asic_init(&code)
        // Program 3: temp <- device register 0x100.
        .iio_program(0x03, &[2, 0x00, 0x01])
        .build();
    let mut dev = MockDevice::new().with_reg(0x100, 0x55AA_1234);
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command::ASIC_INIT, &mut params, false).unwrap();

    assert_eq!(dev.reads, vec![0x100]);
    assert_eq!(params[0], 0x55AA_1234);
}

#[test]
fn missing_iio_program_is_an_error() {
    let code = [
        0x37, 0x07, 0x00, // setport ati 7 (no such program)
        0x02, 0x00, 0x00, 0x10, 0x00, // move ps[0] <- reg[0x10]
        EOT,
    ];
    let bios = VbiosBuilder::new().asic_init(&code).build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    let err = execute(&bios, &mut dev, Command::ASIC_INIT, &mut params, false).unwrap_err();
    assert!(matches!(err, AtomError::InvalidIioProgram { program: 7 }));
}

#[test]
fn call_table_shares_context_but_not_workspace() {
    // Parent: seed ws[0], call child, then surface quotient and ws[0] into
    // parameter space and write a register through the child's reg_block.
    let parent = [
        0x03, 0x05, 0x00, 0x55, 0x55, 0xAA, 0xAA, // move ws[0] <- 0xAAAA5555
        0x52, 0x01, // calltable 1
        0x02, 0x02, 0x00, 0x40, // move ps[0] <- ws[quotient]
        0x02, 0x02, 0x01, 0x00, // move ps[1] <- ws[0]
        0x01, 0x05, 0x10, 0x00, 0x01, 0x00, 0x00, 0x00, // move reg[0x10] <- 1
        EOT,
    ];
    // Child: set quotient and its own ws[0], and move the register block.
    let child = [
        0x03, 0x05, 0x40, 0x34, 0x12, 0x00, 0x00, // move ws[quotient] <- 0x1234
        0x03, 0x05, 0x00, 0xBB, 0xBB, 0x00, 0x00, // move ws[0] <- 0xBBBB
        0x3A, 0x00, 0x02, // setregblock 0x0200
        EOT,
    ];
    let bios = VbiosBuilder::new()
        .command(0, &parent, 0x10, 8)
        .command(1, &child, 0x10, 0)
        .build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command(0), &mut params, false).unwrap();

    // Context changes made by the child persist in the parent...
    assert_eq!(params[0], 0x1234, "divmul must survive the return");
    assert_eq!(dev.writes, vec![(0x210, 1)], "reg_block must survive the return");
    // ...but the child's workspace does not.
    assert_eq!(params[1], 0xAAAA_5555, "child ws writes must stay in the child");
}

#[test]
fn call_table_io_mode_persists_in_parent() {
    let parent = [
        0x52, 0x01, // calltable 1
        0x01, 0x05, 0x10, 0x00, 0x01, 0x00, 0x00, 0x00, // move reg[0x10] <- 1
        EOT,
    ];
    let child = [
        0x37, 0x03, 0x00, // setport ati 3
        EOT,
    ];
    let bios = VbiosBuilder::new()
        .command(0, &parent, 0x10, 0)
        .command(1, &child, 0x10, 0)
        .iio_program(0x83, &[8, 32, 0, 0, 3, 0x00, 0x01])
        .build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command(0), &mut params, false).unwrap();

    // The parent's register write went through the child's port selection.
    assert_eq!(dev.writes, vec![(0x100, 1)]);
}

#[test]
fn div_by_zero_clears_divmul_without_fault() {
    let code = [
        0x03, 0x05, 0x40, 0x07, 0x00, 0x00, 0x00, // move ws[quotient] <- 7
        0x03, 0x05, 0x41, 0x09, 0x00, 0x00, 0x00, // move ws[remainder] <- 9
        0x27, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, // div ws[0] / imm 0
        0x02, 0x02, 0x00, 0x40, // move ps[0] <- ws[quotient]
        0x02, 0x02, 0x01, 0x41, // move ps[1] <- ws[remainder]
        EOT,
    ];
    let bios = VbiosBuilder::new().asic_init(&code).build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command::ASIC_INIT, &mut params, false).unwrap();

    assert_eq!(params[0], 0);
    assert_eq!(params[1], 0);
}

#[test]
fn unsupported_command_reports_enxio() {
    let bios = VbiosBuilder::new().asic_init(&[EOT]).build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    let err = execute(&bios, &mut dev, Command(5), &mut params, false).unwrap_err();
    assert!(matches!(
        err,
        AtomError::Vbios(atom_vbios::VbiosError::UnsupportedCommand { index: 5 })
    ));
}

#[test]
fn runaway_recursion_hits_the_depth_cap() {
    // A command that calls itself forever.
    let code = [0x52, 0x00, EOT];
    let bios = VbiosBuilder::new().command(0, &code, 0x10, 0).build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    let err = execute(&bios, &mut dev, Command(0), &mut params, false).unwrap_err();
    assert!(matches!(err, AtomError::CallDepthExceeded { .. }));
}

#[test]
fn set_data_block_ff_is_the_current_command_base() {
    // The child must see its own entry base, not the root's.
    let parent = [
        0x66, 0xFF, // setdatablock 0xff
        0x02, 0x02, 0x00, 0x42, // move ps[0] <- ws[dataptr]
        0x52, 0x01, // calltable 1
        EOT,
    ];
    let child = [
        0x66, 0xFF, // setdatablock 0xff
        0x02, 0x02, 0x00, 0x42, // move ps[0] <- ws[dataptr] (child ps = parent ps[2..])
        EOT,
    ];
    let bios = VbiosBuilder::new()
        .command(0, &parent, 0x10, 8)
        .command(1, &child, 0x10, 0)
        .build();
    let mut dev = MockDevice::new();
    let mut params = [0u32; 16];

    execute(&bios, &mut dev, Command(0), &mut params, false).unwrap();

    assert_eq!(params[0], u32::from(command_base(0)));
    assert_eq!(params[2], u32::from(command_base(1)));
}
