//! `atomgpu` — command-line interface for AMD AtomBIOS POST.
//!
//! ```text
//! USAGE:
//!   atomgpu enumerate              List supported adapters
//!   atomgpu info <vbios.bin>       Inspect a VBIOS image file
//!   atomgpu rom-info <pcie-addr>   Inspect the VBIOS of a live adapter
//!   atomgpu post <pcie-addr>       Run AsicInit on a live adapter (root)
//! ```

use anyhow::{bail, Context, Result};
use atom_vbios::{Vbios, VbiosImage};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "atomgpu", about = "AMD AtomBIOS POST CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List all supported AMD adapters on the PCI bus.
    Enumerate,
    /// Parse a VBIOS image file and print its tables.
    Info {
        /// Path to a VBIOS dump (e.g. saved from sysfs `rom`).
        file: String,
    },
    /// Read a live adapter's expansion ROM and print its tables.
    RomInfo {
        /// PCIe address (e.g. 0000:01:00.0).
        pcie_addr: String,
    },
    /// Run the VBIOS AsicInit procedure (requires root).
    Post {
        /// PCIe address (e.g. 0000:01:00.0).
        pcie_addr: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Cmd::Enumerate => cmd_enumerate(),
        Cmd::Info { file } => cmd_info(&file),
        Cmd::RomInfo { pcie_addr } => cmd_rom_info(&pcie_addr),
        Cmd::Post { pcie_addr } => cmd_post(&pcie_addr),
    }
}

fn cmd_enumerate() -> Result<()> {
    let adapters = atom_driver::discover()?;

    println!("supported adapters: {}", adapters.len());
    for info in &adapters {
        println!(
            "  {} {:04x}:{:04x}",
            info.pcie_address, info.vendor_id, info.device_id
        );
    }
    Ok(())
}

fn cmd_info(file: &str) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {file}"))?;
    let bios = Vbios::new(VbiosImage::new(bytes)).context("image does not validate as a VBIOS")?;
    print_bios(&bios)
}

fn cmd_rom_info(pcie_addr: &str) -> Result<()> {
    let rom = atom_driver::pci::read_expansion_rom(pcie_addr)?;
    let bios = Vbios::new(VbiosImage::new(rom)).context("ROM does not validate as a VBIOS")?;
    print_bios(&bios)
}

fn print_bios(bios: &Vbios) -> Result<()> {
    println!("name:      {}", bios.name());
    println!("size:      {:#x} bytes", bios.image().len());

    let firmware = bios.firmware_info()?;
    println!("firmware:  {:#010x}", firmware.firmware_revision);
    println!("sclk:      {} kHz", firmware.default_sclk_freq * 10);
    println!("mclk:      {} kHz", firmware.default_mclk_freq * 10);

    let asic_init = bios.command(atom_vbios::Command::ASIC_INIT)?;
    println!(
        "asic_init: @{:#06x} len={:#06x} ws={:#04x} ps={:#04x}",
        asic_init.base, asic_init.size, asic_init.work_space_size, asic_init.parameter_space_size
    );

    let iio_count = (0..=u8::MAX).filter(|&p| bios.iio_program(p) != 0).count();
    println!("iio:       {iio_count} programs");
    Ok(())
}

fn cmd_post(pcie_addr: &str) -> Result<()> {
    let adapters = atom_driver::discover()?;
    let Some(info) = adapters.iter().find(|a| a.pcie_address == pcie_addr) else {
        bail!("{pcie_addr} is not a supported adapter (try `atomgpu enumerate`)");
    };

    let mut adapter = atom_driver::Adapter::open(info)?;
    println!("VBIOS is {}", adapter.bios().name());

    adapter.post()?;
    println!("POST complete; no display driver follows (ENODEV)");
    Ok(())
}
