//! sysfs PCI platform layer.
//!
//! Discovery, config-space access, and expansion-ROM acquisition all go
//! through `/sys/bus/pci/devices`. Nothing here is specific to the
//! interpreter; it exists to hand the driver an enabled device, a register
//! BAR, and an owned copy of the VBIOS.

use crate::error::{AtomError, Result};
use crate::vi;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// PCI config-space offsets used by the driver.
pub mod config {
    /// Command register (u16).
    pub const COMMAND: u64 = 0x04;

    /// Command-register bits.
    pub mod command {
        /// Respond to I/O space accesses.
        pub const IO_SPACE: u16 = 1 << 0;
        /// Respond to memory space accesses.
        pub const MEMORY_SPACE: u16 = 1 << 1;
        /// Allow the device to master the bus.
        pub const BUS_MASTER: u16 = 1 << 2;
    }
}

/// A discovered, supported adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// sysfs PCIe address (`0000:01:00.0`).
    pub pcie_address: String,
    /// PCI vendor id.
    pub vendor_id: u16,
    /// PCI device id.
    pub device_id: u16,
}

/// Scan the PCI bus for adapters this driver can POST.
///
/// # Errors
///
/// Returns [`AtomError::NoAdapters`] when nothing supported is present.
pub fn discover() -> Result<Vec<AdapterInfo>> {
    tracing::info!("scanning PCI bus for supported AMD adapters");

    let mut adapters = Vec::new();
    for entry in fs::read_dir("/sys/bus/pci/devices")? {
        let entry = entry?;
        let Some(vendor_id) = read_sysfs_hex(&entry.path().join("vendor")) else {
            continue;
        };
        let Some(device_id) = read_sysfs_hex(&entry.path().join("device")) else {
            continue;
        };
        if vendor_id != vi::AMD_VENDOR_ID || !vi::is_supported(device_id) {
            continue;
        }

        let pcie_address = entry.file_name().to_string_lossy().into_owned();
        tracing::info!("found supported adapter {vendor_id:04x}:{device_id:04x} @ {pcie_address}");
        adapters.push(AdapterInfo {
            pcie_address,
            vendor_id,
            device_id,
        });
    }

    if adapters.is_empty() {
        tracing::error!("no supported AMD adapters found");
        return Err(AtomError::NoAdapters);
    }
    Ok(adapters)
}

fn read_sysfs_hex(path: &Path) -> Option<u16> {
    parse_sysfs_hex(&fs::read_to_string(path).ok()?)
}

fn parse_sysfs_hex(content: &str) -> Option<u16> {
    u16::from_str_radix(content.trim().trim_start_matches("0x"), 16).ok()
}

/// Enable the device: sysfs `enable`, then memory/I-O decode and bus
/// mastering in the command register.
pub fn enable_device(pcie_address: &str) -> Result<()> {
    let enable_path = format!("/sys/bus/pci/devices/{pcie_address}/enable");
    if let Err(e) = fs::write(&enable_path, "1") {
        // Not fatal: the device may already be enabled by firmware.
        tracing::warn!("could not write {enable_path}: {e}");
    }

    let mut command = read_config16(pcie_address, config::COMMAND)?;
    command |= config::command::IO_SPACE | config::command::MEMORY_SPACE
        | config::command::BUS_MASTER;
    write_config16(pcie_address, config::COMMAND, command)?;

    tracing::debug!("enabled {pcie_address} (command={command:#06x})");
    Ok(())
}

/// Read a u16 from the device's config space.
pub fn read_config16(pcie_address: &str, offset: u64) -> Result<u16> {
    let mut buf = [0u8; 2];
    let mut f = config_file(pcie_address, false)?;
    f.seek(SeekFrom::Start(offset))?;
    f.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Write a u16 into the device's config space.
pub fn write_config16(pcie_address: &str, offset: u64, value: u16) -> Result<()> {
    let mut f = config_file(pcie_address, true)?;
    f.seek(SeekFrom::Start(offset))?;
    f.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Copy the expansion ROM into an owned buffer.
///
/// The sysfs `rom` file gates decode behind an explicit enable: write `1`,
/// read the image, and always write `0` back so the decode window is not
/// left open.
///
/// # Errors
///
/// Returns [`AtomError::NoExpansionRom`] when the device exposes no ROM or
/// the ROM reads back empty.
pub fn read_expansion_rom(pcie_address: &str) -> Result<Vec<u8>> {
    let path = format!("/sys/bus/pci/devices/{pcie_address}/rom");
    if !Path::new(&path).exists() {
        return Err(AtomError::NoExpansionRom);
    }

    fs::write(&path, "1")?;
    let data = fs::read(&path);
    // Restore on every exit path.
    if let Err(e) = fs::write(&path, "0") {
        tracing::warn!("could not restore ROM decode enable on {pcie_address}: {e}");
    }

    let data = data?;
    if data.is_empty() {
        return Err(AtomError::NoExpansionRom);
    }
    tracing::info!("read {} byte expansion ROM from {pcie_address}", data.len());
    Ok(data)
}

fn config_file(pcie_address: &str, write: bool) -> std::io::Result<std::fs::File> {
    let path = format!("/sys/bus/pci/devices/{pcie_address}/config");
    OpenOptions::new().read(true).write(write).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sysfs_hex_ids() {
        assert_eq!(parse_sysfs_hex("0x1002\n"), Some(0x1002));
        assert_eq!(parse_sysfs_hex("0x67df\n"), Some(0x67DF));
        assert_eq!(parse_sysfs_hex("67df"), Some(0x67DF));
        assert_eq!(parse_sysfs_hex("not hex"), None);
    }

    #[test]
    #[ignore] // Requires hardware
    fn discovers_real_adapter() {
        let adapters = discover().expect("discovery");
        for info in &adapters {
            println!("{} {:04x}:{:04x}", info.pcie_address, info.vendor_id, info.device_id);
            assert_eq!(info.vendor_id, vi::AMD_VENDOR_ID);
        }
    }

    #[test]
    #[ignore] // Requires hardware
    fn reads_real_expansion_rom() {
        let adapters = discover().expect("discovery");
        let rom = read_expansion_rom(&adapters[0].pcie_address).expect("rom");
        assert_eq!(u16::from_le_bytes([rom[0], rom[1]]), 0xAA55);
    }
}
