//! Adapter handle: enabled PCI device, owned VBIOS, mapped register window.

use crate::error::Result;
use crate::mmio::{MmioRegion, RegisterWindow};
use crate::pci::{self, AdapterInfo};
use crate::{post, vi};
use atom_vbios::{Vbios, VbiosImage};

/// An opened adapter, ready to POST.
#[derive(Debug)]
pub struct Adapter {
    info: AdapterInfo,
    bios: Vbios,
    window: RegisterWindow,
}

impl Adapter {
    /// Enable the device, copy its VBIOS out of the expansion ROM, and map
    /// the register BAR.
    ///
    /// # Errors
    ///
    /// Fails when the device cannot be enabled, has no expansion ROM, the
    /// ROM does not validate as a VBIOS, or the BAR cannot be mapped.
    pub fn open(info: &AdapterInfo) -> Result<Self> {
        tracing::debug!("AMD native graphics adapter @ {}", info.pcie_address);

        pci::enable_device(&info.pcie_address)?;

        let rom = pci::read_expansion_rom(&info.pcie_address)?;
        tracing::info!("loaded VBIOS from PCI expansion ROM");
        let bios = Vbios::new(VbiosImage::new(rom))?;
        tracing::info!("VBIOS is {}", bios.name());

        let region = MmioRegion::map_bar(&info.pcie_address, vi::MMIO_BAR)?;
        let window = RegisterWindow::new(region);

        Ok(Self {
            info: info.clone(),
            bios,
            window,
        })
    }

    /// Discovery record this adapter was opened from.
    pub fn info(&self) -> &AdapterInfo {
        &self.info
    }

    /// The adapter's VBIOS.
    pub fn bios(&self) -> &Vbios {
        &self.bios
    }

    /// Run `AsicInit`. After this succeeds the GPU's clocks and memory
    /// controller are programmed and ordinary MMIO behaves.
    ///
    /// # Errors
    ///
    /// Any interpreter error is fatal to POST; the device state is then
    /// indeterminate.
    pub fn post(&mut self) -> Result<()> {
        post::asic_init(&self.bios, &mut self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pci;

    #[test]
    #[ignore] // Requires hardware and root
    fn opens_first_discovered_adapter() {
        let adapters = pci::discover().expect("discovery");
        let adapter = Adapter::open(&adapters[0]).expect("open");
        println!("VBIOS is {}", adapter.bios().name());
        assert!(adapter.bios().image().len() >= 0x4000);
    }
}
