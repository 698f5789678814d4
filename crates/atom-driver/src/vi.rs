//! Volcanic Islands silicon constants.
//!
//! Register indices are from the amdgpu `bif_5_0` block; device ids are the
//! boards this driver has been exercised against.

/// AMD/ATI PCI vendor id.
pub const AMD_VENDOR_ID: u16 = 0x1002;

/// Device ids for the supported card family.
pub mod device_id {
    /// Polaris 10 — RX 470/480/570/580 boards (`lspci: 1002:67df`).
    pub const POLARIS10: u16 = 0x67DF;
}

/// All device ids this driver will bind to.
pub const SUPPORTED_DEVICE_IDS: &[u16] = &[device_id::POLARIS10];

/// True if `device_id` names a card this driver can POST.
pub fn is_supported(device_id: u16) -> bool {
    SUPPORTED_DEVICE_IDS.contains(&device_id)
}

/// Register indices used by the MMIO transport.
pub mod regs {
    /// Index half of the PCIe indirect register window.
    pub const PCIE_INDEX: u32 = 0xE;
    /// Data half of the PCIe indirect register window.
    pub const PCIE_DATA: u32 = 0xF;
}

/// BAR carrying the register aperture on GFX7 and later.
pub const MMIO_BAR: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_ids() {
        assert!(is_supported(0x67DF));
        assert!(!is_supported(0x67EF));
    }

    #[test]
    fn pcie_window_is_inside_any_mapping() {
        // The fallback path writes these while the window is held, so they
        // must sit below any plausible BAR size.
        assert!(regs::PCIE_INDEX * 4 < 0x100);
        assert!(regs::PCIE_DATA * 4 < 0x100);
    }
}
