//! The POST entry point.

use crate::error::Result;
use crate::interp;
use crate::mmio::RegisterIo;
use atom_vbios::{AsicInitParameters, Command, Vbios};

/// Environment toggle for the per-instruction interpreter trace.
const DEBUG_ENV: &str = "ATOMBIOS_DEBUG";

/// True when the `ATOMBIOS_DEBUG` environment toggle asks for the
/// per-instruction trace.
pub fn trace_enabled_from_env() -> bool {
    std::env::var_os(DEBUG_ENV).is_some_and(|v| v != "0")
}

/// Run the VBIOS `AsicInit` command with the firmware's default clocks.
///
/// # Errors
///
/// Fails when firmware info is missing or not revision 2.2, or when the
/// interpreter faults; either way POST did not complete and the device is
/// in an indeterminate state.
pub fn asic_init<D: RegisterIo>(bios: &Vbios, device: &mut D) -> Result<()> {
    let firmware = bios.firmware_info()?;
    let params = AsicInitParameters {
        sclk_freq: firmware.default_sclk_freq,
        mclk_freq: firmware.default_mclk_freq,
    };

    tracing::debug!(
        "initializing GPU with sclk={}kHz, mclk={}kHz",
        params.sclk_freq * 10,
        params.mclk_freq * 10
    );

    let mut words = params.words();
    interp::execute(
        bios,
        device,
        Command::ASIC_INIT,
        &mut words,
        trace_enabled_from_env(),
    )
}
