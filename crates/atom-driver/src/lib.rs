//! POST driver for Volcanic Islands generation AMD discrete GPUs.
//!
//! After reset the GPU's clocks, memory controller, and display pipeline
//! are dead until the `AsicInit` procedure embedded in the card's VBIOS has
//! run. That procedure is bytecode for AMD's AtomBIOS virtual machine; this
//! crate locates the VBIOS through the PCI expansion ROM, maps the register
//! BAR, and interprets the bytecode against the live device.
//!
//! ```no_run
//! # fn main() -> atom_driver::Result<()> {
//! let adapters = atom_driver::discover()?;
//! let mut adapter = atom_driver::Adapter::open(&adapters[0])?;
//! println!("VBIOS is {}", adapter.bios().name());
//! adapter.post()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`vi`] | Volcanic Islands silicon constants (device ids, PCIE index/data) |
//! | [`pci`] | sysfs PCI layer: discovery, config space, expansion ROM |
//! | [`mmio`] | BAR mapping and the 32-bit register transport |
//! | [`opcodes`] | AtomBIOS instruction set: decode table, locations, address modes |
//! | [`interp`] | The outer AtomBIOS virtual machine |
//! | [`iio`] | The indirect-I/O inner virtual machine |
//! | [`device`] | [`Adapter`]: VBIOS + register window + POST entry point |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

mod device;
mod error;
pub mod iio;
pub mod interp;
pub mod mmio;
pub mod opcodes;
pub mod pci;
mod post;
mod trace;
pub mod vi;

pub use device::Adapter;
pub use error::{AtomError, Result};
pub use interp::{execute, Context, MAX_CALL_DEPTH};
pub use mmio::{MmioRegion, RegisterIo, RegisterWindow};
pub use pci::{discover, AdapterInfo};
pub use post::{asic_init, trace_enabled_from_env};
