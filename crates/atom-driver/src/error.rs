//! Error types for driver and interpreter operations

use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, AtomError>;

/// Errors that can occur while bringing up a GPU
#[derive(Debug, Error)]
pub enum AtomError {
    /// VBIOS image or table error
    #[error(transparent)]
    Vbios(#[from] atom_vbios::VbiosError),

    /// I/O error talking to sysfs
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// No supported adapter was found on the PCI bus
    #[error("no supported AMD adapters found")]
    NoAdapters,

    /// The device exposes no expansion ROM
    #[error("no PCI expansion ROM")]
    NoExpansionRom,

    /// BAR mapping failed
    #[error("MMIO map failed: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// The bytecode contained an undefined instruction
    #[error("invalid instruction {opcode:#04x} at {base:#06x}+{pc:#06x}")]
    InvalidInstruction {
        /// Raw opcode byte
        opcode: u8,
        /// Image offset of the command entry
        base: u16,
        /// Bytecode-relative program counter
        pc: u16,
    },

    /// A known instruction that vendor drivers never emit for this family
    #[error("unimplemented opcode: {name}")]
    UnimplementedOpcode {
        /// Instruction mnemonic
        name: &'static str,
    },

    /// An operand or port kind that is detected but not supported
    #[error("{what} is not implemented")]
    NotImplemented {
        /// What was asked for
        what: &'static str,
    },

    /// An indirect-I/O program contained an undefined opcode
    #[error("invalid indirect IO opcode {opcode:#04x}")]
    InvalidIioOpcode {
        /// Raw opcode byte
        opcode: u8,
    },

    /// An indirect-I/O program id with no program in the ROM
    #[error("invalid indirect IO program {program:#04x}")]
    InvalidIioProgram {
        /// Program id that was looked up
        program: u8,
    },

    /// A switch body contained neither a case nor the end sentinel
    #[error("invalid switch case byte {byte:#04x}")]
    InvalidCase {
        /// The offending byte
        byte: u8,
    },

    /// Writing to an operand kind that cannot be written
    #[error("cannot write to {what} operand")]
    InvalidDestination {
        /// Operand kind
        what: &'static str,
    },

    /// A parameter-space or workspace access past the allocated words
    #[error("{what} index {index:#04x} out of range")]
    OperandOutOfRange {
        /// Which space was indexed
        what: &'static str,
        /// The out-of-range index
        index: u32,
    },

    /// The caller's parameter block is smaller than the command requires
    #[error("parameter space too small: need {needed} bytes, have {have}")]
    ParameterSpaceTooSmall {
        /// Bytes the command descriptor asks for
        needed: usize,
        /// Bytes the caller provided
        have: usize,
    },

    /// Table recursion exceeded the depth cap
    #[error("call table recursion exceeds depth {depth}")]
    CallDepthExceeded {
        /// Depth at which the call was refused
        depth: u16,
    },
}
