//! The AtomBIOS instruction set.
//!
//! One raw byte selects an instruction; the 127-entry table below maps it to
//! an opcode kind plus a secondary (destination location, jump condition,
//! port, or delay unit) exactly as vendor firmware expects. Entry 0 and any
//! byte past the table decode as [`OpCode::Invalid`].

/// Opcode kinds of the outer virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum OpCode {
    Invalid,
    Move,
    And,
    Or,
    ShiftLeft,
    ShiftRight,
    Mul,
    Div,
    Add,
    Sub,
    SetPort,
    SetRegBlock,
    SetFbBase,
    Compare,
    Switch,
    Jump,
    Test,
    Delay,
    CallTable,
    Repeat,
    Clear,
    Nop,
    Eot,
    Mask,
    PostCard,
    Beep,
    SaveReg,
    RestoreReg,
    SetDataBlock,
    Xor,
    Shl,
    Shr,
    Debug,
    ProcessDs,
    Mul32,
    Div32,
}

impl OpCode {
    /// Trace mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Move => "move",
            Self::And => "and",
            Self::Or => "or",
            Self::ShiftLeft => "shiftleft",
            Self::ShiftRight => "shiftright",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::SetPort => "setport",
            Self::SetRegBlock => "setregblock",
            Self::SetFbBase => "setfbbase",
            Self::Compare => "compare",
            Self::Switch => "switch",
            Self::Jump => "jump",
            Self::Test => "test",
            Self::Delay => "delay",
            Self::CallTable => "calltable",
            Self::Repeat => "repeat",
            Self::Clear => "clear",
            Self::Nop => "nop",
            Self::Eot => "eot",
            Self::Mask => "mask",
            Self::PostCard => "postcard",
            Self::Beep => "beep",
            Self::SaveReg => "savereg",
            Self::RestoreReg => "restorereg",
            Self::SetDataBlock => "setdatablock",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Debug => "debug",
            Self::ProcessDs => "processds",
            Self::Mul32 => "mul32",
            Self::Div32 => "div32",
        }
    }
}

/// Operand locations, encoded in the low three attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Location {
    Register = 0,
    ParameterSpace = 1,
    WorkSpace = 2,
    FrameBuffer = 3,
    Id = 4,
    Immediate = 5,
    PhaseLockedLoop = 6,
    MemController = 7,
}

impl Location {
    /// Decode the low three bits of an attribute byte.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0 => Self::Register,
            1 => Self::ParameterSpace,
            2 => Self::WorkSpace,
            3 => Self::FrameBuffer,
            4 => Self::Id,
            5 => Self::Immediate,
            6 => Self::PhaseLockedLoop,
            _ => Self::MemController,
        }
    }
}

/// Jump conditions, evaluated against the comparison flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Condition {
    Always,
    Equal,
    Below,
    Above,
    BelowOrEqual,
    AboveOrEqual,
    NotEqual,
}

impl Condition {
    /// Trace mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Equal => "equal",
            Self::Below => "below",
            Self::Above => "above",
            Self::BelowOrEqual => "beloworequal",
            Self::AboveOrEqual => "aboveorequal",
            Self::NotEqual => "notequal",
        }
    }
}

/// Register port kinds selected by `SetPort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Port {
    Ati,
    Pci,
    SysIo,
}

/// Delay units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Unit {
    MilliSecond,
    MicroSecond,
}

/// How register operands reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoMode {
    /// Straight through the MMIO window.
    #[default]
    MemoryMapped,
    /// PCI config space. Detected, not implemented.
    Pci,
    /// Legacy system I/O. Detected, not implemented.
    SysIo,
    /// Through an indirect-I/O program.
    Iio,
}

/// Sub-field of the 32-bit value at an operand location, encoded in
/// attribute bits 3–5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AddressMode {
    DWord,
    Word0,
    Word8,
    Word16,
    Byte0,
    Byte8,
    Byte16,
    Byte24,
}

impl AddressMode {
    /// Decode three mode bits.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0 => Self::DWord,
            1 => Self::Word0,
            2 => Self::Word8,
            3 => Self::Word16,
            4 => Self::Byte0,
            5 => Self::Byte8,
            6 => Self::Byte16,
            _ => Self::Byte24,
        }
    }

    /// Encoded mode bits.
    pub fn bits(self) -> u8 {
        match self {
            Self::DWord => 0,
            Self::Word0 => 1,
            Self::Word8 => 2,
            Self::Word16 => 3,
            Self::Byte0 => 4,
            Self::Byte8 => 5,
            Self::Byte16 => 6,
            Self::Byte24 => 7,
        }
    }

    /// Extract this sub-field from a raw dword.
    pub fn extract(self, raw: u32) -> u32 {
        match self {
            Self::DWord => raw,
            Self::Word0 => raw & 0x0000_FFFF,
            Self::Word8 => (raw & 0x00FF_FF00) >> 8,
            Self::Word16 => (raw & 0xFFFF_0000) >> 16,
            Self::Byte0 => raw & 0x0000_00FF,
            Self::Byte8 => (raw & 0x0000_FF00) >> 8,
            Self::Byte16 => (raw & 0x00FF_0000) >> 16,
            Self::Byte24 => (raw & 0xFF00_0000) >> 24,
        }
    }

    /// Merge a sub-field value back into a raw dword, firmware-style: the
    /// target lane is cleared and the value ORed in at the lane shift,
    /// without masking the value itself.
    pub fn merge(self, raw: u32, value: u32) -> u32 {
        match self {
            Self::DWord => value,
            Self::Word0 => (raw & 0xFFFF_0000) | value,
            Self::Word8 => (raw & 0xFF00_00FF) | (value << 8),
            Self::Word16 => (raw & 0x0000_FFFF) | (value << 16),
            Self::Byte0 => (raw & 0xFFFF_FF00) | value,
            Self::Byte8 => (raw & 0xFFFF_00FF) | (value << 8),
            Self::Byte16 => (raw & 0xFF00_FFFF) | (value << 16),
            Self::Byte24 => (raw & 0x00FF_FFFF) | (value << 24),
        }
    }
}

/// Workspace indices that alias interpreter context fields.
pub mod workspace_reg {
    /// `divmul[0]`.
    pub const QUOTIENT: u8 = 0x40;
    /// `divmul[1]`.
    pub const REMAINDER: u8 = 0x41;
    /// The active data block offset.
    pub const DATA_PTR: u8 = 0x42;
    /// The shift register.
    pub const SHIFT: u8 = 0x43;
    /// `1 << shift`; read-only.
    pub const OR_MASK: u8 = 0x44;
    /// `!(1 << shift)`; read-only.
    pub const AND_MASK: u8 = 0x45;
    /// The framebuffer window base.
    pub const FB_WINDOW: u8 = 0x46;
    /// The I/O attribute word.
    pub const ATTRIBUTES: u8 = 0x47;
    /// The register block offset.
    pub const REG_PTR: u8 = 0x48;
}

/// Byte that begins a switch case.
pub const CASE_MAGIC: u8 = 0x63;
/// Byte that (doubled) ends a switch body.
pub const CASE_END: u8 = 0x5A;

/// Secondary argument baked into the decode table.
#[derive(Debug, Clone, Copy)]
pub enum OpArg {
    /// No secondary.
    None,
    /// Destination location.
    Loc(Location),
    /// Jump condition.
    Cond(Condition),
    /// Port kind.
    Port(Port),
    /// Delay unit.
    Unit(Unit),
}

/// One decode-table entry.
#[derive(Debug, Clone, Copy)]
pub struct InstructionDescriptor {
    /// Opcode kind.
    pub opcode: OpCode,
    /// Secondary argument.
    pub arg: OpArg,
}

impl InstructionDescriptor {
    /// Destination location of an operand-bearing opcode. The table pairs
    /// every such opcode with a location, so the fallback is never read.
    pub fn location(&self) -> Location {
        match self.arg {
            OpArg::Loc(l) => l,
            _ => Location::Register,
        }
    }

    /// Condition of a jump opcode.
    pub fn condition(&self) -> Condition {
        match self.arg {
            OpArg::Cond(c) => c,
            _ => Condition::Always,
        }
    }

    /// Port kind of a `SetPort` opcode.
    pub fn port(&self) -> Port {
        match self.arg {
            OpArg::Port(p) => p,
            _ => Port::Ati,
        }
    }

    /// Unit of a delay opcode.
    pub fn unit(&self) -> Unit {
        match self.arg {
            OpArg::Unit(u) => u,
            _ => Unit::MicroSecond,
        }
    }
}

const fn op(opcode: OpCode) -> InstructionDescriptor {
    InstructionDescriptor {
        opcode,
        arg: OpArg::None,
    }
}

const fn loc(opcode: OpCode, l: Location) -> InstructionDescriptor {
    InstructionDescriptor {
        opcode,
        arg: OpArg::Loc(l),
    }
}

const fn cond(opcode: OpCode, c: Condition) -> InstructionDescriptor {
    InstructionDescriptor {
        opcode,
        arg: OpArg::Cond(c),
    }
}

const fn port(opcode: OpCode, p: Port) -> InstructionDescriptor {
    InstructionDescriptor {
        opcode,
        arg: OpArg::Port(p),
    }
}

const fn unit(opcode: OpCode, u: Unit) -> InstructionDescriptor {
    InstructionDescriptor {
        opcode,
        arg: OpArg::Unit(u),
    }
}

/// The raw-byte decode table. Layout is fixed by vendor firmware; do not
/// reorder.
#[rustfmt::skip]
pub static INSTRUCTION_TABLE: [InstructionDescriptor; 127] = [
    op(OpCode::Invalid),
    loc(OpCode::Move, Location::Register),
    loc(OpCode::Move, Location::ParameterSpace),
    loc(OpCode::Move, Location::WorkSpace),
    loc(OpCode::Move, Location::FrameBuffer),
    loc(OpCode::Move, Location::PhaseLockedLoop),
    loc(OpCode::Move, Location::MemController),
    loc(OpCode::And, Location::Register),
    loc(OpCode::And, Location::ParameterSpace),
    loc(OpCode::And, Location::WorkSpace),
    loc(OpCode::And, Location::FrameBuffer),
    loc(OpCode::And, Location::PhaseLockedLoop),
    loc(OpCode::And, Location::MemController),
    loc(OpCode::Or, Location::Register),
    loc(OpCode::Or, Location::ParameterSpace),
    loc(OpCode::Or, Location::WorkSpace),
    loc(OpCode::Or, Location::FrameBuffer),
    loc(OpCode::Or, Location::PhaseLockedLoop),
    loc(OpCode::Or, Location::MemController),
    loc(OpCode::ShiftLeft, Location::Register),
    loc(OpCode::ShiftLeft, Location::ParameterSpace),
    loc(OpCode::ShiftLeft, Location::WorkSpace),
    loc(OpCode::ShiftLeft, Location::FrameBuffer),
    loc(OpCode::ShiftLeft, Location::PhaseLockedLoop),
    loc(OpCode::ShiftLeft, Location::MemController),
    loc(OpCode::ShiftRight, Location::Register),
    loc(OpCode::ShiftRight, Location::ParameterSpace),
    loc(OpCode::ShiftRight, Location::WorkSpace),
    loc(OpCode::ShiftRight, Location::FrameBuffer),
    loc(OpCode::ShiftRight, Location::PhaseLockedLoop),
    loc(OpCode::ShiftRight, Location::MemController),
    loc(OpCode::Mul, Location::Register),
    loc(OpCode::Mul, Location::ParameterSpace),
    loc(OpCode::Mul, Location::WorkSpace),
    loc(OpCode::Mul, Location::FrameBuffer),
    loc(OpCode::Mul, Location::PhaseLockedLoop),
    loc(OpCode::Mul, Location::MemController),
    loc(OpCode::Div, Location::Register),
    loc(OpCode::Div, Location::ParameterSpace),
    loc(OpCode::Div, Location::WorkSpace),
    loc(OpCode::Div, Location::FrameBuffer),
    loc(OpCode::Div, Location::PhaseLockedLoop),
    loc(OpCode::Div, Location::MemController),
    loc(OpCode::Add, Location::Register),
    loc(OpCode::Add, Location::ParameterSpace),
    loc(OpCode::Add, Location::WorkSpace),
    loc(OpCode::Add, Location::FrameBuffer),
    loc(OpCode::Add, Location::PhaseLockedLoop),
    loc(OpCode::Add, Location::MemController),
    loc(OpCode::Sub, Location::Register),
    loc(OpCode::Sub, Location::ParameterSpace),
    loc(OpCode::Sub, Location::WorkSpace),
    loc(OpCode::Sub, Location::FrameBuffer),
    loc(OpCode::Sub, Location::PhaseLockedLoop),
    loc(OpCode::Sub, Location::MemController),
    port(OpCode::SetPort, Port::Ati),
    port(OpCode::SetPort, Port::Pci),
    port(OpCode::SetPort, Port::SysIo),
    op(OpCode::SetRegBlock),
    op(OpCode::SetFbBase),
    loc(OpCode::Compare, Location::Register),
    loc(OpCode::Compare, Location::ParameterSpace),
    loc(OpCode::Compare, Location::WorkSpace),
    loc(OpCode::Compare, Location::FrameBuffer),
    loc(OpCode::Compare, Location::PhaseLockedLoop),
    loc(OpCode::Compare, Location::MemController),
    op(OpCode::Switch),
    cond(OpCode::Jump, Condition::Always),
    cond(OpCode::Jump, Condition::Equal),
    cond(OpCode::Jump, Condition::Below),
    cond(OpCode::Jump, Condition::Above),
    cond(OpCode::Jump, Condition::BelowOrEqual),
    cond(OpCode::Jump, Condition::AboveOrEqual),
    cond(OpCode::Jump, Condition::NotEqual),
    loc(OpCode::Test, Location::Register),
    loc(OpCode::Test, Location::ParameterSpace),
    loc(OpCode::Test, Location::WorkSpace),
    loc(OpCode::Test, Location::FrameBuffer),
    loc(OpCode::Test, Location::PhaseLockedLoop),
    loc(OpCode::Test, Location::MemController),
    unit(OpCode::Delay, Unit::MilliSecond),
    unit(OpCode::Delay, Unit::MicroSecond),
    op(OpCode::CallTable),
    op(OpCode::Repeat),
    loc(OpCode::Clear, Location::Register),
    loc(OpCode::Clear, Location::ParameterSpace),
    loc(OpCode::Clear, Location::WorkSpace),
    loc(OpCode::Clear, Location::FrameBuffer),
    loc(OpCode::Clear, Location::PhaseLockedLoop),
    loc(OpCode::Clear, Location::MemController),
    op(OpCode::Nop),
    op(OpCode::Eot),
    loc(OpCode::Mask, Location::Register),
    loc(OpCode::Mask, Location::ParameterSpace),
    loc(OpCode::Mask, Location::WorkSpace),
    loc(OpCode::Mask, Location::FrameBuffer),
    loc(OpCode::Mask, Location::PhaseLockedLoop),
    loc(OpCode::Mask, Location::MemController),
    op(OpCode::PostCard),
    op(OpCode::Beep),
    op(OpCode::SaveReg),
    op(OpCode::RestoreReg),
    op(OpCode::SetDataBlock),
    loc(OpCode::Xor, Location::Register),
    loc(OpCode::Xor, Location::ParameterSpace),
    loc(OpCode::Xor, Location::WorkSpace),
    loc(OpCode::Xor, Location::FrameBuffer),
    loc(OpCode::Xor, Location::PhaseLockedLoop),
    loc(OpCode::Xor, Location::MemController),
    loc(OpCode::Shl, Location::Register),
    loc(OpCode::Shl, Location::ParameterSpace),
    loc(OpCode::Shl, Location::WorkSpace),
    loc(OpCode::Shl, Location::FrameBuffer),
    loc(OpCode::Shl, Location::PhaseLockedLoop),
    loc(OpCode::Shl, Location::MemController),
    loc(OpCode::Shr, Location::Register),
    loc(OpCode::Shr, Location::ParameterSpace),
    loc(OpCode::Shr, Location::WorkSpace),
    loc(OpCode::Shr, Location::FrameBuffer),
    loc(OpCode::Shr, Location::PhaseLockedLoop),
    loc(OpCode::Shr, Location::MemController),
    op(OpCode::Debug),
    op(OpCode::ProcessDs),
    loc(OpCode::Mul32, Location::ParameterSpace),
    loc(OpCode::Mul32, Location::WorkSpace),
    loc(OpCode::Div32, Location::ParameterSpace),
    loc(OpCode::Div32, Location::WorkSpace),
];

/// Destination alignment derived from (source mode, attribute bits 6–7).
///
/// DWord sources force a DWord destination; word sources span the three
/// word lanes with the fourth slot widening to DWord; byte sources cover
/// the four byte lanes in order.
#[rustfmt::skip]
pub static SRC_TO_DST_ALIGN: [[AddressMode; 4]; 8] = [
    [AddressMode::DWord, AddressMode::DWord, AddressMode::DWord,  AddressMode::DWord],
    [AddressMode::Word0, AddressMode::Word8, AddressMode::Word16, AddressMode::DWord],
    [AddressMode::Word0, AddressMode::Word8, AddressMode::Word16, AddressMode::DWord],
    [AddressMode::Word0, AddressMode::Word8, AddressMode::Word16, AddressMode::DWord],
    [AddressMode::Byte0, AddressMode::Byte8, AddressMode::Byte16, AddressMode::Byte24],
    [AddressMode::Byte0, AddressMode::Byte8, AddressMode::Byte16, AddressMode::Byte24],
    [AddressMode::Byte0, AddressMode::Byte8, AddressMode::Byte16, AddressMode::Byte24],
    [AddressMode::Byte0, AddressMode::Byte8, AddressMode::Byte16, AddressMode::Byte24],
];

/// Default destination selector for instructions that ignore attribute bits
/// 6–7 (shift-by-immediate and clear), keyed by source mode.
pub static DEF_DST: [u8; 8] = [0, 0, 1, 2, 0, 1, 2, 3];
