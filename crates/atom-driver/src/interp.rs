// SPDX-License-Identifier: AGPL-3.0-only

//! The outer AtomBIOS virtual machine.
//!
//! One frame runs one command's bytecode. `CallTable` recurses into a
//! fresh frame that shares the caller's [`Context`] and the tail of its
//! parameter space but gets its own zeroed workspace. The program counter
//! is relative to the first opcode byte; jump targets in the bytecode are
//! encoded relative to the command entry including its 6-byte header, so
//! taken branches subtract the header size.
//!
//! Destination operands are decoded twice on purpose: once to capture the
//! current 32-bit value, and again at write-back after the merged value is
//! known. The [`Operand`] keeps the pc at which its bytes started so the
//! second decode sees exactly the same addressing.

use crate::error::{AtomError, Result};
use crate::iio;
use crate::mmio::RegisterIo;
use crate::opcodes::{
    workspace_reg, AddressMode, Condition, InstructionDescriptor, IoMode, Location, OpCode, Port,
    Unit, CASE_END, CASE_MAGIC, DEF_DST, INSTRUCTION_TABLE, SRC_TO_DST_ALIGN,
};
use crate::trace::TraceBuffer;
use atom_vbios::{Command, CommandDescriptor, CommandTableEntry, Vbios};
use std::time::Duration;

/// Upper bound on `CallTable` nesting. Real VBIOS images stay in single
/// digits; the cap guards malformed or hostile images.
pub const MAX_CALL_DEPTH: u16 = 16;

const ENTRY_HEADER: u16 = CommandTableEntry::SIZE as u16;

/// Names for the well-known indirect-I/O ports, trace only.
static IO_NAMES: [&str; 5] = ["mm", "pll", "mc", "pcie", "pcie port"];

/// Interpreter state shared across every frame of one `execute` call.
#[derive(Debug, Default)]
pub struct Context {
    /// Quotient/remainder or product low/high of the last mul/div.
    pub divmul: [u32; 2],
    /// Framebuffer window base.
    pub fb_base: u32,
    /// Offset added to `ID` operand indices.
    pub data_block: u16,
    /// Offset added to register operand indices.
    pub reg_block: u16,
    /// How register operands reach the device.
    pub io_mode: IoMode,
    /// Selected indirect-I/O program; meaningful only in IIO mode.
    pub iio_program: u8,
    /// Shift register backing the OrMask/AndMask workspace aliases.
    pub shift: u8,
    /// Equality flag of the last compare or test.
    pub comp_equal: bool,
    /// Above flag of the last compare.
    pub comp_above: bool,
    /// Attribute word consumed by indirect-I/O programs.
    pub io_attr: u16,
}

/// A decoded operand: the 32-bit value read from its location, the lane
/// selector, and the pc where its bytes started (for write-back re-decode).
#[derive(Debug, Clone, Copy)]
struct Operand {
    raw: u32,
    loc: Location,
    mode: AddressMode,
    pc: u16,
}

impl Operand {
    fn value(self) -> u32 {
        self.mode.extract(self.raw)
    }
}

/// Run `cmd` from `bios` against `device` with a fresh context.
///
/// `parameters` is the command's parameter space; the command descriptor
/// says how many bytes of it the bytecode may touch.
///
/// # Errors
///
/// Any decode or operand error unwinds the whole recursion; the device is
/// left as the bytecode left it.
pub fn execute<D: RegisterIo>(
    bios: &Vbios,
    device: &mut D,
    cmd: Command,
    parameters: &mut [u32],
    trace_enabled: bool,
) -> Result<()> {
    let mut ctx = Context::default();
    execute_recursive(&mut ctx, bios, device, cmd, parameters, 0, trace_enabled)
}

fn execute_recursive<D: RegisterIo>(
    ctx: &mut Context,
    bios: &Vbios,
    device: &mut D,
    cmd: Command,
    parameters: &mut [u32],
    depth: u16,
    trace_enabled: bool,
) -> Result<()> {
    if depth >= MAX_CALL_DEPTH {
        return Err(AtomError::CallDepthExceeded { depth });
    }

    let desc = bios.command(cmd)?;
    if parameters.len() * 4 < usize::from(desc.parameter_space_size) {
        return Err(AtomError::ParameterSpaceTooSmall {
            needed: usize::from(desc.parameter_space_size),
            have: parameters.len() * 4,
        });
    }

    let workspace = vec![0u32; usize::from(desc.work_space_size) / 4];
    let mut frame = Frame {
        ctx,
        bios,
        device,
        desc,
        parameter_space: parameters,
        workspace,
        pc: 0,
        depth,
        trace: TraceBuffer::new(trace_enabled),
    };

    frame.trace.emit(format_args!(
        "--- executing command {:02x} @ {:04x} (len={:04x}, ps={:02x}, ws={:02x})",
        cmd.0, desc.base, desc.size, desc.parameter_space_size, desc.work_space_size
    ));
    frame.flush_trace();

    loop {
        let cont = frame.step()?;
        frame.flush_trace();
        if !cont {
            break;
        }
    }

    Ok(())
}

struct Frame<'a, D: RegisterIo> {
    ctx: &'a mut Context,
    bios: &'a Vbios,
    device: &'a mut D,
    desc: CommandDescriptor,
    parameter_space: &'a mut [u32],
    workspace: Vec<u32>,
    pc: u16,
    depth: u16,
    trace: TraceBuffer,
}

impl<D: RegisterIo> Frame<'_, D> {
    fn flush_trace(&mut self) {
        self.trace.flush(self.depth);
    }

    fn read8(&mut self) -> Result<u8> {
        let offset = u32::from(self.desc.base) + u32::from(ENTRY_HEADER) + u32::from(self.pc);
        let byte = self.bios.read8(offset)?;
        self.pc = self.pc.wrapping_add(1);
        Ok(byte)
    }

    fn read16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes([self.read8()?, self.read8()?]))
    }

    fn read32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes([
            self.read8()?,
            self.read8()?,
            self.read8()?,
            self.read8()?,
        ]))
    }

    fn step(&mut self) -> Result<bool> {
        let start_pc = self.pc;
        let inst = self.read8()?;
        let desc: InstructionDescriptor = INSTRUCTION_TABLE
            .get(usize::from(inst))
            .copied()
            .unwrap_or(INSTRUCTION_TABLE[0]);

        {
            let base = self.desc.base;
            let name = desc.opcode.name();
            self.trace
                .emit(format_args!("{base:04x}+{start_pc:04x}: {name: <12}"));
        }

        match desc.opcode {
            OpCode::Invalid => {
                tracing::error!(
                    "invalid instruction {inst:#04x} at {:#06x}+{start_pc:#06x}",
                    self.desc.base
                );
                return Err(AtomError::InvalidInstruction {
                    opcode: inst,
                    base: self.desc.base,
                    pc: start_pc,
                });
            }
            OpCode::Move => {
                let attr = self.read8()?;
                // Reading some hardware registers perturbs the next read,
                // so a full-dword move must not pre-read its destination.
                let dst = if AddressMode::from_bits((attr >> 3) & 0x7) == AddressMode::DWord {
                    self.read_dst_skip(desc.location(), attr)?
                } else {
                    self.read_dst(desc.location(), attr)?
                };
                let src = self.read_src(attr)?;
                self.write_dst(dst, src.value())?;
            }
            OpCode::And => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                self.write_dst(dst, dst.value() & src.value())?;
            }
            OpCode::Or => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                self.write_dst(dst, dst.value() | src.value())?;
            }
            OpCode::Xor => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                self.write_dst(dst, dst.value() ^ src.value())?;
            }
            OpCode::Add => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                self.write_dst(dst, dst.value().wrapping_add(src.value()))?;
            }
            OpCode::Sub => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                self.write_dst(dst, dst.value().wrapping_sub(src.value()))?;
            }
            OpCode::ShiftLeft | OpCode::ShiftRight => {
                let mut attr = self.read8()?;
                attr &= 0x38;
                attr |= DEF_DST[usize::from(attr >> 3)] << 6;
                let dst = self.read_dst(desc.location(), attr)?;
                let shift = self.read_immediate(AddressMode::Byte0)?;
                self.trace.emit(format_args!(" shift:{shift:02x}"));
                let value = if desc.opcode == OpCode::ShiftLeft {
                    dst.value().checked_shl(shift).unwrap_or(0)
                } else {
                    dst.value().checked_shr(shift).unwrap_or(0)
                };
                self.write_dst(dst, value)?;
            }
            OpCode::Shl | OpCode::Shr => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                // Shifting the whole captured dword, then re-extracting the
                // lane, matches firmware expectations for sub-field shifts.
                let raw = if src.value() < 32 {
                    if desc.opcode == OpCode::Shl {
                        dst.raw << src.value()
                    } else {
                        dst.raw >> src.value()
                    }
                } else {
                    0
                };
                let result = Operand { raw, ..dst };
                self.write_dst(dst, result.value())?;
            }
            OpCode::Mul => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                self.ctx.divmul[0] = dst.value().wrapping_mul(src.value());
                let q = self.ctx.divmul[0];
                self.trace.emit(format_args!(" => {q:08x}"));
            }
            OpCode::Div => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                if src.value() == 0 {
                    self.ctx.divmul = [0, 0];
                } else {
                    self.ctx.divmul = [dst.value() / src.value(), dst.value() % src.value()];
                }
                let [q, r] = self.ctx.divmul;
                self.trace.emit(format_args!(" => {q:08x} {r:08x}"));
            }
            OpCode::Mul32 => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                let product = u64::from(dst.value()) * u64::from(src.value());
                #[allow(clippy::cast_possible_truncation)]
                {
                    self.ctx.divmul = [product as u32, (product >> 32) as u32];
                }
                let [lo, hi] = self.ctx.divmul;
                self.trace.emit(format_args!(" => {hi:08x} {lo:08x}"));
            }
            OpCode::Div32 => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                if src.value() == 0 {
                    self.ctx.divmul = [0, 0];
                } else {
                    let num = u64::from(dst.value()) | (u64::from(self.ctx.divmul[1]) << 32);
                    let quot = num / u64::from(src.value());
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        self.ctx.divmul = [quot as u32, (quot >> 32) as u32];
                    }
                }
                let [lo, hi] = self.ctx.divmul;
                self.trace.emit(format_args!(" => {hi:08x} {lo:08x}"));
            }
            OpCode::Compare => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                self.ctx.comp_above = dst.value() > src.value();
                self.ctx.comp_equal = dst.value() == src.value();
                let above = if self.ctx.comp_above { "above" } else { "below" };
                let equal = if self.ctx.comp_equal {
                    "equal"
                } else {
                    "notequal"
                };
                self.trace.emit(format_args!(" => {above} {equal}"));
            }
            OpCode::Test => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let src = self.read_src(attr)?;
                self.ctx.comp_equal = (dst.value() & src.value()) == 0;
                let equal = if self.ctx.comp_equal {
                    "equal"
                } else {
                    "notequal"
                };
                self.trace.emit(format_args!(" => {equal}"));
            }
            OpCode::Jump => {
                let cond = desc.condition();
                let target = self.read16()?;
                self.trace
                    .emit(format_args!(" {} {target:04x}", cond.name()));
                let take = match cond {
                    Condition::Always => true,
                    Condition::Equal => self.ctx.comp_equal,
                    Condition::NotEqual => !self.ctx.comp_equal,
                    Condition::Above => self.ctx.comp_above,
                    Condition::AboveOrEqual => self.ctx.comp_above || self.ctx.comp_equal,
                    Condition::Below => !(self.ctx.comp_above || self.ctx.comp_equal),
                    Condition::BelowOrEqual => !self.ctx.comp_above,
                };
                self.trace
                    .emit(format_args!(" => {}", if take { "taken" } else { "not taken" }));
                if take {
                    // Targets count from the entry start, pc from the first
                    // opcode byte.
                    self.pc = target.wrapping_sub(ENTRY_HEADER);
                }
            }
            OpCode::Switch => {
                let attr = self.read8()?;
                let src = self.read_src(attr)?;
                self.flush_trace();
                loop {
                    let case_type = self.read8()?;
                    match case_type {
                        CASE_MAGIC => {
                            let case_value = self.read_immediate(src.mode)?;
                            let target = self.read16()?;
                            self.trace
                                .emit(format_args!("  case:{case_value:08x} target:{target:04x}"));
                            if case_value == src.value() {
                                self.trace.emit(format_args!(" => taken"));
                                self.flush_trace();
                                self.pc = target.wrapping_sub(ENTRY_HEADER);
                                break;
                            }
                            self.flush_trace();
                        }
                        CASE_END => {
                            // The sentinel is doubled to close the switch.
                            let second = self.read8()?;
                            if second != CASE_END {
                                tracing::error!("invalid switch case end {second:#04x}");
                                return Err(AtomError::InvalidCase { byte: second });
                            }
                            break;
                        }
                        other => {
                            tracing::error!("invalid switch case byte {other:#04x}");
                            return Err(AtomError::InvalidCase { byte: other });
                        }
                    }
                }
            }
            OpCode::SetPort => match desc.port() {
                Port::Ati => {
                    let port = self.read16()?;
                    if port == 0 {
                        self.ctx.io_mode = IoMode::MemoryMapped;
                        self.trace.emit(format_args!(" mm"));
                    } else {
                        self.ctx.io_mode = IoMode::Iio;
                        #[allow(clippy::cast_possible_truncation)]
                        {
                            self.ctx.iio_program = port as u8;
                        }
                        if let Some(name) = IO_NAMES.get(usize::from(port)) {
                            self.trace.emit(format_args!(" iio:{name}"));
                        } else {
                            self.trace.emit(format_args!(" iio:{port:02x}"));
                        }
                    }
                }
                Port::Pci => {
                    let _ = self.read8()?;
                    self.ctx.io_mode = IoMode::Pci;
                    self.trace.emit(format_args!(" pci"));
                }
                Port::SysIo => {
                    let _ = self.read8()?;
                    self.ctx.io_mode = IoMode::SysIo;
                    self.trace.emit(format_args!(" sysio"));
                }
            },
            OpCode::SetRegBlock => {
                self.ctx.reg_block = self.read16()?;
                let block = self.ctx.reg_block;
                self.trace.emit(format_args!(" block:{block:04x}"));
            }
            OpCode::SetFbBase => {
                let attr = self.read8()?;
                self.ctx.fb_base = self.read_src(attr)?.value();
            }
            OpCode::SetDataBlock => {
                let index = self.read8()?;
                self.trace.emit(format_args!(" block:{index:02x}"));
                self.ctx.data_block = match index {
                    0 => 0,
                    0xFF => self.desc.base,
                    _ => self.bios.datatable(u16::from(index))?,
                };
                let block = self.ctx.data_block;
                self.trace.emit(format_args!(" base:{block:04x}"));
            }
            OpCode::Delay => {
                let count = self.read8()?;
                match desc.unit() {
                    Unit::MicroSecond => {
                        self.trace.emit(format_args!(" {count}us"));
                        std::thread::sleep(Duration::from_micros(u64::from(count)));
                    }
                    Unit::MilliSecond => {
                        self.trace.emit(format_args!(" {count}ms"));
                        std::thread::sleep(Duration::from_millis(u64::from(count)));
                    }
                }
            }
            OpCode::CallTable => {
                let index = self.read8()?;
                self.trace.emit(format_args!(" {index:02x}"));
                self.flush_trace();
                let ps_words = usize::from(self.desc.parameter_space_size) / 4;
                let have = self.parameter_space.len() * 4;
                let ps = self
                    .parameter_space
                    .get_mut(ps_words..)
                    .ok_or(AtomError::ParameterSpaceTooSmall {
                        needed: ps_words * 4,
                        have,
                    })?;
                execute_recursive(
                    self.ctx,
                    self.bios,
                    self.device,
                    Command(index),
                    ps,
                    self.depth + 1,
                    self.trace.enabled(),
                )?;
            }
            OpCode::Clear => {
                let mut attr = self.read8()?;
                attr &= 0x38;
                attr |= DEF_DST[usize::from(attr >> 3)] << 6;
                let dst = self.read_dst(desc.location(), attr)?;
                self.write_dst(dst, 0)?;
            }
            OpCode::Mask => {
                let attr = self.read8()?;
                let dst = self.read_dst(desc.location(), attr)?;
                let mask = self.read_immediate(AddressMode::from_bits((attr >> 3) & 0x7))?;
                self.trace.emit(format_args!(" mask:{mask:08x}"));
                let src = self.read_src(attr)?;
                self.write_dst(dst, (dst.value() & mask) | src.value())?;
            }
            OpCode::PostCard => {
                let code = self.read8()?;
                self.trace.emit(format_args!(" => {code:02x}"));
            }
            OpCode::Beep => {
                tracing::debug!("beep!");
            }
            OpCode::Debug => {
                let code = self.read8()?;
                self.trace.emit(format_args!(" => {code:02x}"));
            }
            OpCode::ProcessDs => {
                let size = self.read16()?;
                self.trace.emit(format_args!(" => {size:04x}"));
            }
            OpCode::Nop => {}
            OpCode::Eot => return Ok(false),
            // Vendor drivers never emit these for this card family; an
            // image that uses them is telling us something is wrong.
            OpCode::Repeat | OpCode::SaveReg | OpCode::RestoreReg => {
                tracing::error!("unimplemented opcode: {}", desc.opcode.name());
                return Err(AtomError::UnimplementedOpcode {
                    name: desc.opcode.name(),
                });
            }
        }

        Ok(true)
    }

    /// Decode and read a destination operand. The destination's lane is not
    /// the raw attribute mode but the aligned mode derived from it.
    fn read_dst(&mut self, loc: Location, attr: u8) -> Result<Operand> {
        let aligned = SRC_TO_DST_ALIGN[usize::from((attr >> 3) & 0x7)][usize::from((attr >> 6) & 0x3)];
        let dst_attr = (loc as u8) | (aligned.bits() << 3);
        self.read_src(dst_attr)
    }

    /// Decode a destination operand without touching the location. Used by
    /// full-dword moves, where the old value is irrelevant and reading it
    /// could side-effect the device.
    fn read_dst_skip(&mut self, loc: Location, attr: u8) -> Result<Operand> {
        let aligned = SRC_TO_DST_ALIGN[usize::from((attr >> 3) & 0x7)][usize::from((attr >> 6) & 0x3)];
        let pc = self.pc;

        match loc {
            Location::Register => {
                let index = u32::from(self.read16()?) + u32::from(self.ctx.reg_block);
                self.trace.emit(format_args!(" reg[{index:04x}]"));
            }
            Location::ParameterSpace => {
                let index = self.read8()?;
                self.trace.emit(format_args!(" ps[{index:02x}]"));
            }
            Location::WorkSpace => {
                let index = self.read8()?;
                self.trace.emit(format_args!(" ws[{index:02x}]"));
            }
            Location::Id => {
                let index = self.read16()?;
                self.trace.emit(format_args!(" id[{index:04x}]"));
            }
            Location::Immediate => {
                return Err(AtomError::InvalidDestination { what: "immediate" });
            }
            Location::FrameBuffer => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented {
                    what: "frame buffer access",
                });
            }
            Location::PhaseLockedLoop => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented { what: "PLL access" });
            }
            Location::MemController => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented {
                    what: "memory controller access",
                });
            }
        }
        self.trace.emit(format_args!("[        ]"));

        Ok(Operand {
            raw: 0xCDCD_CDCD,
            loc,
            mode: aligned,
            pc,
        })
    }

    /// Decode and read a source operand from the attribute byte.
    fn read_src(&mut self, attr: u8) -> Result<Operand> {
        let pc = self.pc;
        let loc = Location::from_bits(attr & 0x7);
        let mode = AddressMode::from_bits((attr >> 3) & 0x7);

        let raw = match loc {
            Location::Register => {
                let index = u32::from(self.read16()?) + u32::from(self.ctx.reg_block);
                self.trace.emit(format_args!(" reg[{index:04x}]"));
                match self.ctx.io_mode {
                    IoMode::MemoryMapped => self.device.read_register(index),
                    IoMode::Iio => iio::execute_iio(
                        self.bios,
                        self.device,
                        self.ctx.io_attr,
                        self.ctx.iio_program & 0x7F,
                        index,
                        0,
                    )?,
                    IoMode::Pci => {
                        return Err(AtomError::NotImplemented {
                            what: "PCI port register read",
                        })
                    }
                    IoMode::SysIo => {
                        return Err(AtomError::NotImplemented {
                            what: "SysIO port register read",
                        })
                    }
                }
            }
            Location::ParameterSpace => {
                let index = self.read8()?;
                self.trace.emit(format_args!(" ps[{index:02x}]"));
                *self.parameter_space.get(usize::from(index)).ok_or(
                    AtomError::OperandOutOfRange {
                        what: "parameter space",
                        index: u32::from(index),
                    },
                )?
            }
            Location::WorkSpace => {
                let index = self.read8()?;
                self.read_workspace(index)?
            }
            Location::Id => {
                let index = self.read16()?;
                self.trace.emit(format_args!(" id[{index:04x}]"));
                self.bios
                    .read32(u32::from(index) + u32::from(self.ctx.data_block))?
            }
            Location::Immediate => {
                let value = self.read_immediate(mode)?;
                self.trace.emit(format_args!(" imm:"));
                value
            }
            Location::FrameBuffer => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented {
                    what: "frame buffer access",
                });
            }
            Location::PhaseLockedLoop => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented { what: "PLL access" });
            }
            Location::MemController => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented {
                    what: "memory controller access",
                });
            }
        };

        let op = Operand { raw, loc, mode, pc };
        self.trace.lane(mode, op.value());
        Ok(op)
    }

    fn read_immediate(&mut self, mode: AddressMode) -> Result<u32> {
        match mode {
            AddressMode::DWord => self.read32(),
            AddressMode::Word0 | AddressMode::Word8 | AddressMode::Word16 => {
                Ok(u32::from(self.read16()?))
            }
            AddressMode::Byte0 | AddressMode::Byte8 | AddressMode::Byte16
            | AddressMode::Byte24 => Ok(u32::from(self.read8()?)),
        }
    }

    fn read_workspace(&mut self, index: u8) -> Result<u32> {
        Ok(match index {
            workspace_reg::QUOTIENT => {
                self.trace.emit(format_args!(" ws[quotient]"));
                self.ctx.divmul[0]
            }
            workspace_reg::REMAINDER => {
                self.trace.emit(format_args!(" ws[remainder]"));
                self.ctx.divmul[1]
            }
            workspace_reg::DATA_PTR => {
                self.trace.emit(format_args!(" ws[dataptr]"));
                u32::from(self.ctx.data_block)
            }
            workspace_reg::SHIFT => {
                self.trace.emit(format_args!(" ws[shift]"));
                u32::from(self.ctx.shift)
            }
            workspace_reg::OR_MASK => {
                self.trace.emit(format_args!(" ws[ormask]"));
                1u32.checked_shl(u32::from(self.ctx.shift)).unwrap_or(0)
            }
            workspace_reg::AND_MASK => {
                self.trace.emit(format_args!(" ws[andmask]"));
                !1u32.checked_shl(u32::from(self.ctx.shift)).unwrap_or(0)
            }
            workspace_reg::FB_WINDOW => {
                self.trace.emit(format_args!(" ws[fbwindow]"));
                self.ctx.fb_base
            }
            workspace_reg::ATTRIBUTES => {
                self.trace.emit(format_args!(" ws[attributes]"));
                u32::from(self.ctx.io_attr)
            }
            workspace_reg::REG_PTR => {
                self.trace.emit(format_args!(" ws[regptr]"));
                u32::from(self.ctx.reg_block)
            }
            _ => {
                self.trace.emit(format_args!(" ws[{index:02x}]"));
                *self
                    .workspace
                    .get(usize::from(index))
                    .ok_or(AtomError::OperandOutOfRange {
                        what: "workspace",
                        index: u32::from(index),
                    })?
            }
        })
    }

    fn write_workspace(&mut self, index: u8, value: u32) -> Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        match index {
            workspace_reg::QUOTIENT => self.ctx.divmul[0] = value,
            workspace_reg::REMAINDER => self.ctx.divmul[1] = value,
            workspace_reg::DATA_PTR => self.ctx.data_block = value as u16,
            workspace_reg::SHIFT => self.ctx.shift = value as u8,
            // Derived from the shift register; stores are dropped.
            workspace_reg::OR_MASK | workspace_reg::AND_MASK => {}
            workspace_reg::FB_WINDOW => self.ctx.fb_base = value,
            workspace_reg::ATTRIBUTES => self.ctx.io_attr = value as u16,
            workspace_reg::REG_PTR => self.ctx.reg_block = value as u16,
            _ => {
                *self
                    .workspace
                    .get_mut(usize::from(index))
                    .ok_or(AtomError::OperandOutOfRange {
                        what: "workspace",
                        index: u32::from(index),
                    })? = value;
            }
        }
        Ok(())
    }

    /// Merge `value` into the operand's lane and store it back, re-decoding
    /// the destination bytes at the operand's captured pc.
    fn write_dst(&mut self, op: Operand, value: u32) -> Result<()> {
        let saved_pc = self.pc;
        self.pc = op.pc;
        let result = self.write_dst_at_pc(op, value);
        self.pc = saved_pc;
        result
    }

    fn write_dst_at_pc(&mut self, op: Operand, value: u32) -> Result<()> {
        self.trace.emit(format_args!(" => "));
        self.trace.lane(op.mode, value);
        let merged = op.mode.merge(op.raw, value);
        self.flush_trace();

        match op.loc {
            Location::Register => {
                let index = u32::from(self.read16()?) + u32::from(self.ctx.reg_block);
                match self.ctx.io_mode {
                    IoMode::MemoryMapped => self.device.write_register(index, merged),
                    IoMode::Iio => {
                        iio::execute_iio(
                            self.bios,
                            self.device,
                            self.ctx.io_attr,
                            self.ctx.iio_program | 0x80,
                            index,
                            merged,
                        )?;
                    }
                    IoMode::Pci => {
                        return Err(AtomError::NotImplemented {
                            what: "PCI port register write",
                        })
                    }
                    IoMode::SysIo => {
                        return Err(AtomError::NotImplemented {
                            what: "SysIO port register write",
                        })
                    }
                }
            }
            Location::ParameterSpace => {
                let index = self.read8()?;
                *self.parameter_space.get_mut(usize::from(index)).ok_or(
                    AtomError::OperandOutOfRange {
                        what: "parameter space",
                        index: u32::from(index),
                    },
                )? = merged;
            }
            Location::WorkSpace => {
                let index = self.read8()?;
                self.write_workspace(index, merged)?;
            }
            Location::FrameBuffer => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented {
                    what: "frame buffer access",
                });
            }
            Location::PhaseLockedLoop => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented { what: "PLL access" });
            }
            Location::MemController => {
                let _ = self.read8()?;
                return Err(AtomError::NotImplemented {
                    what: "memory controller access",
                });
            }
            Location::Id => {
                return Err(AtomError::InvalidDestination { what: "data table" });
            }
            Location::Immediate => {
                return Err(AtomError::InvalidDestination { what: "immediate" });
            }
        }
        Ok(())
    }
}
