use crate::cpu::{CPU, R16, R8, SR};
use crate::memory::MMU;

#[cfg(test)]
#[path = "./decoder_test.rs"]
mod decoder_test;

/// repeat prefix state
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RepeatMode {
    None,
    /// 0xF3, rep / repe / repz
    Rep,
    /// 0xF2, repne / repnz
    Repne,
}

impl Default for RepeatMode {
    fn default() -> Self {
        RepeatMode::None
    }
}

/// prefix state for the instruction being decoded. the dispatcher creates a
/// fresh context before every fetch; nothing survives across instructions.
#[derive(Clone, Debug, Default)]
pub struct DecodeContext {
    /// pending segment override, consumed by the first memory reference
    pub segment: Option<SR>,
    pub repeat: RepeatMode,
    pub lock: bool,
}

impl DecodeContext {
    /// the segment value for a memory reference: the pending override if one
    /// is set (taking it), else the addressing form's default segment
    pub fn segment_value(&mut self, cpu: &CPU, default: SR) -> u16 {
        match self.segment.take() {
            Some(sr) => cpu.get_sr(sr),
            None => cpu.get_sr(default),
        }
    }
}

/// the three fields of a ModR/M byte
#[derive(Copy, Clone, Debug)]
pub struct ModRegRm {
    pub md: u8, // "mod" is a reserved keyword
    pub reg: u8,
    pub rm: u8,
}

impl ModRegRm {
    pub fn from_u8(b: u8) -> Self {
        ModRegRm {
            md: b >> 6,
            reg: (b >> 3) & 7,
            rm: b & 7,
        }
    }
}

/// a resolved r/m operand: either a plain register index or a memory
/// location with its segment already applied. decoded once, then threaded
/// explicitly into reads and writes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RmOperand {
    Register(u8),
    Memory(u16, u16), // segment value, offset
}

impl CPU {
    /// base offset of the eight register-pair addressing forms
    fn amode_base(&self, rm: u8) -> u16 {
        match rm {
            0 => self.get_r16(R16::BX).wrapping_add(self.get_r16(R16::SI)),
            1 => self.get_r16(R16::BX).wrapping_add(self.get_r16(R16::DI)),
            2 => self.get_r16(R16::BP).wrapping_add(self.get_r16(R16::SI)),
            3 => self.get_r16(R16::BP).wrapping_add(self.get_r16(R16::DI)),
            4 => self.get_r16(R16::SI),
            5 => self.get_r16(R16::DI),
            6 => self.get_r16(R16::BP),
            7 => self.get_r16(R16::BX),
            _ => unreachable!(),
        }
    }

    /// the BP-based forms default to SS, everything else to DS
    fn amode_default_segment(rm: u8) -> SR {
        match rm {
            2 | 3 | 6 => SR::SS,
            _ => SR::DS,
        }
    }

    /// resolves a ModR/M byte into an operand, consuming exactly the
    /// displacement bytes the addressing form dictates (0, 1 or 2).
    /// `mod == 3` short-circuits to the register selected by the rm field.
    pub(crate) fn decode_rm(&mut self, mmu: &MMU, ctx: &mut DecodeContext, modrm: u8) -> RmOperand {
        let x = ModRegRm::from_u8(modrm);
        let (default_seg, offset) = match x.md {
            0 if x.rm == 6 => {
                // direct 16-bit displacement
                (SR::DS, self.read_u16(mmu))
            }
            0 => (Self::amode_default_segment(x.rm), self.amode_base(x.rm)),
            1 => {
                let disp = self.read_s8(mmu);
                (Self::amode_default_segment(x.rm), self.amode_base(x.rm).wrapping_add(disp as u16))
            }
            2 => {
                let disp = self.read_s16(mmu);
                (Self::amode_default_segment(x.rm), self.amode_base(x.rm).wrapping_add(disp as u16))
            }
            _ => return RmOperand::Register(x.rm),
        };
        let seg = ctx.segment_value(self, default_seg);
        RmOperand::Memory(seg, offset)
    }

    pub(crate) fn read_rm8(&self, mmu: &MMU, rm: RmOperand) -> u8 {
        match rm {
            RmOperand::Register(r) => self.get_r8(R8::from(r)),
            RmOperand::Memory(seg, offset) => mmu.read_u8(seg, offset),
        }
    }

    pub(crate) fn write_rm8(&mut self, mmu: &mut MMU, rm: RmOperand, data: u8) {
        match rm {
            RmOperand::Register(r) => self.set_r8(R8::from(r), data),
            RmOperand::Memory(seg, offset) => mmu.write_u8(seg, offset, data),
        }
    }

    pub(crate) fn read_rm16(&self, mmu: &MMU, rm: RmOperand) -> u16 {
        match rm {
            RmOperand::Register(r) => self.get_r16(R16::from(r)),
            RmOperand::Memory(seg, offset) => mmu.read_u16(seg, offset),
        }
    }

    pub(crate) fn write_rm16(&mut self, mmu: &mut MMU, rm: RmOperand, data: u16) {
        match rm {
            RmOperand::Register(r) => self.set_r16(R16::from(r), data),
            RmOperand::Memory(seg, offset) => mmu.write_u16(seg, offset, data),
        }
    }

    // "reg" field accessors (bits 5:3 of the ModR/M byte)

    pub(crate) fn read_reg8(&self, modrm: u8) -> u8 {
        self.get_r8(R8::from((modrm >> 3) & 7))
    }

    pub(crate) fn write_reg8(&mut self, modrm: u8, data: u8) {
        self.set_r8(R8::from((modrm >> 3) & 7), data);
    }

    pub(crate) fn read_reg16(&self, modrm: u8) -> u16 {
        self.get_r16(R16::from((modrm >> 3) & 7))
    }

    pub(crate) fn write_reg16(&mut self, modrm: u8, data: u16) {
        self.set_r16(R16::from((modrm >> 3) & 7), data);
    }
}
