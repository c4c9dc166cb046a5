use crate::cpu::{
    lookup_op, AluForm, AluOp, CpuModel, DecodeContext, Dir, Fault, Op, RepeatMode, RmOperand,
    ShiftCount, ShiftOp, Step, Width, CPU, R16, R8, SR,
};
use crate::hardware::Hardware;
use crate::memory::{MemoryAddress, MMU};

#[cfg(test)]
#[path = "./interpreter_test.rs"]
mod interpreter_test;

const DEBUG_EXEC: bool = false;

/// the string instruction family
#[derive(Copy, Clone, Debug, PartialEq)]
enum StringKind {
    Movs,
    Cmps,
    Stos,
    Lods,
    Scas,
    Ins,
    Outs,
}

impl StringKind {
    /// CMPS/SCAS terminate a repeat loop early on the zero flag
    fn is_compare(self) -> bool {
        self == StringKind::Cmps || self == StringKind::Scas
    }
}

impl CPU {
    /// fetches, decodes and executes exactly one instruction. prefixes are
    /// accumulated into a fresh decode context and never retire on their own.
    /// a fault restores IP to the instruction start before reporting.
    pub fn execute_instruction(&mut self, hw: &mut Hardware) -> Result<Step, Fault> {
        let start_ip = self.regs.ip;
        let res = self.dispatch(hw);
        if res.is_err() {
            self.regs.ip = start_ip;
        }
        res
    }

    fn dispatch(&mut self, hw: &mut Hardware) -> Result<Step, Fault> {
        let mut ctx = DecodeContext::default();
        let (opcode, at) = loop {
            let at = self.get_memory_address();
            let b = self.read_u8(&hw.mmu);
            match b {
                0x26 => ctx.segment = Some(SR::ES),
                0x2E => ctx.segment = Some(SR::CS),
                0x36 => ctx.segment = Some(SR::SS),
                0x3E => ctx.segment = Some(SR::DS),
                0xF0 | 0xF1 => ctx.lock = true,
                0xF2 => ctx.repeat = RepeatMode::Repne,
                0xF3 => ctx.repeat = RepeatMode::Rep,
                _ => break (b, at),
            }
        };
        self.instruction_count += 1;
        let op = lookup_op(opcode, self.model);
        if DEBUG_EXEC {
            println!("[{}] {:02X} {:?}", at, opcode, op);
        }

        match op {
            Op::Alu(aluop, width, form) => match form {
                AluForm::RmReg => {
                    let modrm = self.read_u8(&hw.mmu);
                    let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                    let left = self.read_rm(&hw.mmu, width, rm);
                    let right = self.read_reg(width, modrm);
                    let res = self.alu(width, aluop, left, right);
                    if aluop.writes_result() {
                        self.write_rm(&mut hw.mmu, width, rm, res);
                    }
                }
                AluForm::RegRm => {
                    let modrm = self.read_u8(&hw.mmu);
                    let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                    let left = self.read_reg(width, modrm);
                    let right = self.read_rm(&hw.mmu, width, rm);
                    let res = self.alu(width, aluop, left, right);
                    if aluop.writes_result() {
                        self.write_reg(width, modrm, res);
                    }
                }
                AluForm::AccImm => {
                    let left = self.read_acc(width);
                    let right = self.read_imm(&hw.mmu, width);
                    let res = self.alu(width, aluop, left, right);
                    if aluop.writes_result() {
                        self.write_acc(width, res);
                    }
                }
            },
            Op::AluImmGroup(width, sign_extend) => {
                let modrm = self.read_u8(&hw.mmu);
                let aluop = AluOp::from_index(modrm >> 3);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let left = self.read_rm(&hw.mmu, width, rm);
                let right = if sign_extend {
                    self.read_s8(&hw.mmu) as u16
                } else {
                    self.read_imm(&hw.mmu, width)
                };
                let res = self.alu(width, aluop, left, right);
                if aluop.writes_result() {
                    self.write_rm(&mut hw.mmu, width, rm, res);
                }
            }
            Op::PushSR(sr) => {
                let val = self.get_sr(sr);
                self.push16(&mut hw.mmu, val);
            }
            Op::PopSR(sr) => {
                let val = self.pop16(&hw.mmu);
                self.set_sr(sr, val);
            }
            Op::Daa => self.daa(),
            Op::Das => self.das(),
            Op::Aaa => self.aaa(),
            Op::Aas => self.aas(),
            Op::IncReg(r) => {
                let val = self.get_r16(r);
                let res = self.inc(Width::W16, val);
                self.set_r16(r, res);
            }
            Op::DecReg(r) => {
                let val = self.get_r16(r);
                let res = self.dec(Width::W16, val);
                self.set_r16(r, res);
            }
            Op::PushReg(r) => {
                let mut val = self.get_r16(r);
                if r == R16::SP && self.model == CpuModel::Intel8086 {
                    // the 8086 pushes the already-decremented value
                    val = val.wrapping_sub(2);
                }
                self.push16(&mut hw.mmu, val);
            }
            Op::PopReg(r) => {
                let val = self.pop16(&hw.mmu);
                self.set_r16(r, val);
            }
            Op::Pusha => {
                let sp = self.get_r16(R16::SP);
                for r in &[R16::AX, R16::CX, R16::DX, R16::BX] {
                    let val = self.get_r16(*r);
                    self.push16(&mut hw.mmu, val);
                }
                self.push16(&mut hw.mmu, sp);
                for r in &[R16::BP, R16::SI, R16::DI] {
                    let val = self.get_r16(*r);
                    self.push16(&mut hw.mmu, val);
                }
            }
            Op::Popa => {
                for r in &[R16::DI, R16::SI, R16::BP] {
                    let val = self.pop16(&hw.mmu);
                    self.set_r16(*r, val);
                }
                self.pop16(&hw.mmu); // the pushed SP is discarded
                for r in &[R16::BX, R16::DX, R16::CX, R16::AX] {
                    let val = self.pop16(&hw.mmu);
                    self.set_r16(*r, val);
                }
            }
            Op::Bound => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                match rm {
                    RmOperand::Memory(seg, offset) => {
                        let idx = self.read_reg16(modrm) as i16;
                        let lower = hw.mmu.read_u16(seg, offset) as i16;
                        let upper = hw.mmu.read_u16(seg, offset.wrapping_add(2)) as i16;
                        if idx < lower || idx > upper {
                            self.execute_interrupt(&mut hw.mmu, 5);
                        }
                    }
                    RmOperand::Register(_) => return Err(invalid_encoding(modrm, at)),
                }
            }
            Op::PushImm16 => {
                let val = self.read_u16(&hw.mmu);
                self.push16(&mut hw.mmu, val);
            }
            Op::PushImm8 => {
                let val = self.read_s8(&hw.mmu) as u16;
                self.push16(&mut hw.mmu, val);
            }
            Op::ImulImm16 => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let a = self.read_rm16(&hw.mmu, rm) as i16;
                let b = self.read_s16(&hw.mmu);
                self.imul_truncating(modrm, a, b);
            }
            Op::ImulImm8 => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let a = self.read_rm16(&hw.mmu, rm) as i16;
                let b = i16::from(self.read_s8(&hw.mmu));
                self.imul_truncating(modrm, a, b);
            }
            Op::Ins(width) => self.string_instruction(hw, &mut ctx, StringKind::Ins, width),
            Op::Outs(width) => self.string_instruction(hw, &mut ctx, StringKind::Outs, width),
            Op::Jcc(cond) => {
                let target = self.read_rel8(&hw.mmu);
                if cond.eval(&self.regs.flags) {
                    self.regs.ip = target;
                }
            }
            Op::TestRmReg(width) => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let left = self.read_rm(&hw.mmu, width, rm);
                let right = self.read_reg(width, modrm);
                self.alu(width, AluOp::And, left, right);
            }
            Op::XchgRmReg(width) => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let a = self.read_rm(&hw.mmu, width, rm);
                let b = self.read_reg(width, modrm);
                self.write_rm(&mut hw.mmu, width, rm, b);
                self.write_reg(width, modrm, a);
            }
            Op::Mov(width, dir) => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                match dir {
                    Dir::RmReg => {
                        let val = self.read_reg(width, modrm);
                        self.write_rm(&mut hw.mmu, width, rm, val);
                    }
                    Dir::RegRm => {
                        let val = self.read_rm(&hw.mmu, width, rm);
                        self.write_reg(width, modrm, val);
                    }
                }
            }
            Op::MovSreg(dir) => {
                let modrm = self.read_u8(&hw.mmu);
                let sr = match SR::from_modrm_field((modrm >> 3) & 7) {
                    Some(sr) => sr,
                    None => return Err(invalid_encoding(modrm, at)),
                };
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                match dir {
                    Dir::RmReg => {
                        let val = self.get_sr(sr);
                        self.write_rm16(&mut hw.mmu, rm, val);
                    }
                    Dir::RegRm => {
                        let val = self.read_rm16(&hw.mmu, rm);
                        self.set_sr(sr, val);
                    }
                }
            }
            Op::Lea => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                match rm {
                    // only the offset is taken; the segment is discarded
                    RmOperand::Memory(_, offset) => self.write_reg16(modrm, offset),
                    RmOperand::Register(_) => return Err(invalid_encoding(modrm, at)),
                }
            }
            Op::PopRm => {
                let modrm = self.read_u8(&hw.mmu);
                if (modrm >> 3) & 7 != 0 {
                    return Err(invalid_encoding(modrm, at));
                }
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let val = self.pop16(&hw.mmu);
                self.write_rm16(&mut hw.mmu, rm, val);
            }
            Op::Nop => {}
            Op::XchgAxReg(r) => {
                let ax = self.get_r16(R16::AX);
                let val = self.get_r16(r);
                self.set_r16(R16::AX, val);
                self.set_r16(r, ax);
            }
            Op::Cbw => {
                let ah = if self.get_r8(R8::AL) & 0x80 != 0 { 0xFF } else { 0x00 };
                self.set_r8(R8::AH, ah);
            }
            Op::Cwd => {
                let dx = if self.get_r16(R16::AX) & 0x8000 != 0 { 0xFFFF } else { 0x0000 };
                self.set_r16(R16::DX, dx);
            }
            Op::CallFar => {
                let offset = self.read_u16(&hw.mmu);
                let segment = self.read_u16(&hw.mmu);
                let cs = self.get_sr(SR::CS);
                let ip = self.regs.ip;
                self.push16(&mut hw.mmu, cs);
                self.push16(&mut hw.mmu, ip);
                self.set_sr(SR::CS, segment);
                self.regs.ip = offset;
            }
            Op::Wait => {
                // FPU synchronization; nothing to wait for without one
            }
            Op::Pushf => {
                let flags = self.regs.flags.u16();
                self.push16(&mut hw.mmu, flags);
            }
            Op::Popf => {
                let flags = self.pop16(&hw.mmu);
                self.regs.flags.set_u16(flags);
            }
            Op::Sahf => {
                let ah = self.get_r8(R8::AH);
                self.regs.flags.carry = ah & 0x01 != 0;
                self.regs.flags.parity = ah & 0x04 != 0;
                self.regs.flags.adjust = ah & 0x10 != 0;
                self.regs.flags.zero = ah & 0x40 != 0;
                self.regs.flags.sign = ah & 0x80 != 0;
            }
            Op::Lahf => {
                let ah = self.regs.flags.u16() as u8;
                self.set_r8(R8::AH, ah);
            }
            Op::MovAccMoffs(width, dir) => {
                let offset = self.read_u16(&hw.mmu);
                let seg = ctx.segment_value(self, SR::DS);
                match dir {
                    Dir::RegRm => match width {
                        Width::W8 => {
                            let val = hw.mmu.read_u8(seg, offset);
                            self.set_r8(R8::AL, val);
                        }
                        Width::W16 => {
                            let val = hw.mmu.read_u16(seg, offset);
                            self.set_r16(R16::AX, val);
                        }
                    },
                    Dir::RmReg => match width {
                        Width::W8 => {
                            let val = self.get_r8(R8::AL);
                            hw.mmu.write_u8(seg, offset, val);
                        }
                        Width::W16 => {
                            let val = self.get_r16(R16::AX);
                            hw.mmu.write_u16(seg, offset, val);
                        }
                    },
                }
            }
            Op::Movs(width) => self.string_instruction(hw, &mut ctx, StringKind::Movs, width),
            Op::Cmps(width) => self.string_instruction(hw, &mut ctx, StringKind::Cmps, width),
            Op::Stos(width) => self.string_instruction(hw, &mut ctx, StringKind::Stos, width),
            Op::Lods(width) => self.string_instruction(hw, &mut ctx, StringKind::Lods, width),
            Op::Scas(width) => self.string_instruction(hw, &mut ctx, StringKind::Scas, width),
            Op::TestAccImm(width) => {
                let left = self.read_acc(width);
                let right = self.read_imm(&hw.mmu, width);
                self.alu(width, AluOp::And, left, right);
            }
            Op::MovRegImm8(r) => {
                let val = self.read_u8(&hw.mmu);
                self.set_r8(r, val);
            }
            Op::MovRegImm16(r) => {
                let val = self.read_u16(&hw.mmu);
                self.set_r16(r, val);
            }
            Op::ShiftGroup(width, count) => {
                let modrm = self.read_u8(&hw.mmu);
                let shift_op = ShiftOp::from_index(modrm >> 3);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let count = match count {
                    ShiftCount::One => 1,
                    ShiftCount::Cl => self.get_r8(R8::CL),
                    ShiftCount::Imm8 => self.read_u8(&hw.mmu),
                };
                let val = self.read_rm(&hw.mmu, width, rm);
                let res = self.shift(width, shift_op, val, count);
                self.write_rm(&mut hw.mmu, width, rm, res);
            }
            Op::RetImm => {
                let imm = self.read_u16(&hw.mmu);
                self.regs.ip = self.pop16(&hw.mmu);
                let sp = self.get_r16(R16::SP).wrapping_add(imm);
                self.set_r16(R16::SP, sp);
            }
            Op::Ret => {
                self.regs.ip = self.pop16(&hw.mmu);
            }
            Op::Les => {
                let modrm = self.read_u8(&hw.mmu);
                self.load_far_pointer(hw, &mut ctx, modrm, SR::ES).map_err(|m| invalid_encoding(m, at))?;
            }
            Op::Lds => {
                let modrm = self.read_u8(&hw.mmu);
                self.load_far_pointer(hw, &mut ctx, modrm, SR::DS).map_err(|m| invalid_encoding(m, at))?;
            }
            Op::MovRmImm(width) => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let val = self.read_imm(&hw.mmu, width);
                self.write_rm(&mut hw.mmu, width, rm, val);
            }
            Op::Enter => {
                let alloc = self.read_u16(&hw.mmu);
                let nesting = self.read_u8(&hw.mmu) & 0x1F;
                let bp = self.get_r16(R16::BP);
                self.push16(&mut hw.mmu, bp);
                let frame = self.get_r16(R16::SP);
                if nesting > 0 {
                    for _ in 1..nesting {
                        let bp = self.get_r16(R16::BP).wrapping_sub(2);
                        self.set_r16(R16::BP, bp);
                        let val = hw.mmu.read_u16(self.get_sr(SR::SS), bp);
                        self.push16(&mut hw.mmu, val);
                    }
                    self.push16(&mut hw.mmu, frame);
                }
                self.set_r16(R16::BP, frame);
                let sp = self.get_r16(R16::SP).wrapping_sub(alloc);
                self.set_r16(R16::SP, sp);
            }
            Op::Leave => {
                let bp = self.get_r16(R16::BP);
                self.set_r16(R16::SP, bp);
                let bp = self.pop16(&hw.mmu);
                self.set_r16(R16::BP, bp);
            }
            Op::RetfImm => {
                let imm = self.read_u16(&hw.mmu);
                self.regs.ip = self.pop16(&hw.mmu);
                let cs = self.pop16(&hw.mmu);
                self.set_sr(SR::CS, cs);
                let sp = self.get_r16(R16::SP).wrapping_add(imm);
                self.set_r16(R16::SP, sp);
            }
            Op::Retf => {
                self.regs.ip = self.pop16(&hw.mmu);
                let cs = self.pop16(&hw.mmu);
                self.set_sr(SR::CS, cs);
            }
            Op::Int3 => self.execute_interrupt(&mut hw.mmu, 3),
            Op::Int => {
                let num = self.read_u8(&hw.mmu);
                self.execute_interrupt(&mut hw.mmu, num);
            }
            Op::Into => {
                if self.regs.flags.overflow {
                    self.execute_interrupt(&mut hw.mmu, 4);
                }
            }
            Op::Iret => {
                self.regs.ip = self.pop16(&hw.mmu);
                let cs = self.pop16(&hw.mmu);
                self.set_sr(SR::CS, cs);
                let flags = self.pop16(&hw.mmu);
                self.regs.flags.set_u16(flags);
            }
            Op::Aam => {
                let imm = self.read_u8(&hw.mmu);
                if !self.aam(imm) {
                    self.execute_interrupt(&mut hw.mmu, 0);
                }
            }
            Op::Aad => {
                let imm = self.read_u8(&hw.mmu);
                self.aad(imm);
            }
            Op::Salc => {
                let al = if self.regs.flags.carry { 0xFF } else { 0x00 };
                self.set_r8(R8::AL, al);
            }
            Op::Xlat => {
                let seg = ctx.segment_value(self, SR::DS);
                let offset = self.get_r16(R16::BX).wrapping_add(u16::from(self.get_r8(R8::AL)));
                let val = hw.mmu.read_u8(seg, offset);
                self.set_r8(R8::AL, val);
            }
            Op::Esc => {
                // coprocessor escape: decode the operand, do nothing with it
                let modrm = self.read_u8(&hw.mmu);
                self.decode_rm(&hw.mmu, &mut ctx, modrm);
            }
            Op::Loopne => {
                let target = self.read_rel8(&hw.mmu);
                let cx = self.get_r16(R16::CX).wrapping_sub(1);
                self.set_r16(R16::CX, cx);
                if cx != 0 && !self.regs.flags.zero {
                    self.regs.ip = target;
                }
            }
            Op::Loope => {
                let target = self.read_rel8(&hw.mmu);
                let cx = self.get_r16(R16::CX).wrapping_sub(1);
                self.set_r16(R16::CX, cx);
                if cx != 0 && self.regs.flags.zero {
                    self.regs.ip = target;
                }
            }
            Op::Loop => {
                let target = self.read_rel8(&hw.mmu);
                let cx = self.get_r16(R16::CX).wrapping_sub(1);
                self.set_r16(R16::CX, cx);
                if cx != 0 {
                    self.regs.ip = target;
                }
            }
            Op::Jcxz => {
                let target = self.read_rel8(&hw.mmu);
                if self.get_r16(R16::CX) == 0 {
                    self.regs.ip = target;
                }
            }
            Op::InImm(width) => {
                let port = u16::from(self.read_u8(&hw.mmu));
                self.port_in(hw, width, port);
            }
            Op::OutImm(width) => {
                let port = u16::from(self.read_u8(&hw.mmu));
                self.port_out(hw, width, port);
            }
            Op::InDx(width) => {
                let port = self.get_r16(R16::DX);
                self.port_in(hw, width, port);
            }
            Op::OutDx(width) => {
                let port = self.get_r16(R16::DX);
                self.port_out(hw, width, port);
            }
            Op::CallNear => {
                let target = self.read_rel16(&hw.mmu);
                let ip = self.regs.ip;
                self.push16(&mut hw.mmu, ip);
                self.regs.ip = target;
            }
            Op::JmpNear => {
                self.regs.ip = self.read_rel16(&hw.mmu);
            }
            Op::JmpFar => {
                let offset = self.read_u16(&hw.mmu);
                let segment = self.read_u16(&hw.mmu);
                self.set_sr(SR::CS, segment);
                self.regs.ip = offset;
            }
            Op::JmpShort => {
                self.regs.ip = self.read_rel8(&hw.mmu);
            }
            Op::Hlt => return Ok(Step::Halt),
            Op::Cmc => self.regs.flags.carry = !self.regs.flags.carry,
            Op::Clc => self.regs.flags.carry = false,
            Op::Stc => self.regs.flags.carry = true,
            Op::Cli => self.regs.flags.set_interrupt(false),
            Op::Sti => self.regs.flags.set_interrupt(true),
            Op::Cld => self.regs.flags.set_direction(false),
            Op::Std => self.regs.flags.set_direction(true),
            Op::MulGroup(width) => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let operand = self.read_rm(&hw.mmu, width, rm);
                match (modrm >> 3) & 7 {
                    0 | 1 => {
                        // test r/m, imm
                        let imm = self.read_imm(&hw.mmu, width);
                        self.alu(width, AluOp::And, operand, imm);
                    }
                    2 => {
                        // not: no flags are affected
                        let res = !operand & width.mask() as u16;
                        self.write_rm(&mut hw.mmu, width, rm, res);
                    }
                    3 => {
                        // neg = 0 - operand
                        let res = self.alu(width, AluOp::Sub, 0, operand);
                        self.write_rm(&mut hw.mmu, width, rm, res);
                    }
                    4 => match width {
                        Width::W8 => self.mul8(operand as u8),
                        Width::W16 => self.mul16(operand),
                    },
                    5 => match width {
                        Width::W8 => self.imul8(operand as u8),
                        Width::W16 => self.imul16(operand),
                    },
                    6 => {
                        let ok = match width {
                            Width::W8 => self.div8(operand as u8),
                            Width::W16 => self.div16(operand),
                        };
                        if !ok {
                            self.execute_interrupt(&mut hw.mmu, 0);
                        }
                    }
                    _ => {
                        let ok = match width {
                            Width::W8 => self.idiv8(operand as u8),
                            Width::W16 => self.idiv16(operand),
                        };
                        if !ok {
                            self.execute_interrupt(&mut hw.mmu, 0);
                        }
                    }
                }
            }
            Op::IncDecRm8 => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                let val = u16::from(self.read_rm8(&hw.mmu, rm));
                let res = match (modrm >> 3) & 7 {
                    0 => self.inc(Width::W8, val),
                    1 => self.dec(Width::W8, val),
                    _ => return Err(invalid_encoding(modrm, at)),
                };
                self.write_rm8(&mut hw.mmu, rm, res as u8);
            }
            Op::Group5 => {
                let modrm = self.read_u8(&hw.mmu);
                let rm = self.decode_rm(&hw.mmu, &mut ctx, modrm);
                match (modrm >> 3) & 7 {
                    0 => {
                        let val = self.read_rm16(&hw.mmu, rm);
                        let res = self.inc(Width::W16, val);
                        self.write_rm16(&mut hw.mmu, rm, res);
                    }
                    1 => {
                        let val = self.read_rm16(&hw.mmu, rm);
                        let res = self.dec(Width::W16, val);
                        self.write_rm16(&mut hw.mmu, rm, res);
                    }
                    2 => {
                        // call near r/m16
                        let target = self.read_rm16(&hw.mmu, rm);
                        let ip = self.regs.ip;
                        self.push16(&mut hw.mmu, ip);
                        self.regs.ip = target;
                    }
                    3 => {
                        // call far m16:16
                        let (offset, segment) = self.read_far_operand(hw, rm).ok_or_else(|| invalid_encoding(modrm, at))?;
                        let cs = self.get_sr(SR::CS);
                        let ip = self.regs.ip;
                        self.push16(&mut hw.mmu, cs);
                        self.push16(&mut hw.mmu, ip);
                        self.set_sr(SR::CS, segment);
                        self.regs.ip = offset;
                    }
                    4 => {
                        self.regs.ip = self.read_rm16(&hw.mmu, rm);
                    }
                    5 => {
                        // jmp far m16:16
                        let (offset, segment) = self.read_far_operand(hw, rm).ok_or_else(|| invalid_encoding(modrm, at))?;
                        self.set_sr(SR::CS, segment);
                        self.regs.ip = offset;
                    }
                    6 => {
                        let mut val = self.read_rm16(&hw.mmu, rm);
                        if rm == RmOperand::Register(4) && self.model == CpuModel::Intel8086 {
                            val = val.wrapping_sub(2);
                        }
                        self.push16(&mut hw.mmu, val);
                    }
                    _ => return Err(invalid_encoding(modrm, at)),
                }
            }
            Op::Invalid => {
                return Err(Fault::UnimplementedOpcode {
                    op: opcode,
                    cs: at.segment,
                    ip: at.offset,
                })
            }
        }
        Ok(Step::Normal)
    }

    // width-generic operand plumbing shared by the parameterized entries

    fn read_rm(&self, mmu: &MMU, width: Width, rm: RmOperand) -> u16 {
        match width {
            Width::W8 => u16::from(self.read_rm8(mmu, rm)),
            Width::W16 => self.read_rm16(mmu, rm),
        }
    }

    fn write_rm(&mut self, mmu: &mut MMU, width: Width, rm: RmOperand, data: u16) {
        match width {
            Width::W8 => self.write_rm8(mmu, rm, data as u8),
            Width::W16 => self.write_rm16(mmu, rm, data),
        }
    }

    fn read_reg(&self, width: Width, modrm: u8) -> u16 {
        match width {
            Width::W8 => u16::from(self.read_reg8(modrm)),
            Width::W16 => self.read_reg16(modrm),
        }
    }

    fn write_reg(&mut self, width: Width, modrm: u8, data: u16) {
        match width {
            Width::W8 => self.write_reg8(modrm, data as u8),
            Width::W16 => self.write_reg16(modrm, data),
        }
    }

    fn read_imm(&mut self, mmu: &MMU, width: Width) -> u16 {
        match width {
            Width::W8 => u16::from(self.read_u8(mmu)),
            Width::W16 => self.read_u16(mmu),
        }
    }

    fn read_acc(&self, width: Width) -> u16 {
        match width {
            Width::W8 => u16::from(self.get_r8(R8::AL)),
            Width::W16 => self.get_r16(R16::AX),
        }
    }

    fn write_acc(&mut self, width: Width, data: u16) {
        match width {
            Width::W8 => self.set_r8(R8::AL, data as u8),
            Width::W16 => self.set_r16(R16::AX, data),
        }
    }

    /// imul r16, r/m16, imm with truncation-based CF/OF
    fn imul_truncating(&mut self, modrm: u8, a: i16, b: i16) {
        let res = i32::from(a) * i32::from(b);
        self.write_reg16(modrm, res as u16);
        let overflow = res != i32::from(res as i16);
        self.regs.flags.carry = overflow;
        self.regs.flags.overflow = overflow;
    }

    /// les/lds: loads the offset word into the reg field register and the
    /// following word into the given segment register. Err carries the modrm
    /// byte of a register-direct encoding, which has no far pointer to load.
    fn load_far_pointer(&mut self, hw: &Hardware, ctx: &mut DecodeContext, modrm: u8, sr: SR) -> Result<(), u8> {
        let rm = self.decode_rm(&hw.mmu, ctx, modrm);
        match rm {
            RmOperand::Memory(seg, offset) => {
                let value = hw.mmu.read_u16(seg, offset);
                let segment = hw.mmu.read_u16(seg, offset.wrapping_add(2));
                self.write_reg16(modrm, value);
                self.set_sr(sr, segment);
                Ok(())
            }
            RmOperand::Register(_) => Err(modrm),
        }
    }

    /// reads the 16:16 pointer of the far call/jmp memory forms
    fn read_far_operand(&self, hw: &Hardware, rm: RmOperand) -> Option<(u16, u16)> {
        match rm {
            RmOperand::Memory(seg, offset) => {
                let target = hw.mmu.read_u16(seg, offset);
                let segment = hw.mmu.read_u16(seg, offset.wrapping_add(2));
                Some((target, segment))
            }
            RmOperand::Register(_) => None,
        }
    }

    fn port_in(&mut self, hw: &mut Hardware, width: Width, port: u16) {
        match width {
            Width::W8 => {
                let data = hw.io.in_u8(port);
                self.set_r8(R8::AL, data);
            }
            Width::W16 => {
                let data = hw.io.in_u16(port);
                self.set_r16(R16::AX, data);
            }
        }
    }

    fn port_out(&mut self, hw: &mut Hardware, width: Width, port: u16) {
        match width {
            Width::W8 => {
                let data = self.get_r8(R8::AL);
                hw.io.out_u8(port, data);
            }
            Width::W16 => {
                let data = self.get_r16(R16::AX);
                hw.io.out_u16(port, data);
            }
        }
    }

    /// executes one string instruction, honoring an active repeat prefix:
    /// the loop decrements CX per iteration and CMPS/SCAS additionally stop
    /// when the zero flag hits the repeat mode's termination condition.
    fn string_instruction(&mut self, hw: &mut Hardware, ctx: &mut DecodeContext, kind: StringKind, width: Width) {
        // the SI-side segment honors an override; the ES:DI side never does
        let src_seg = ctx.segment_value(self, SR::DS);
        match ctx.repeat {
            RepeatMode::None => self.string_step(hw, kind, width, src_seg),
            rep => loop {
                if self.get_r16(R16::CX) == 0 {
                    break;
                }
                self.string_step(hw, kind, width, src_seg);
                let cx = self.get_r16(R16::CX).wrapping_sub(1);
                self.set_r16(R16::CX, cx);
                if kind.is_compare() {
                    let stop = match rep {
                        RepeatMode::Rep => !self.regs.flags.zero,
                        RepeatMode::Repne => self.regs.flags.zero,
                        RepeatMode::None => unreachable!(),
                    };
                    if stop {
                        break;
                    }
                }
            },
        }
    }

    fn string_step(&mut self, hw: &mut Hardware, kind: StringKind, width: Width, src_seg: u16) {
        let size = match width {
            Width::W8 => 1u16,
            Width::W16 => 2u16,
        };
        let delta = if self.regs.flags.direction() {
            size.wrapping_neg()
        } else {
            size
        };
        let es = self.get_sr(SR::ES);
        let si = self.get_r16(R16::SI);
        let di = self.get_r16(R16::DI);
        match kind {
            StringKind::Movs => {
                match width {
                    Width::W8 => {
                        let b = hw.mmu.read_u8(src_seg, si);
                        hw.mmu.write_u8(es, di, b);
                    }
                    Width::W16 => {
                        let w = hw.mmu.read_u16(src_seg, si);
                        hw.mmu.write_u16(es, di, w);
                    }
                }
                self.set_r16(R16::SI, si.wrapping_add(delta));
                self.set_r16(R16::DI, di.wrapping_add(delta));
            }
            StringKind::Cmps => {
                let left = match width {
                    Width::W8 => u16::from(hw.mmu.read_u8(src_seg, si)),
                    Width::W16 => hw.mmu.read_u16(src_seg, si),
                };
                let right = match width {
                    Width::W8 => u16::from(hw.mmu.read_u8(es, di)),
                    Width::W16 => hw.mmu.read_u16(es, di),
                };
                self.alu(width, AluOp::Cmp, left, right);
                self.set_r16(R16::SI, si.wrapping_add(delta));
                self.set_r16(R16::DI, di.wrapping_add(delta));
            }
            StringKind::Stos => {
                match width {
                    Width::W8 => {
                        let al = self.get_r8(R8::AL);
                        hw.mmu.write_u8(es, di, al);
                    }
                    Width::W16 => {
                        let ax = self.get_r16(R16::AX);
                        hw.mmu.write_u16(es, di, ax);
                    }
                }
                self.set_r16(R16::DI, di.wrapping_add(delta));
            }
            StringKind::Lods => {
                match width {
                    Width::W8 => {
                        let b = hw.mmu.read_u8(src_seg, si);
                        self.set_r8(R8::AL, b);
                    }
                    Width::W16 => {
                        let w = hw.mmu.read_u16(src_seg, si);
                        self.set_r16(R16::AX, w);
                    }
                }
                self.set_r16(R16::SI, si.wrapping_add(delta));
            }
            StringKind::Scas => {
                let left = self.read_acc(width);
                let right = match width {
                    Width::W8 => u16::from(hw.mmu.read_u8(es, di)),
                    Width::W16 => hw.mmu.read_u16(es, di),
                };
                self.alu(width, AluOp::Cmp, left, right);
                self.set_r16(R16::DI, di.wrapping_add(delta));
            }
            StringKind::Ins => {
                let port = self.get_r16(R16::DX);
                match width {
                    Width::W8 => {
                        let data = hw.io.in_u8(port);
                        hw.mmu.write_u8(es, di, data);
                    }
                    Width::W16 => {
                        let data = hw.io.in_u16(port);
                        hw.mmu.write_u16(es, di, data);
                    }
                }
                self.set_r16(R16::DI, di.wrapping_add(delta));
            }
            StringKind::Outs => {
                let port = self.get_r16(R16::DX);
                match width {
                    Width::W8 => {
                        let data = hw.mmu.read_u8(src_seg, si);
                        hw.io.out_u8(port, data);
                    }
                    Width::W16 => {
                        let data = hw.mmu.read_u16(src_seg, si);
                        hw.io.out_u16(port, data);
                    }
                }
                self.set_r16(R16::SI, si.wrapping_add(delta));
            }
        }
    }
}

fn invalid_encoding(modrm: u8, at: MemoryAddress) -> Fault {
    Fault::InvalidOperandEncoding {
        modrm,
        cs: at.segment,
        ip: at.offset,
    }
}
