use crate::cpu::{AluOp, CpuModel, Flags, Width, R16, R8, SR};

/// operand pattern of the ALU-family opcode rows
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AluForm {
    /// op r/m, reg
    RmReg,
    /// op reg, r/m
    RegRm,
    /// op AL/AX, imm
    AccImm,
}

/// direction of the register/memory move forms (the destination comes first)
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Dir {
    /// r/m (or memory) is the destination
    RmReg,
    /// the register (or accumulator) is the destination
    RegRm,
}

/// count operand of the shift/rotate group
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ShiftCount {
    One,
    Cl,
    Imm8,
}

/// the 16 conditions of the short conditional jumps, in opcode order
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Cond {
    O, No, C, Nc, Z, Nz, Na, A, S, Ns, Pe, Po, L, Nl, Ng, G,
}

impl Cond {
    pub fn from_low_nibble(v: u8) -> Cond {
        match v & 0xF {
            0x0 => Cond::O,
            0x1 => Cond::No,
            0x2 => Cond::C,
            0x3 => Cond::Nc,
            0x4 => Cond::Z,
            0x5 => Cond::Nz,
            0x6 => Cond::Na,
            0x7 => Cond::A,
            0x8 => Cond::S,
            0x9 => Cond::Ns,
            0xA => Cond::Pe,
            0xB => Cond::Po,
            0xC => Cond::L,
            0xD => Cond::Nl,
            0xE => Cond::Ng,
            _ => Cond::G,
        }
    }

    pub fn eval(self, f: &Flags) -> bool {
        match self {
            Cond::O => f.overflow,
            Cond::No => !f.overflow,
            Cond::C => f.carry,
            Cond::Nc => !f.carry,
            Cond::Z => f.zero,
            Cond::Nz => !f.zero,
            Cond::Na => f.carry || f.zero,
            Cond::A => !f.carry && !f.zero,
            Cond::S => f.sign,
            Cond::Ns => !f.sign,
            Cond::Pe => f.parity,
            Cond::Po => !f.parity,
            Cond::L => f.sign != f.overflow,
            Cond::Nl => f.sign == f.overflow,
            Cond::Ng => f.zero || f.sign != f.overflow,
            Cond::G => !f.zero && f.sign == f.overflow,
        }
    }
}

/// a dispatch table entry: the decode and execute strategy of one opcode.
/// the whole 0x00..0x3D arithmetic family shares the parameterized `Alu`
/// variant instead of 48 near-identical entries.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Op {
    Alu(AluOp, Width, AluForm),
    /// 0x80..0x83 group: operation in the reg field, immediate operand.
    /// the bool marks the sign-extended imm8 form (0x83).
    AluImmGroup(Width, bool),
    PushSR(SR),
    PopSR(SR),
    Daa,
    Das,
    Aaa,
    Aas,
    IncReg(R16),
    DecReg(R16),
    PushReg(R16),
    PopReg(R16),
    Pusha,
    Popa,
    Bound,
    PushImm16,
    ImulImm16,
    PushImm8,
    ImulImm8,
    Ins(Width),
    Outs(Width),
    Jcc(Cond),
    TestRmReg(Width),
    XchgRmReg(Width),
    Mov(Width, Dir),
    MovSreg(Dir),
    Lea,
    PopRm,
    Nop,
    XchgAxReg(R16),
    Cbw,
    Cwd,
    CallFar,
    Wait,
    Pushf,
    Popf,
    Sahf,
    Lahf,
    MovAccMoffs(Width, Dir),
    Movs(Width),
    Cmps(Width),
    TestAccImm(Width),
    Stos(Width),
    Lods(Width),
    Scas(Width),
    MovRegImm8(R8),
    MovRegImm16(R16),
    ShiftGroup(Width, ShiftCount),
    RetImm,
    Ret,
    Les,
    Lds,
    MovRmImm(Width),
    Enter,
    Leave,
    RetfImm,
    Retf,
    Int3,
    Int,
    Into,
    Iret,
    Aam,
    Aad,
    Salc,
    Xlat,
    /// coprocessor escape 0xD8..0xDF: the operand is decoded and discarded
    Esc,
    Loopne,
    Loope,
    Loop,
    Jcxz,
    InImm(Width),
    OutImm(Width),
    InDx(Width),
    OutDx(Width),
    CallNear,
    JmpNear,
    JmpFar,
    JmpShort,
    Hlt,
    Cmc,
    Clc,
    Stc,
    Cli,
    Sti,
    Cld,
    Std,
    /// 0xF6/0xF7 group: test/not/neg/mul/imul/div/idiv by reg field
    MulGroup(Width),
    /// 0xFE: inc/dec r/m8
    IncDecRm8,
    /// 0xFF group: inc/dec/call/callf/jmp/jmpf/push r/m16
    Group5,
    Invalid,
}

/// the fixed dispatch table, indexed by opcode byte. prefix rows (0x26, 0x2E,
/// 0x36, 0x3E, 0xF0..0xF3) are consumed by the dispatcher's prefix loop and
/// never reach a lookup; their entries are placeholders.
static OPCODES: [Op; 256] = [
    // 0x00
    Op::Alu(AluOp::Add, Width::W8, AluForm::RmReg),
    Op::Alu(AluOp::Add, Width::W16, AluForm::RmReg),
    Op::Alu(AluOp::Add, Width::W8, AluForm::RegRm),
    Op::Alu(AluOp::Add, Width::W16, AluForm::RegRm),
    Op::Alu(AluOp::Add, Width::W8, AluForm::AccImm),
    Op::Alu(AluOp::Add, Width::W16, AluForm::AccImm),
    Op::PushSR(SR::ES),
    Op::PopSR(SR::ES),
    // 0x08
    Op::Alu(AluOp::Or, Width::W8, AluForm::RmReg),
    Op::Alu(AluOp::Or, Width::W16, AluForm::RmReg),
    Op::Alu(AluOp::Or, Width::W8, AluForm::RegRm),
    Op::Alu(AluOp::Or, Width::W16, AluForm::RegRm),
    Op::Alu(AluOp::Or, Width::W8, AluForm::AccImm),
    Op::Alu(AluOp::Or, Width::W16, AluForm::AccImm),
    Op::PushSR(SR::CS),
    Op::Invalid, // 0x0F: pop cs on the 8086, see lookup_op
    // 0x10
    Op::Alu(AluOp::Adc, Width::W8, AluForm::RmReg),
    Op::Alu(AluOp::Adc, Width::W16, AluForm::RmReg),
    Op::Alu(AluOp::Adc, Width::W8, AluForm::RegRm),
    Op::Alu(AluOp::Adc, Width::W16, AluForm::RegRm),
    Op::Alu(AluOp::Adc, Width::W8, AluForm::AccImm),
    Op::Alu(AluOp::Adc, Width::W16, AluForm::AccImm),
    Op::PushSR(SR::SS),
    Op::PopSR(SR::SS),
    // 0x18
    Op::Alu(AluOp::Sbb, Width::W8, AluForm::RmReg),
    Op::Alu(AluOp::Sbb, Width::W16, AluForm::RmReg),
    Op::Alu(AluOp::Sbb, Width::W8, AluForm::RegRm),
    Op::Alu(AluOp::Sbb, Width::W16, AluForm::RegRm),
    Op::Alu(AluOp::Sbb, Width::W8, AluForm::AccImm),
    Op::Alu(AluOp::Sbb, Width::W16, AluForm::AccImm),
    Op::PushSR(SR::DS),
    Op::PopSR(SR::DS),
    // 0x20
    Op::Alu(AluOp::And, Width::W8, AluForm::RmReg),
    Op::Alu(AluOp::And, Width::W16, AluForm::RmReg),
    Op::Alu(AluOp::And, Width::W8, AluForm::RegRm),
    Op::Alu(AluOp::And, Width::W16, AluForm::RegRm),
    Op::Alu(AluOp::And, Width::W8, AluForm::AccImm),
    Op::Alu(AluOp::And, Width::W16, AluForm::AccImm),
    Op::Invalid, // 0x26: es override prefix
    Op::Daa,
    // 0x28
    Op::Alu(AluOp::Sub, Width::W8, AluForm::RmReg),
    Op::Alu(AluOp::Sub, Width::W16, AluForm::RmReg),
    Op::Alu(AluOp::Sub, Width::W8, AluForm::RegRm),
    Op::Alu(AluOp::Sub, Width::W16, AluForm::RegRm),
    Op::Alu(AluOp::Sub, Width::W8, AluForm::AccImm),
    Op::Alu(AluOp::Sub, Width::W16, AluForm::AccImm),
    Op::Invalid, // 0x2E: cs override prefix
    Op::Das,
    // 0x30
    Op::Alu(AluOp::Xor, Width::W8, AluForm::RmReg),
    Op::Alu(AluOp::Xor, Width::W16, AluForm::RmReg),
    Op::Alu(AluOp::Xor, Width::W8, AluForm::RegRm),
    Op::Alu(AluOp::Xor, Width::W16, AluForm::RegRm),
    Op::Alu(AluOp::Xor, Width::W8, AluForm::AccImm),
    Op::Alu(AluOp::Xor, Width::W16, AluForm::AccImm),
    Op::Invalid, // 0x36: ss override prefix
    Op::Aaa,
    // 0x38
    Op::Alu(AluOp::Cmp, Width::W8, AluForm::RmReg),
    Op::Alu(AluOp::Cmp, Width::W16, AluForm::RmReg),
    Op::Alu(AluOp::Cmp, Width::W8, AluForm::RegRm),
    Op::Alu(AluOp::Cmp, Width::W16, AluForm::RegRm),
    Op::Alu(AluOp::Cmp, Width::W8, AluForm::AccImm),
    Op::Alu(AluOp::Cmp, Width::W16, AluForm::AccImm),
    Op::Invalid, // 0x3E: ds override prefix
    Op::Aas,
    // 0x40: inc r16
    Op::IncReg(R16::AX),
    Op::IncReg(R16::CX),
    Op::IncReg(R16::DX),
    Op::IncReg(R16::BX),
    Op::IncReg(R16::SP),
    Op::IncReg(R16::BP),
    Op::IncReg(R16::SI),
    Op::IncReg(R16::DI),
    // 0x48: dec r16
    Op::DecReg(R16::AX),
    Op::DecReg(R16::CX),
    Op::DecReg(R16::DX),
    Op::DecReg(R16::BX),
    Op::DecReg(R16::SP),
    Op::DecReg(R16::BP),
    Op::DecReg(R16::SI),
    Op::DecReg(R16::DI),
    // 0x50: push r16
    Op::PushReg(R16::AX),
    Op::PushReg(R16::CX),
    Op::PushReg(R16::DX),
    Op::PushReg(R16::BX),
    Op::PushReg(R16::SP),
    Op::PushReg(R16::BP),
    Op::PushReg(R16::SI),
    Op::PushReg(R16::DI),
    // 0x58: pop r16
    Op::PopReg(R16::AX),
    Op::PopReg(R16::CX),
    Op::PopReg(R16::DX),
    Op::PopReg(R16::BX),
    Op::PopReg(R16::SP),
    Op::PopReg(R16::BP),
    Op::PopReg(R16::SI),
    Op::PopReg(R16::DI),
    // 0x60: the 80186 group; the 8086 aliases this row to 0x70..0x7F
    Op::Pusha,
    Op::Popa,
    Op::Bound,
    Op::Invalid, // 0x63: arpl is 286+
    Op::Invalid, // 0x64
    Op::Invalid, // 0x65
    Op::Invalid, // 0x66
    Op::Invalid, // 0x67
    Op::PushImm16,
    Op::ImulImm16,
    Op::PushImm8,
    Op::ImulImm8,
    Op::Ins(Width::W8),
    Op::Ins(Width::W16),
    Op::Outs(Width::W8),
    Op::Outs(Width::W16),
    // 0x70: jcc rel8
    Op::Jcc(Cond::O),
    Op::Jcc(Cond::No),
    Op::Jcc(Cond::C),
    Op::Jcc(Cond::Nc),
    Op::Jcc(Cond::Z),
    Op::Jcc(Cond::Nz),
    Op::Jcc(Cond::Na),
    Op::Jcc(Cond::A),
    Op::Jcc(Cond::S),
    Op::Jcc(Cond::Ns),
    Op::Jcc(Cond::Pe),
    Op::Jcc(Cond::Po),
    Op::Jcc(Cond::L),
    Op::Jcc(Cond::Nl),
    Op::Jcc(Cond::Ng),
    Op::Jcc(Cond::G),
    // 0x80
    Op::AluImmGroup(Width::W8, false),
    Op::AluImmGroup(Width::W16, false),
    Op::AluImmGroup(Width::W8, false), // 0x82: alias of 0x80
    Op::AluImmGroup(Width::W16, true),
    Op::TestRmReg(Width::W8),
    Op::TestRmReg(Width::W16),
    Op::XchgRmReg(Width::W8),
    Op::XchgRmReg(Width::W16),
    // 0x88
    Op::Mov(Width::W8, Dir::RmReg),
    Op::Mov(Width::W16, Dir::RmReg),
    Op::Mov(Width::W8, Dir::RegRm),
    Op::Mov(Width::W16, Dir::RegRm),
    Op::MovSreg(Dir::RmReg),
    Op::Lea,
    Op::MovSreg(Dir::RegRm),
    Op::PopRm,
    // 0x90
    Op::Nop,
    Op::XchgAxReg(R16::CX),
    Op::XchgAxReg(R16::DX),
    Op::XchgAxReg(R16::BX),
    Op::XchgAxReg(R16::SP),
    Op::XchgAxReg(R16::BP),
    Op::XchgAxReg(R16::SI),
    Op::XchgAxReg(R16::DI),
    // 0x98
    Op::Cbw,
    Op::Cwd,
    Op::CallFar,
    Op::Wait,
    Op::Pushf,
    Op::Popf,
    Op::Sahf,
    Op::Lahf,
    // 0xA0
    Op::MovAccMoffs(Width::W8, Dir::RegRm),
    Op::MovAccMoffs(Width::W16, Dir::RegRm),
    Op::MovAccMoffs(Width::W8, Dir::RmReg),
    Op::MovAccMoffs(Width::W16, Dir::RmReg),
    Op::Movs(Width::W8),
    Op::Movs(Width::W16),
    Op::Cmps(Width::W8),
    Op::Cmps(Width::W16),
    // 0xA8
    Op::TestAccImm(Width::W8),
    Op::TestAccImm(Width::W16),
    Op::Stos(Width::W8),
    Op::Stos(Width::W16),
    Op::Lods(Width::W8),
    Op::Lods(Width::W16),
    Op::Scas(Width::W8),
    Op::Scas(Width::W16),
    // 0xB0: mov r8, imm8
    Op::MovRegImm8(R8::AL),
    Op::MovRegImm8(R8::CL),
    Op::MovRegImm8(R8::DL),
    Op::MovRegImm8(R8::BL),
    Op::MovRegImm8(R8::AH),
    Op::MovRegImm8(R8::CH),
    Op::MovRegImm8(R8::DH),
    Op::MovRegImm8(R8::BH),
    // 0xB8: mov r16, imm16
    Op::MovRegImm16(R16::AX),
    Op::MovRegImm16(R16::CX),
    Op::MovRegImm16(R16::DX),
    Op::MovRegImm16(R16::BX),
    Op::MovRegImm16(R16::SP),
    Op::MovRegImm16(R16::BP),
    Op::MovRegImm16(R16::SI),
    Op::MovRegImm16(R16::DI),
    // 0xC0: shift imm8 on the 80186, return aliases on the 8086
    Op::ShiftGroup(Width::W8, ShiftCount::Imm8),
    Op::ShiftGroup(Width::W16, ShiftCount::Imm8),
    Op::RetImm,
    Op::Ret,
    Op::Les,
    Op::Lds,
    Op::MovRmImm(Width::W8),
    Op::MovRmImm(Width::W16),
    // 0xC8: enter/leave on the 80186, far-return aliases on the 8086
    Op::Enter,
    Op::Leave,
    Op::RetfImm,
    Op::Retf,
    Op::Int3,
    Op::Int,
    Op::Into,
    Op::Iret,
    // 0xD0: shift group
    Op::ShiftGroup(Width::W8, ShiftCount::One),
    Op::ShiftGroup(Width::W16, ShiftCount::One),
    Op::ShiftGroup(Width::W8, ShiftCount::Cl),
    Op::ShiftGroup(Width::W16, ShiftCount::Cl),
    Op::Aam,
    Op::Aad,
    Op::Salc,
    Op::Xlat,
    // 0xD8: coprocessor escape
    Op::Esc,
    Op::Esc,
    Op::Esc,
    Op::Esc,
    Op::Esc,
    Op::Esc,
    Op::Esc,
    Op::Esc,
    // 0xE0
    Op::Loopne,
    Op::Loope,
    Op::Loop,
    Op::Jcxz,
    Op::InImm(Width::W8),
    Op::InImm(Width::W16),
    Op::OutImm(Width::W8),
    Op::OutImm(Width::W16),
    // 0xE8
    Op::CallNear,
    Op::JmpNear,
    Op::JmpFar,
    Op::JmpShort,
    Op::InDx(Width::W8),
    Op::InDx(Width::W16),
    Op::OutDx(Width::W8),
    Op::OutDx(Width::W16),
    // 0xF0
    Op::Invalid, // 0xF0: lock prefix
    Op::Invalid, // 0xF1: lock prefix alias
    Op::Invalid, // 0xF2: repne prefix
    Op::Invalid, // 0xF3: rep prefix
    Op::Hlt,
    Op::Cmc,
    Op::MulGroup(Width::W8),
    Op::MulGroup(Width::W16),
    // 0xF8
    Op::Clc,
    Op::Stc,
    Op::Cli,
    Op::Sti,
    Op::Cld,
    Op::Std,
    Op::IncDecRm8,
    Op::Group5,
];

/// dispatch table lookup. the base table carries the 80186 meanings; the
/// handful of rows the 8086 decodes differently are patched here.
pub fn lookup_op(opcode: u8, model: CpuModel) -> Op {
    if model == CpuModel::Intel8086 {
        match opcode {
            0x0F => return Op::PopSR(SR::CS),
            // the 8086 mirrors the conditional jumps into 0x60..0x6F
            0x60..=0x6F => return Op::Jcc(Cond::from_low_nibble(opcode)),
            // ...and the returns into the unassigned 0xC0/0xC1/0xC8/0xC9
            0xC0 => return Op::RetImm,
            0xC1 => return Op::Ret,
            0xC8 => return Op::RetfImm,
            0xC9 => return Op::Retf,
            _ => {}
        }
    }
    OPCODES[opcode as usize]
}
