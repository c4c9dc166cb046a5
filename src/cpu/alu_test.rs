use rand::prelude::*;
use rand_xorshift::XorShiftRng;

use crate::cpu::{AluOp, CpuModel, ShiftOp, Width, CPU, R16, R8};

fn cpu_8086() -> CPU {
    CPU::new(CpuModel::Intel8086)
}

fn cpu_80186() -> CPU {
    CPU::new(CpuModel::Intel80186)
}

/// textbook flag reference for the binary operations, computed with
/// widened arithmetic independent of the implementation under test
fn reference_flags(width: Width, op: AluOp, l: u32, r: u32, carry_in: u32) -> (u32, bool, bool, bool) {
    let mask = width.mask();
    let sign = width.sign_bit();
    let (res, cf) = match op {
        AluOp::Add => (l + r, l + r > mask),
        AluOp::Adc => (l + r + carry_in, l + r + carry_in > mask),
        AluOp::Sub | AluOp::Cmp => (l.wrapping_sub(r), l < r),
        AluOp::Sbb => (l.wrapping_sub(r + carry_in), l < r + carry_in),
        AluOp::Or => (l | r, false),
        AluOp::And => (l & r, false),
        AluOp::Xor => (l ^ r, false),
    };
    let masked = res & mask;
    let (af, of) = match op {
        AluOp::Add | AluOp::Adc => (
            (l ^ r ^ res) & 0x10 != 0,
            (masked ^ l) & (masked ^ r) & sign != 0,
        ),
        AluOp::Sub | AluOp::Sbb | AluOp::Cmp => (
            (l ^ r ^ res) & 0x10 != 0,
            (l ^ r) & (l ^ masked) & sign != 0,
        ),
        _ => (false, false),
    };
    (masked, cf, af, of)
}

fn check_one(cpu: &mut CPU, width: Width, op: AluOp, l: u32, r: u32, carry_in: bool) {
    cpu.regs.flags.carry = carry_in;
    let carry = if carry_in { 1 } else { 0 };
    let res = cpu.alu(width, op, l as u16, r as u16);
    let (want, cf, af, of) = reference_flags(width, op, l, r, carry);
    assert_eq!(want as u16, res, "{:?} {:?} {:04X},{:04X}", op, width, l, r);
    assert_eq!(cf, cpu.regs.flags.carry, "CF {:?} {:04X},{:04X} c={}", op, l, r, carry);
    assert_eq!(af, cpu.regs.flags.adjust, "AF {:?} {:04X},{:04X}", op, l, r);
    assert_eq!(of, cpu.regs.flags.overflow, "OF {:?} {:04X},{:04X} c={}", op, l, r, carry);
    assert_eq!(want == 0, cpu.regs.flags.zero, "ZF {:?} {:04X},{:04X}", op, l, r);
    assert_eq!(want & width.sign_bit() != 0, cpu.regs.flags.sign, "SF {:?} {:04X},{:04X}", op, l, r);
    assert_eq!(
        (want as u8).count_ones() % 2 == 0,
        cpu.regs.flags.parity,
        "PF {:?} {:04X},{:04X}", op, l, r
    );
}

const ALL_OPS: [AluOp; 8] = [
    AluOp::Add, AluOp::Or, AluOp::Adc, AluOp::Sbb,
    AluOp::And, AluOp::Sub, AluOp::Xor, AluOp::Cmp,
];

#[test]
fn alu8_flags_match_the_reference_exhaustively() {
    let mut cpu = cpu_8086();
    for op in &ALL_OPS {
        for l in 0..=0xFFu32 {
            for r in 0..=0xFFu32 {
                check_one(&mut cpu, Width::W8, *op, l, r, false);
                check_one(&mut cpu, Width::W8, *op, l, r, true);
            }
        }
    }
}

#[test]
fn alu16_flags_match_the_reference_sampled() {
    let mut cpu = cpu_80186();
    let mut rng = XorShiftRng::seed_from_u64(0x8086_0186);
    for _ in 0..20_000 {
        let l = u32::from(rng.gen::<u16>());
        let r = u32::from(rng.gen::<u16>());
        let op = ALL_OPS[rng.gen_range(0, ALL_OPS.len())];
        let carry = rng.gen::<bool>();
        check_one(&mut cpu, Width::W16, op, l, r, carry);
    }
}

#[test]
fn cmp_is_sub_without_writing() {
    let mut cpu = cpu_8086();
    let res = cpu.alu(Width::W16, AluOp::Cmp, 5, 9);
    assert_eq!(0xFFFC, res);
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.sign);
    assert!(!cpu.regs.flags.zero);
}

#[test]
fn inc_and_dec_preserve_carry() {
    let mut cpu = cpu_8086();
    cpu.regs.flags.carry = true;
    let res = cpu.inc(Width::W8, 0xFF);
    assert_eq!(0x00, res);
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.zero);
    assert!(cpu.regs.flags.adjust);
    assert!(!cpu.regs.flags.overflow);

    cpu.regs.flags.carry = false;
    let res = cpu.dec(Width::W8, 0x00);
    assert_eq!(0xFF, res);
    assert!(!cpu.regs.flags.carry);
    assert!(cpu.regs.flags.sign);
}

#[test]
fn shift_count_zero_is_a_complete_no_op() {
    let mut cpu = cpu_8086();
    cpu.regs.flags.carry = true;
    cpu.regs.flags.overflow = true;
    cpu.regs.flags.zero = true;
    let res = cpu.shift(Width::W8, ShiftOp::Shl, 0x80, 0);
    assert_eq!(0x80, res);
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.overflow);
    assert!(cpu.regs.flags.zero);
}

#[test]
fn shl_by_one_sets_carry_and_overflow_from_the_top_bits() {
    let mut cpu = cpu_8086();

    let res = cpu.shift(Width::W8, ShiftOp::Shl, 0x80, 1);
    assert_eq!(0x00, res);
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.overflow); // msb changed
    assert!(cpu.regs.flags.zero);

    let res = cpu.shift(Width::W8, ShiftOp::Shl, 0x40, 1);
    assert_eq!(0x80, res);
    assert!(!cpu.regs.flags.carry);
    assert!(cpu.regs.flags.overflow);

    let res = cpu.shift(Width::W8, ShiftOp::Shl, 0xC0, 1);
    assert_eq!(0x80, res);
    assert!(cpu.regs.flags.carry);
    assert!(!cpu.regs.flags.overflow);
}

#[test]
fn shr_and_sar_differ_in_the_fill_bit() {
    let mut cpu = cpu_8086();

    let res = cpu.shift(Width::W8, ShiftOp::Shr, 0x81, 1);
    assert_eq!(0x40, res);
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.overflow); // msb was set before the shift

    let res = cpu.shift(Width::W8, ShiftOp::Sar, 0x81, 1);
    assert_eq!(0xC0, res);
    assert!(cpu.regs.flags.carry);
    assert!(!cpu.regs.flags.overflow);

    let res = cpu.shift(Width::W16, ShiftOp::Sar, 0x8000, 15);
    assert_eq!(0xFFFF, res);
}

#[test]
fn rotates_move_bits_without_touching_szp() {
    let mut cpu = cpu_8086();
    cpu.regs.flags.zero = true;

    let res = cpu.shift(Width::W8, ShiftOp::Rol, 0x80, 1);
    assert_eq!(0x01, res);
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.overflow);
    assert!(cpu.regs.flags.zero); // untouched

    let res = cpu.shift(Width::W8, ShiftOp::Ror, 0x01, 1);
    assert_eq!(0x80, res);
    assert!(cpu.regs.flags.carry);

    cpu.regs.flags.carry = true;
    let res = cpu.shift(Width::W8, ShiftOp::Rcl, 0x00, 1);
    assert_eq!(0x01, res);
    assert!(!cpu.regs.flags.carry);

    cpu.regs.flags.carry = true;
    let res = cpu.shift(Width::W8, ShiftOp::Rcr, 0x00, 1);
    assert_eq!(0x80, res);
    assert!(!cpu.regs.flags.carry);
}

#[test]
fn the_80186_masks_shift_counts_and_the_8086_does_not() {
    let mut cpu = cpu_80186();
    cpu.regs.flags.carry = false;
    let res = cpu.shift(Width::W16, ShiftOp::Shl, 0x0001, 16);
    assert_eq!(0x0001, res); // 16 % 16 == 0, no-op
    assert!(!cpu.regs.flags.carry);

    let mut cpu = cpu_8086();
    let res = cpu.shift(Width::W16, ShiftOp::Shl, 0x0001, 16);
    assert_eq!(0x0000, res);
    assert!(cpu.regs.flags.carry); // the last bit shifted out was the msb
}

#[test]
fn daa_corrects_packed_bcd_addition() {
    let mut cpu = cpu_8086();
    // 0x15 + 0x27 leaves 0x3C in AL, which daa turns into 0x42
    cpu.set_r8(R8::AL, 0x3C);
    cpu.regs.flags.adjust = false;
    cpu.regs.flags.carry = false;
    cpu.daa();
    assert_eq!(0x42, cpu.get_r8(R8::AL));
    assert!(cpu.regs.flags.adjust);
    assert!(!cpu.regs.flags.carry);

    // 0x99 + 0x01 carries out of the hundreds
    cpu.regs.flags.adjust = true;
    cpu.regs.flags.carry = false;
    cpu.set_r8(R8::AL, 0x9A);
    cpu.daa();
    assert_eq!(0x00, cpu.get_r8(R8::AL));
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.zero);
}

#[test]
fn das_corrects_packed_bcd_subtraction() {
    let mut cpu = cpu_8086();
    cpu.set_r8(R8::AL, 0x2D); // 0x42 - 0x15
    cpu.regs.flags.adjust = false;
    cpu.regs.flags.carry = false;
    cpu.das();
    assert_eq!(0x27, cpu.get_r8(R8::AL));
    assert!(cpu.regs.flags.adjust);
    assert!(!cpu.regs.flags.carry);
}

#[test]
fn aaa_and_aas_unpack_into_ah() {
    let mut cpu = cpu_8086();
    cpu.set_r16(R16::AX, 0x000F);
    cpu.regs.flags.adjust = false;
    cpu.aaa();
    assert_eq!(0x0105, cpu.get_r16(R16::AX));
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.adjust);

    cpu.set_r16(R16::AX, 0x0103);
    cpu.regs.flags.adjust = false;
    cpu.regs.flags.carry = false;
    cpu.aas();
    assert_eq!(0x0103, cpu.get_r16(R16::AX));
    assert!(!cpu.regs.flags.carry);
}

#[test]
fn aam_and_aad_convert_between_binary_and_unpacked_bcd() {
    let mut cpu = cpu_8086();
    cpu.set_r8(R8::AL, 69);
    assert!(cpu.aam(10));
    assert_eq!(6, cpu.get_r8(R8::AH));
    assert_eq!(9, cpu.get_r8(R8::AL));

    cpu.aad(10);
    assert_eq!(0, cpu.get_r8(R8::AH));
    assert_eq!(69, cpu.get_r8(R8::AL));

    // aam by zero is a divide error
    assert!(!cpu.aam(0));
}

#[test]
fn mul_sets_carry_and_overflow_together() {
    let mut cpu = cpu_8086();
    cpu.set_r8(R8::AL, 0x40);
    cpu.mul8(4);
    assert_eq!(0x0100, cpu.get_r16(R16::AX));
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.overflow);

    cpu.set_r8(R8::AL, 2);
    cpu.mul8(3);
    assert_eq!(0x0006, cpu.get_r16(R16::AX));
    assert!(!cpu.regs.flags.carry);
    assert!(!cpu.regs.flags.overflow);

    cpu.set_r16(R16::AX, 0x8000);
    cpu.mul16(4);
    assert_eq!(0x0000, cpu.get_r16(R16::AX));
    assert_eq!(0x0002, cpu.get_r16(R16::DX));
    assert!(cpu.regs.flags.carry);
}

#[test]
fn imul_checks_sign_extension_not_zero() {
    let mut cpu = cpu_8086();
    cpu.set_r8(R8::AL, 0xFF); // -1
    cpu.imul8(0xFF); // * -1
    assert_eq!(0x0001, cpu.get_r16(R16::AX));
    assert!(!cpu.regs.flags.carry);
    assert!(!cpu.regs.flags.overflow);

    cpu.set_r8(R8::AL, 0x40);
    cpu.imul8(0x40);
    assert_eq!(0x1000, cpu.get_r16(R16::AX));
    assert!(cpu.regs.flags.carry);
    assert!(cpu.regs.flags.overflow);
}

#[test]
fn div_reports_zero_divisors_and_oversized_quotients() {
    let mut cpu = cpu_8086();
    cpu.set_r16(R16::AX, 100);
    assert!(cpu.div8(7));
    assert_eq!(14, cpu.get_r8(R8::AL));
    assert_eq!(2, cpu.get_r8(R8::AH));

    assert!(!cpu.div8(0));

    cpu.set_r16(R16::AX, 0x1000);
    assert!(!cpu.div8(2)); // quotient 0x800 does not fit AL

    cpu.set_r16(R16::DX, 0x0001);
    cpu.set_r16(R16::AX, 0x0000);
    assert!(cpu.div16(2));
    assert_eq!(0x8000, cpu.get_r16(R16::AX));
    assert_eq!(0x0000, cpu.get_r16(R16::DX));
}

#[test]
fn idiv_handles_signed_quotient_and_remainder() {
    let mut cpu = cpu_8086();
    cpu.set_r16(R16::AX, (-100i16) as u16);
    assert!(cpu.idiv8(7));
    assert_eq!((-14i8) as u8, cpu.get_r8(R8::AL));
    assert_eq!((-2i8) as u8, cpu.get_r8(R8::AH));

    assert!(!cpu.idiv8(0));

    // quotient 0x100 does not fit a signed byte
    cpu.set_r16(R16::AX, 0x4000);
    assert!(!cpu.idiv8(0x40));
}
