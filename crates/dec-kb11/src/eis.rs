//! Extended instruction set: MUL, DIV, ASH, ASHC, XOR, SOB.
//!
//! These share the 07xxxx opcode space; the register field names the
//! (even) register pair for the 32-bit operations.

use crate::bus::{Bus, Fault};
use crate::cpu::Cpu;
use crate::registers::WordMode;

/// Word sign bit of the low 16 bits of a wider intermediate.
const fn wsign(value: u32) -> bool {
    value & 0x8000 != 0
}

impl Cpu {
    pub(crate) fn eis<B: Bus>(&mut self, bus: &mut B, instr: u16) -> Result<bool, Fault> {
        let reg = (instr >> 6 & 7) as u8;
        let dst_mode = (instr >> 3 & 7) as u8;
        let dst_reg = (instr & 7) as u8;

        match instr >> 9 & 7 {
            0 => {
                // MUL
                let r1 = self.regs.get(reg) as i16;
                let src = self.operand(bus, dst_mode, dst_reg, WordMode::Word, true)?;
                let result = i32::from(r1) * i32::from(src.value as i16);

                self.regs.set(reg, (result >> 16) as u16);
                self.regs.set(reg | 1, result as u16);

                self.regs.set_n(result < 0);
                self.regs.set_z(result == 0);
                self.regs.set_v(false);
                self.regs.set_c(!(-32768..=32767).contains(&result));
            }
            1 => {
                // DIV
                let src = self.operand(bus, dst_mode, dst_reg, WordMode::Word, true)?;
                let divisor = src.value as i16;

                if divisor == 0 {
                    self.regs.set_n(false);
                    self.regs.set_z(true);
                    self.regs.set_v(true);
                    self.regs.set_c(true);
                    return Ok(true);
                }

                let dividend =
                    ((u32::from(self.regs.get(reg)) << 16) | u32::from(self.regs.get(reg | 1)))
                        as i32;

                let quotient = dividend.wrapping_div(i32::from(divisor));
                let remainder = dividend.wrapping_rem(i32::from(divisor));

                self.regs.set_n(quotient < 0);
                self.regs.set_z(quotient == 0);
                self.regs.set_c(false);
                // overflow still stores the truncated pair
                self.regs.set_v(!(-32768..=32767).contains(&quotient));

                self.regs.set(reg, quotient as u16);
                self.regs.set(reg | 1, remainder as u16);
            }
            2 => {
                // ASH
                let old = u32::from(self.regs.get(reg));
                let src = self.operand(bus, dst_mode, dst_reg, WordMode::Word, true)?;
                let shift = src.value & 0o77;
                let sign = wsign(old);

                let mut r = old;
                if shift == 0 {
                    self.regs.set_c(false);
                    self.regs.set_v(false);
                } else if shift <= 15 {
                    r <<= shift;
                    self.regs.set_c(r & 0x10000 != 0);
                    self.regs.set_v(wsign(old) != wsign(r));
                } else if shift < 32 {
                    self.regs.set_c(r << (shift - 16) & 1 != 0);
                    r = 0;
                    self.regs.set_v(wsign(old) != wsign(r));
                } else if shift == 32 {
                    r = if sign { 0xffff_ffff } else { 0 };
                    self.regs.set_c(sign);
                    self.regs.set_v(wsign(r) != wsign(old));
                } else {
                    // negative shift: arithmetic right, one bit at a time
                    let count = 64 - shift;
                    let sign_extend = if sign { 0x8000 } else { 0 };
                    for _ in 0..count {
                        self.regs.set_c(r & 1 != 0);
                        r >>= 1;
                        r |= sign_extend;
                    }
                    self.regs.set_v(wsign(r) != wsign(old));
                }

                r &= 0xffff;
                self.regs.set_n(wsign(r));
                self.regs.set_z(r == 0);
                self.regs.set(reg, r as u16);
            }
            3 => {
                // ASHC
                let mut r =
                    (u32::from(self.regs.get(reg)) << 16) | u32::from(self.regs.get(reg | 1));
                let src = self.operand(bus, dst_mode, dst_reg, WordMode::Word, true)?;
                let shift = src.value & 0o77;
                let sign = r & 0x8000_0000 != 0;

                if shift == 0 {
                    self.regs.set_c(false);
                } else if shift < 32 {
                    r <<= shift - 1;
                    self.regs.set_c(r & 0x8000_0000 != 0);
                    r <<= 1;
                } else if shift == 32 {
                    r = if sign { 0xffff_ffff } else { 0 };
                    self.regs.set_c(sign);
                } else {
                    // negative shift with sign extension through 64 bits
                    let count = (64 - shift) - 1;
                    if sign {
                        r = ((u64::from(r) | 0xffff_ffff_0000_0000) >> count) as u32;
                        self.regs.set_c(r & 1 != 0);
                        r = ((u64::from(r) | 0xffff_ffff_0000_0000) >> 1) as u32;
                    } else {
                        r >>= count;
                        self.regs.set_c(r & 1 != 0);
                        r >>= 1;
                    }
                }

                let new_sign = r & 0x8000_0000 != 0;
                self.regs.set_v(sign != new_sign);

                self.regs.set(reg, (r >> 16) as u16);
                self.regs.set(reg | 1, r as u16);

                self.regs.set_n(new_sign);
                self.regs.set_z(r == 0);
            }
            4 => {
                // XOR (word only)
                let reg_value = self.regs.get(reg); // before the operand touches R7
                let dst = self.operand(bus, dst_mode, dst_reg, WordMode::Word, true)?;

                let result = dst.value ^ reg_value;
                if self.put_operand(bus, &dst, result)? {
                    self.regs.set_flags_nzv(result, WordMode::Word);
                }
            }
            7 => {
                // SOB
                self.regs.add(reg, -1);
                if self.regs.get(reg) != 0 {
                    let offset = (instr & 0o77) * 2;
                    self.regs.pc = self.regs.pc.wrapping_sub(offset);
                }
            }
            _ => return Ok(false),
        }

        Ok(true)
    }
}
