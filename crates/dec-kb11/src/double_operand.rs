//! Double-operand instructions: MOV, CMP, BIT, BIC, BIS, ADD, SUB.
//!
//! The source operand is resolved completely (register updates and MMR1
//! logging included) before the destination; a fault in either unwinds the
//! whole instruction. Condition codes are updated together with the store
//! and suppressed when the store itself lands on the PSW.

use crate::bus::{Bus, Fault};
use crate::cpu::Cpu;
use crate::registers::WordMode;

impl Cpu {
    /// Dispatch on the top opcode bits. Returns `Ok(false)` when the word
    /// is not a double-operand instruction.
    pub(crate) fn double_operand<B: Bus>(&mut self, bus: &mut B, instr: u16) -> Result<bool, Fault> {
        let operation = instr >> 12 & 7;

        if operation == 0 {
            return self.single_operand(bus, instr);
        }

        let word_mode = if instr & 0o100000 != 0 {
            WordMode::Byte
        } else {
            WordMode::Word
        };

        if operation == 7 {
            if word_mode == WordMode::Byte {
                return Ok(false);
            }
            return self.eis(bus, instr);
        }

        let src_mode = (instr >> 9 & 7) as u8;
        let src_reg = (instr >> 6 & 7) as u8;
        let dst_mode = (instr >> 3 & 7) as u8;
        let dst_reg = (instr & 7) as u8;

        match operation {
            1 => {
                // MOV/MOVB
                let src = self.operand(bus, src_mode, src_reg, word_mode, true)?;

                let set_flags = if word_mode == WordMode::Byte && dst_mode == 0 {
                    // byte moves into a register sign-extend
                    let extended = i16::from(src.value as u8 as i8) as u16;
                    self.regs.set(dst_reg, extended);
                    true
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, false)?;
                    self.put_operand(bus, &dst, src.value)?
                };

                if set_flags {
                    self.regs.set_flags_nzv(src.value, word_mode);
                }
            }
            2 => {
                // CMP/CMPB: src - dst, nothing stored
                let src = self.operand(bus, src_mode, src_reg, word_mode, true)?;
                let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;

                let result = src.value.wrapping_sub(dst.value) & word_mode.mask();

                self.regs.set_n(word_mode.sign(result));
                self.regs.set_z(word_mode.is_zero(result));
                self.regs
                    .set_v(word_mode.sign((src.value ^ dst.value) & (!dst.value ^ result)));
                self.regs.set_c(src.value < dst.value);
            }
            3 => {
                // BIT/BITB
                let src = self.operand(bus, src_mode, src_reg, word_mode, true)?;
                let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;

                let result = dst.value & src.value & word_mode.mask();
                self.regs.set_flags_nzv(result, word_mode);
            }
            4 => {
                // BIC/BICB
                let src = self.operand(bus, src_mode, src_reg, word_mode, true)?;
                let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;

                let result = dst.value & !src.value;
                if self.put_operand_low(bus, &dst, result)? {
                    self.regs.set_flags_nzv(result, word_mode);
                }
            }
            5 => {
                // BIS/BISB
                let src = self.operand(bus, src_mode, src_reg, word_mode, true)?;
                let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;

                let result = dst.value | src.value;
                if self.put_operand_low(bus, &dst, result)? {
                    self.regs.set_n(word_mode.sign(result));
                    self.regs.set_z(result == 0);
                    self.regs.set_v(false);
                }
            }
            _ => {
                // ADD/SUB, word only; bit 15 selects SUB
                let src = self.operand(bus, src_mode, src_reg, WordMode::Word, true)?;
                let dst = self.operand(bus, dst_mode, dst_reg, WordMode::Word, true)?;

                let (result, v, c) = if instr & 0o100000 != 0 {
                    let result = dst.value.wrapping_sub(src.value);
                    (
                        result,
                        WordMode::Word.sign((dst.value ^ src.value) & (!src.value ^ result)),
                        dst.value < src.value,
                    )
                } else {
                    let result = dst.value.wrapping_add(src.value);
                    (
                        result,
                        WordMode::Word.sign((!src.value ^ dst.value) & (src.value ^ result)),
                        result < src.value,
                    )
                };

                let set_flags = self.put_operand(bus, &dst, result)?;
                if set_flags {
                    self.regs.set_n(WordMode::Word.sign(result));
                    self.regs.set_z(result == 0);
                    self.regs.set_v(v);
                    self.regs.set_c(c);
                }
            }
        }

        Ok(true)
    }
}
