//! Conditional branches and condition-code operations.

use crate::cpu::Cpu;

impl Cpu {
    /// Branch instructions: 8-bit signed word displacement from the
    /// incremented PC. Returns false when the word is not a branch.
    pub(crate) fn conditional_branch(&mut self, instr: u16) -> bool {
        let opcode = instr >> 8;
        let offset = instr as u8 as i8;

        let take = match opcode {
            0o001 => true,                                      // BR
            0o002 => !self.regs.z(),                            // BNE
            0o003 => self.regs.z(),                             // BEQ
            0o004 => self.regs.n() == self.regs.v(),            // BGE
            0o005 => self.regs.n() != self.regs.v(),            // BLT
            0o006 => self.regs.n() == self.regs.v() && !self.regs.z(), // BGT
            0o007 => self.regs.n() != self.regs.v() || self.regs.z(),  // BLE
            0o200 => !self.regs.n(),                            // BPL
            0o201 => self.regs.n(),                             // BMI
            0o202 => !self.regs.c() && !self.regs.z(),          // BHI
            0o203 => self.regs.c() || self.regs.z(),            // BLOS
            0o204 => !self.regs.v(),                            // BVC
            0o205 => self.regs.v(),                             // BVS
            0o206 => !self.regs.c(),                            // BCC
            0o207 => self.regs.c(),                             // BCS
            _ => return false,
        };

        if take {
            self.regs.pc = self.regs.pc.wrapping_add((i16::from(offset) * 2) as u16);
        }

        true
    }

    /// SPL, NOP and the set/clear condition-code group.
    pub(crate) fn condition_code_op(&mut self, instr: u16) -> bool {
        // both encodings of NOP (clear none / set none)
        if instr == 0o000240 || instr == 0o000260 {
            return true;
        }

        if instr & !7 == 0o000230 {
            // SPL; no trap on the 11/70
            self.regs.set_spl((instr & 7) as u8);
            return true;
        }

        if instr & !0o37 == 0o000240 {
            let state = instr & 0o20 != 0;

            if instr & 0o10 != 0 {
                self.regs.set_n(state);
            }
            if instr & 0o4 != 0 {
                self.regs.set_z(state);
            }
            if instr & 0o2 != 0 {
                self.regs.set_v(state);
            }
            if instr & 0o1 != 0 {
                self.regs.set_c(state);
            }

            return true;
        }

        false
    }
}
