//! General addressing-mode operand resolution.
//!
//! Every operand specifier is (mode, register). Modes 2-5 update the
//! register as a side effect and log the delta in MMR1 so a faulting
//! instruction can be backed out by the kernel; modes 6 and 7 consume an
//! index word from the instruction stream. The increment size is 2 for
//! word operands and for R6/R7 even in byte mode.

use crate::bus::{Bus, Fault};
use crate::cpu::Cpu;
use crate::registers::{ModeSelect, Space, WordMode};

/// A resolved operand.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Operand {
    pub word_mode: WordMode,
    /// Address space the operand lives in (put path).
    pub space: Space,
    /// Register field of the specifier.
    pub reg: u8,
    /// Memory address, or `None` for register-direct (mode 0).
    pub addr: Option<u16>,
    /// Operand value; 0 unless the caller asked for a read.
    pub value: u16,
}

impl Cpu {
    /// Resolve an operand, performing the mode's register side effects and,
    /// when `read` is set, fetching its value.
    pub(crate) fn operand<B: Bus>(
        &mut self,
        bus: &mut B,
        mode: u8,
        reg: u8,
        word_mode: WordMode,
        read: bool,
    ) -> Result<Operand, Fault> {
        // the increment for (R)+ / -(R): words and the stack/PC always
        // move by 2, byte operands on R0-R5 by 1
        let step: i16 = if word_mode == WordMode::Word || reg >= 6 {
            2
        } else {
            1
        };

        // R7 references are instruction-stream; everything else uses
        // D-space when the current mode has it enabled
        let reg_space = if reg == 7 || !bus.data_space_enabled(self.regs.run_mode()) {
            Space::I
        } else {
            Space::D
        };

        let mut op = Operand {
            word_mode,
            space: reg_space,
            reg,
            addr: None,
            value: 0,
        };

        match mode {
            0 => {
                op.value = self.regs.get(reg) & word_mode.mask();
            }
            1 => {
                let addr = self.regs.get(reg);
                op.addr = Some(addr);
                if read {
                    op.value = self.read_op(bus, addr, word_mode, reg_space)?;
                }
            }
            2 => {
                let addr = self.regs.get(reg);
                op.addr = Some(addr);
                if read {
                    op.value = self.read_op(bus, addr, word_mode, reg_space)?;
                }
                self.regs.add(reg, step);
                bus.log_mmr1(step as i8, reg);
            }
            3 => {
                let ind = self.regs.get(reg);
                let addr = self.read_op(bus, ind, WordMode::Word, reg_space)?;
                self.regs.add(reg, 2);
                bus.log_mmr1(2, reg);
                op.addr = Some(addr);
                op.space = Space::D;
                if read {
                    op.value = self.read_op(bus, addr, word_mode, Space::D)?;
                }
            }
            4 => {
                self.regs.add(reg, -step);
                bus.log_mmr1(-step as i8, reg);
                op.space = Space::D;
                let addr = self.regs.get(reg);
                op.addr = Some(addr);
                if read {
                    op.value = self.read_op(bus, addr, word_mode, reg_space)?;
                }
            }
            5 => {
                self.regs.add(reg, -2);
                bus.log_mmr1(-2, reg);
                let ind = self.regs.get(reg);
                let addr = self.read_op(bus, ind, WordMode::Word, reg_space)?;
                op.addr = Some(addr);
                op.space = Space::D;
                if read {
                    op.value = self.read_op(bus, addr, word_mode, Space::D)?;
                }
            }
            6 => {
                let index = self.read_op(bus, self.regs.pc, WordMode::Word, Space::I)?;
                self.regs.add(7, 2);
                let addr = self.regs.get(reg).wrapping_add(index);
                op.addr = Some(addr);
                op.space = Space::D;
                if read {
                    op.value = self.read_op(bus, addr, word_mode, Space::D)?;
                }
            }
            _ => {
                let index = self.read_op(bus, self.regs.pc, WordMode::Word, Space::I)?;
                self.regs.add(7, 2);
                let ind = self.regs.get(reg).wrapping_add(index);
                let addr = self.read_op(bus, ind, WordMode::Word, Space::D)?;
                op.addr = Some(addr);
                op.space = Space::D;
                if read {
                    op.value = self.read_op(bus, addr, word_mode, Space::D)?;
                }
            }
        }

        Ok(op)
    }

    fn read_op<B: Bus>(
        &mut self,
        bus: &mut B,
        addr: u16,
        word_mode: WordMode,
        space: Space,
    ) -> Result<u16, Fault> {
        bus.read(&mut self.regs, addr, word_mode, ModeSelect::Current, false, space)
    }

    /// Store `value` into the operand. Registers receive the full word;
    /// memory goes through the bus. Returns whether the instruction may
    /// update the condition codes (false when the store hit the PSW).
    pub(crate) fn put_operand<B: Bus>(
        &mut self,
        bus: &mut B,
        op: &Operand,
        value: u16,
    ) -> Result<bool, Fault> {
        match op.addr {
            Some(addr) => {
                let outcome = bus.write(
                    &mut self.regs,
                    addr,
                    op.word_mode,
                    value,
                    ModeSelect::Current,
                    op.space,
                )?;
                Ok(!outcome.is_psw)
            }
            None => {
                self.regs.set(op.reg, value);
                Ok(true)
            }
        }
    }

    /// Like [`Cpu::put_operand`] but byte stores into a register keep the
    /// register's high byte.
    pub(crate) fn put_operand_low<B: Bus>(
        &mut self,
        bus: &mut B,
        op: &Operand,
        value: u16,
    ) -> Result<bool, Fault> {
        match op.addr {
            Some(_) => self.put_operand(bus, op, value),
            None => {
                self.regs.set_low_byte(op.reg, op.word_mode, value);
                Ok(true)
            }
        }
    }
}
