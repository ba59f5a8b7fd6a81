//! Single-operand instructions.
//!
//! Byte variants on a register destination only touch the low byte (except
//! where noted); memory destinations go read-modify-write through the bus.
//! MFPI/MTPI and their D-space twins move words between the current stack
//! and the previous mode's address space.

use crate::bus::{Bus, Fault};
use crate::cpu::Cpu;
use crate::registers::{ModeSelect, Space, WordMode};

/// PSW address on the I/O page; a destination landing there suppresses the
/// instruction's own condition-code update.
const ADDR_PSW: u16 = 0o177776;

impl Cpu {
    pub(crate) fn single_operand<B: Bus>(&mut self, bus: &mut B, instr: u16) -> Result<bool, Fault> {
        let opcode = instr >> 6 & 0o777;
        let dst_mode = (instr >> 3 & 7) as u8;
        let dst_reg = (instr & 7) as u8;
        let word_mode = if instr & 0o100000 != 0 {
            WordMode::Byte
        } else {
            WordMode::Word
        };

        match opcode {
            0o003 => {
                // SWAB (the byte form is a branch, handled elsewhere)
                if word_mode == WordMode::Byte {
                    return Ok(false);
                }

                let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                let v = dst.value.rotate_right(8);

                if self.put_operand_low(bus, &dst, v)? {
                    self.regs.set_flags_nzv(v, WordMode::Byte);
                    self.regs.set_c(false);
                }
            }
            0o050 => {
                // CLR/CLRB
                let set_flags = if word_mode == WordMode::Byte && dst_mode == 0 {
                    let v = self.regs.get(dst_reg) & 0xff00;
                    self.regs.set(dst_reg, v);
                    true
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, false)?;
                    self.put_operand(bus, &dst, 0)?
                };

                if set_flags {
                    self.regs.set_n(false);
                    self.regs.set_z(true);
                    self.regs.set_v(false);
                    self.regs.set_c(false);
                }
            }
            0o051 => {
                // COM/COMB
                let (v, set_flags) = if word_mode == WordMode::Byte && dst_mode == 0 {
                    let v = self.regs.get(dst_reg) ^ 0xff;
                    self.regs.set(dst_reg, v);
                    (v, true)
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let v = dst.value ^ word_mode.mask();
                    let set_flags = self.put_operand(bus, &dst, v)?;
                    (v, set_flags)
                };

                if set_flags {
                    self.regs.set_flags_nzv(v, word_mode);
                    self.regs.set_c(true);
                }
            }
            0o052 => {
                // INC/INCB
                if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let high = if word_mode == WordMode::Byte {
                        old & 0xff00
                    } else {
                        0
                    };
                    let v = (old.wrapping_add(1) & word_mode.mask()) | high;

                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(word_mode.is_zero(v));
                    self.regs.set_v(v & word_mode.mask() == overflow_value(word_mode));
                    self.regs.set(dst_reg, v);
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let v = dst.value.wrapping_add(1) & word_mode.mask();

                    let set_flags = self.put_operand(bus, &dst, v)?;
                    if set_flags {
                        self.regs.set_n(word_mode.sign(v));
                        self.regs.set_z(word_mode.is_zero(v));
                        self.regs.set_v(v == overflow_value(word_mode));
                    }
                }
            }
            0o053 => {
                // DEC/DECB
                if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let high = if word_mode == WordMode::Byte {
                        old & 0xff00
                    } else {
                        0
                    };
                    let v = (old.wrapping_sub(1) & word_mode.mask()) | high;

                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(word_mode.is_zero(v));
                    self.regs
                        .set_v(v & word_mode.mask() == overflow_value(word_mode).wrapping_sub(1));
                    self.regs.set(dst_reg, v);
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let v = dst.value.wrapping_sub(1) & word_mode.mask();

                    let set_flags = self.put_operand(bus, &dst, v)?;
                    if set_flags {
                        self.regs.set_n(word_mode.sign(v));
                        self.regs.set_z(word_mode.is_zero(v));
                        self.regs.set_v(v == overflow_value(word_mode).wrapping_sub(1));
                    }
                }
            }
            0o054 => {
                // NEG/NEGB
                if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let high = if word_mode == WordMode::Byte {
                        old & 0xff00
                    } else {
                        0
                    };
                    let v = (old.wrapping_neg() & word_mode.mask()) | high;

                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(word_mode.is_zero(v));
                    self.regs.set_v(v & word_mode.mask() == overflow_value(word_mode));
                    self.regs.set_c(!word_mode.is_zero(v));
                    self.regs.set(dst_reg, v);
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let v = dst.value.wrapping_neg();

                    let set_flags = self.put_operand(bus, &dst, v)?;
                    if set_flags {
                        self.regs.set_n(word_mode.sign(v));
                        self.regs.set_z(word_mode.is_zero(v));
                        self.regs.set_v(v & word_mode.mask() == overflow_value(word_mode));
                        self.regs.set_c(!word_mode.is_zero(v));
                    }
                }
            }
            0o055 => {
                // ADC/ADCB
                let carry = u16::from(self.regs.c());

                if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let high = if word_mode == WordMode::Byte {
                        old & 0xff00
                    } else {
                        0
                    };
                    let v = (old.wrapping_add(carry) & word_mode.mask()) | high;

                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(word_mode.is_zero(v));
                    self.regs.set_v(
                        old & word_mode.mask() == overflow_value(word_mode).wrapping_sub(1)
                            && carry != 0,
                    );
                    self.regs
                        .set_c(old & word_mode.mask() == word_mode.mask() && carry != 0);
                    self.regs.set(dst_reg, v);
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let old = dst.value;
                    let v = old.wrapping_add(carry) & word_mode.mask();

                    let set_flags = self.put_operand(bus, &dst, v)?;
                    if set_flags {
                        self.regs.set_n(word_mode.sign(v));
                        self.regs.set_z(word_mode.is_zero(v));
                        self.regs.set_v(
                            old & word_mode.mask() == overflow_value(word_mode).wrapping_sub(1)
                                && carry != 0,
                        );
                        self.regs
                            .set_c(old & word_mode.mask() == word_mode.mask() && carry != 0);
                    }
                }
            }
            0o056 => {
                // SBC/SBCB
                let carry = u16::from(self.regs.c());

                if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let high = if word_mode == WordMode::Byte {
                        old & 0xff00
                    } else {
                        0
                    };
                    let v = (old.wrapping_sub(carry) & word_mode.mask()) | high;

                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(word_mode.is_zero(v));
                    self.regs
                        .set_v(old & word_mode.mask() == overflow_value(word_mode));
                    self.regs.set_c(word_mode.is_zero(old) && carry != 0);
                    self.regs.set(dst_reg, v);
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let old = dst.value;
                    let v = old.wrapping_sub(carry) & word_mode.mask();

                    let set_flags = self.put_operand(bus, &dst, v)?;
                    if set_flags {
                        self.regs.set_n(word_mode.sign(v));
                        self.regs.set_z(word_mode.is_zero(v));
                        self.regs
                            .set_v(old & word_mode.mask() == overflow_value(word_mode));
                        self.regs.set_c(word_mode.is_zero(old) && carry != 0);
                    }
                }
            }
            0o057 => {
                // TST/TSTB
                let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                self.regs.set_flags_nzv(dst.value, word_mode);
                self.regs.set_c(false);
            }
            0o060 => {
                // ROR/RORB
                let (v, new_carry, set_flags) = if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let new_carry = old & 1 != 0;
                    let v = match word_mode {
                        WordMode::Byte => {
                            ((old & 0xff) >> 1 | u16::from(self.regs.c()) << 7) | (old & 0xff00)
                        }
                        WordMode::Word => old >> 1 | u16::from(self.regs.c()) << 15,
                    };
                    self.regs.set(dst_reg, v);
                    (v, new_carry, true)
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let old = dst.value;
                    let new_carry = old & 1 != 0;
                    let v = match word_mode {
                        WordMode::Byte => old >> 1 | u16::from(self.regs.c()) << 7,
                        WordMode::Word => old >> 1 | u16::from(self.regs.c()) << 15,
                    };
                    let set_flags = self.put_operand(bus, &dst, v)?;
                    (v, new_carry, set_flags)
                };

                if set_flags {
                    self.regs.set_c(new_carry);
                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(word_mode.is_zero(v));
                    self.regs.set_v(self.regs.c() ^ self.regs.n());
                }
            }
            0o061 => {
                // ROL/ROLB
                let (v, new_carry, set_flags) = if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let (new_carry, v) = match word_mode {
                        WordMode::Byte => (
                            old & 0x80 != 0,
                            ((old << 1 | u16::from(self.regs.c())) & 0xff) | (old & 0xff00),
                        ),
                        WordMode::Word => (old & 0x8000 != 0, old << 1 | u16::from(self.regs.c())),
                    };
                    self.regs.set(dst_reg, v);
                    (v, new_carry, true)
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let old = dst.value;
                    let (new_carry, v) = match word_mode {
                        WordMode::Byte => {
                            (old & 0x80 != 0, (old << 1 | u16::from(self.regs.c())) & 0xff)
                        }
                        WordMode::Word => (old & 0x8000 != 0, old << 1 | u16::from(self.regs.c())),
                    };
                    let set_flags = self.put_operand(bus, &dst, v)?;
                    (v, new_carry, set_flags)
                };

                if set_flags {
                    self.regs.set_c(new_carry);
                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(word_mode.is_zero(v));
                    self.regs.set_v(self.regs.c() ^ self.regs.n());
                }
            }
            0o062 => {
                // ASR/ASRB: shift right, sign bit sticks
                let (v, new_carry, set_flags) = if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let sign_bit = old & if word_mode == WordMode::Byte { 0x80 } else { 0x8000 };
                    let new_carry = old & 1 != 0;
                    let v = match word_mode {
                        WordMode::Byte => ((old & 0xff) >> 1 | (old & 0xff00)) | sign_bit,
                        WordMode::Word => old >> 1 | sign_bit,
                    };
                    self.regs.set(dst_reg, v);
                    (v, new_carry, true)
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let old = dst.value;
                    let sign_bit = old & if word_mode == WordMode::Byte { 0x80 } else { 0x8000 };
                    let new_carry = old & 1 != 0;
                    let v = match word_mode {
                        WordMode::Byte => (old & 0xff) >> 1 | sign_bit,
                        WordMode::Word => old >> 1 | sign_bit,
                    };
                    let set_flags = self.put_operand(bus, &dst, v)?;
                    (v, new_carry, set_flags)
                };

                if set_flags {
                    self.regs.set_c(new_carry);
                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(word_mode.is_zero(v));
                    self.regs.set_v(self.regs.n() ^ self.regs.c());
                }
            }
            0o063 => {
                // ASL/ASLB
                let (v, old, set_flags) = if dst_mode == 0 {
                    let old = self.regs.get(dst_reg);
                    let v = old << 1 & word_mode.mask();
                    self.regs.set(dst_reg, v);
                    (v, old, true)
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let old = dst.value;
                    let v = old << 1 & word_mode.mask();
                    let set_flags = self.put_operand(bus, &dst, v)?;
                    (v, old, set_flags)
                };

                if set_flags {
                    self.regs.set_n(word_mode.sign(v));
                    self.regs.set_z(v == 0);
                    self.regs.set_c(word_mode.sign(old));
                    self.regs.set_v(self.regs.n() ^ self.regs.c());
                }
            }
            0o064 => {
                // MARK (word) / MTPS (byte, traps on the 11/70)
                if word_mode == WordMode::Byte {
                    self.trap(bus, 0o10, None, false);
                } else {
                    let frame = self.regs.pc.wrapping_add((instr & 0o77) * 2);
                    self.regs.set(6, frame);
                    self.regs.pc = self.regs.get(5);
                    let v = self.pop(bus)?;
                    self.regs.set(5, v);
                }
            }
            0o065 => {
                // MFPI/MFPD: read in the previous mode, push on the current
                // stack; the byte bit selects D-space
                let mut set_flags = true;
                let v;

                if dst_mode == 0 {
                    v = self.regs.get_sel(dst_reg, ModeSelect::Previous);
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, WordMode::Word, false)?;
                    let addr = dst.addr.unwrap_or(0);
                    set_flags = addr != ADDR_PSW;

                    if addr >= 0o160000 {
                        v = bus.read(
                            &mut self.regs,
                            addr,
                            WordMode::Word,
                            ModeSelect::Previous,
                            false,
                            Space::I,
                        )?;
                    } else {
                        let mode = self.regs.prev_run_mode();
                        let phys = bus.physical_addresses(mode, addr);
                        let (pa, space) = if word_mode == WordMode::Byte {
                            (phys.data, Space::D)
                        } else {
                            (phys.instruction, Space::I)
                        };
                        bus.check_odd(pa, mode, space, false)?;
                        v = bus.read_physical(pa)?;
                    }
                }

                if set_flags {
                    self.regs.set_flags_nzv(v, WordMode::Word);
                }

                self.push(bus, v)?;
                bus.log_mmr1(-2, 6);
            }
            0o066 => {
                // MTPI/MTPD: pop from the current stack, write in the
                // previous mode
                let v = self.pop(bus)?;
                let mut set_flags = true;

                if dst_mode == 0 {
                    self.regs.set_sel(dst_reg, v, ModeSelect::Previous);
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, WordMode::Word, false)?;
                    let addr = dst.addr.unwrap_or(0);
                    set_flags = addr != ADDR_PSW;

                    if addr >= 0o160000 {
                        bus.write(
                            &mut self.regs,
                            addr,
                            WordMode::Word,
                            v,
                            ModeSelect::Previous,
                            Space::I,
                        )?;
                    } else {
                        let mode = self.regs.prev_run_mode();
                        let phys = bus.physical_addresses(mode, addr);
                        let (pa, space) = if word_mode == WordMode::Byte {
                            (phys.data, Space::D)
                        } else {
                            (phys.instruction, Space::I)
                        };
                        bus.check_odd(pa, mode, space, true)?;
                        bus.write_physical(pa, v)?;
                    }
                }

                if set_flags {
                    self.regs.set_flags_nzv(v, WordMode::Word);
                }

                bus.log_mmr1(2, 6);
            }
            0o067 => {
                // SXT (word) / MFPS (byte, traps on the 11/70)
                if word_mode == WordMode::Byte {
                    self.trap(bus, 0o10, None, false);
                } else {
                    let dst = self.operand(bus, dst_mode, dst_reg, word_mode, true)?;
                    let v = if self.regs.n() { 0xffff } else { 0 };

                    if self.put_operand_low(bus, &dst, v)? {
                        self.regs.set_z(!self.regs.n());
                        self.regs.set_v(false);
                    }
                }
            }
            _ => return Ok(false),
        }

        Ok(true)
    }
}

/// The value whose appearance as a result marks signed overflow (0x80 for
/// bytes, 0x8000 for words).
const fn overflow_value(word_mode: WordMode) -> u16 {
    match word_mode {
        WordMode::Byte => 0x80,
        WordMode::Word => 0x8000,
    }
}
