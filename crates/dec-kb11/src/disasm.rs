//! Static instruction decode for trace output.
//!
//! Reads are peeks: disassembling never faults, never touches MMR state
//! and never advances the machine. Operand text follows DEC assembler
//! conventions (`#n` immediate, `@#a` absolute, `x(R)` indexed, PC-relative
//! forms for register 7) with all values in octal.

use crate::bus::Bus;
use crate::registers::Registers;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    /// Address the instruction was decoded from.
    pub address: u16,
    /// Assembler text, `???` for undecodable words.
    pub text: String,
    /// The instruction word and any index/immediate words it consumes.
    pub words: Vec<u16>,
}

struct OperandText {
    text: String,
    /// Index or immediate word consumed from the instruction stream.
    extra: Option<u16>,
}

fn register_name(reg: u16) -> String {
    match reg {
        6 => "SP".to_string(),
        7 => "PC".to_string(),
        r => format!("R{r}"),
    }
}

fn operand_text<B: Bus>(regs: &mut Registers, bus: &mut B, spec: u16, pc: u16) -> OperandText {
    let reg = spec & 7;
    let name = register_name(reg);
    let next_word = bus.peek_word(regs, pc);

    match spec >> 3 & 7 {
        0 => OperandText {
            text: name,
            extra: None,
        },
        1 => OperandText {
            text: format!("({name})"),
            extra: None,
        },
        2 if reg == 7 => OperandText {
            text: format!("#{next_word:06o}"),
            extra: Some(next_word),
        },
        2 => OperandText {
            text: format!("({name})+"),
            extra: None,
        },
        3 if reg == 7 => OperandText {
            text: format!("@#{next_word:06o}"),
            extra: Some(next_word),
        },
        3 => OperandText {
            text: format!("@({name})+"),
            extra: None,
        },
        4 => OperandText {
            text: format!("-({name})"),
            extra: None,
        },
        5 => OperandText {
            text: format!("@-({name})"),
            extra: None,
        },
        6 if reg == 7 => OperandText {
            text: format!("{:06o}", pc.wrapping_add(next_word).wrapping_add(2)),
            extra: Some(next_word),
        },
        6 => OperandText {
            text: format!("{next_word:o}({name})"),
            extra: Some(next_word),
        },
        7 if reg == 7 => OperandText {
            text: format!("@{next_word:06o}"),
            extra: Some(next_word),
        },
        _ => OperandText {
            text: format!("@{next_word:o}({name})"),
            extra: Some(next_word),
        },
    }
}

/// Decode the instruction at `addr` without disturbing the machine.
pub fn disassemble<B: Bus>(regs: &mut Registers, bus: &mut B, addr: u16) -> Disassembly {
    let instr = bus.peek_word(regs, addr);
    let mut words = vec![instr];

    let byte_mode = instr & 0o100000 != 0;
    let suffix = if byte_mode { "B" } else { "" };

    let do_opcode = instr >> 12 & 7;
    let so_opcode = instr >> 6 & 0o777;

    let push_extra = |words: &mut Vec<u16>, op: &OperandText| {
        if let Some(w) = op.extra {
            words.push(w);
        }
    };

    // single operand group (the &7 folds the byte bit away)
    if do_opcode == 0 {
        let name = match so_opcode {
            0o003 if !byte_mode => Some("SWAB"),
            0o050 => Some("CLR"),
            0o051 => Some("COM"),
            0o052 => Some("INC"),
            0o053 => Some("DEC"),
            0o054 => Some("NEG"),
            0o055 => Some("ADC"),
            0o056 => Some("SBC"),
            0o057 => Some("TST"),
            0o060 => Some("ROR"),
            0o061 => Some("ROL"),
            0o062 => Some("ASR"),
            0o063 => Some("ASL"),
            0o064 if byte_mode => Some("MTPS"),
            0o064 => Some("MARK"),
            0o065 if byte_mode => Some("MFPD"),
            0o065 => Some("MFPI"),
            0o066 if byte_mode => Some("MTPD"),
            0o066 => Some("MTPI"),
            0o067 if byte_mode => Some("MFPS"),
            0o067 => Some("SXT"),
            _ => None,
        };

        if let Some(name) = name {
            let dst = operand_text(regs, bus, instr & 0o77, addr.wrapping_add(2));
            push_extra(&mut words, &dst);

            // the mode bit is the operation selector here, not a width
            let text = match name {
                "SWAB" | "MARK" | "MTPS" | "MFPD" | "MFPI" | "MTPD" | "MTPI" | "MFPS" | "SXT" => {
                    format!("{name} {}", dst.text)
                }
                _ => format!("{name}{suffix} {}", dst.text),
            };
            return Disassembly {
                address: addr,
                text,
                words,
            };
        }
    }

    // EIS group
    if do_opcode == 7 && !byte_mode {
        let reg = register_name(instr >> 6 & 7);
        let name = match instr >> 9 & 7 {
            0 => Some("MUL"),
            1 => Some("DIV"),
            2 => Some("ASH"),
            3 => Some("ASHC"),
            4 => Some("XOR"),
            7 => None, // SOB below
            _ => None,
        };

        if let Some(name) = name {
            let dst = operand_text(regs, bus, instr & 0o77, addr.wrapping_add(2));
            push_extra(&mut words, &dst);
            return Disassembly {
                address: addr,
                text: format!("{name} {reg},{}", dst.text),
                words,
            };
        }

        if instr >> 9 & 7 == 7 {
            return Disassembly {
                address: addr,
                text: format!("SOB {reg}"),
                words,
            };
        }
    }

    // double operand group
    if (1..=6).contains(&do_opcode) {
        let name = match do_opcode {
            1 => "MOV",
            2 => "CMP",
            3 => "BIT",
            4 => "BIC",
            5 => "BIS",
            _ => {
                if byte_mode {
                    "SUB"
                } else {
                    "ADD"
                }
            }
        };
        let suffix = if byte_mode && do_opcode != 6 { "B" } else { "" };

        let src = operand_text(regs, bus, instr >> 6 & 0o77, addr.wrapping_add(2));
        push_extra(&mut words, &src);

        let dst_pc = addr.wrapping_add(2 + if src.extra.is_some() { 2 } else { 0 });
        let dst = operand_text(regs, bus, instr & 0o77, dst_pc);
        push_extra(&mut words, &dst);

        return Disassembly {
            address: addr,
            text: format!("{name}{suffix} {},{}", src.text, dst.text),
            words,
        };
    }

    // conditional branches
    let cb_name = match instr >> 8 {
        0o001 => Some("BR"),
        0o002 => Some("BNE"),
        0o003 => Some("BEQ"),
        0o004 => Some("BGE"),
        0o005 => Some("BLT"),
        0o006 => Some("BGT"),
        0o007 => Some("BLE"),
        0o200 => Some("BPL"),
        0o201 => Some("BMI"),
        0o202 => Some("BHI"),
        0o203 => Some("BLOS"),
        0o204 => Some("BVC"),
        0o205 => Some("BVS"),
        0o206 => Some("BCC"),
        0o207 => Some("BCS"),
        _ => None,
    };

    if let Some(name) = cb_name {
        let offset = instr as u8 as i8;
        let target = addr
            .wrapping_add(2)
            .wrapping_add((i16::from(offset) * 2) as u16);
        return Disassembly {
            address: addr,
            text: format!("{name} {target:06o}"),
            words,
        };
    }

    let fixed = match instr {
        0o000240 | 0o000260 => Some("NOP"),
        0o000000 => Some("HALT"),
        0o000001 => Some("WAIT"),
        0o000002 => Some("RTI"),
        0o000003 => Some("BPT"),
        0o000004 => Some("IOT"),
        0o000005 => Some("RESET"),
        0o000006 => Some("RTT"),
        0o000007 => Some("MFPT"),
        _ => None,
    };

    if let Some(name) = fixed {
        return Disassembly {
            address: addr,
            text: name.to_string(),
            words,
        };
    }

    if instr & !7 == 0o000230 {
        return Disassembly {
            address: addr,
            text: format!("SPL{}", instr & 7),
            words,
        };
    }

    if instr & !0o37 == 0o000240 {
        let mut text = if instr & 0o20 != 0 { "SE" } else { "CL" }.to_string();
        if instr & 0o10 != 0 {
            text.push('N');
        }
        if instr & 0o4 != 0 {
            text.push('Z');
        }
        if instr & 0o2 != 0 {
            text.push('V');
        }
        if instr & 0o1 != 0 {
            text.push('C');
        }
        return Disassembly {
            address: addr,
            text,
            words,
        };
    }

    if instr >> 8 == 0o210 {
        return Disassembly {
            address: addr,
            text: format!("EMT {:o}", instr & 0o377),
            words,
        };
    }

    if instr >> 8 == 0o211 {
        return Disassembly {
            address: addr,
            text: format!("TRAP {:o}", instr & 0o377),
            words,
        };
    }

    if instr & !0o77 == 0o000100 {
        let dst = operand_text(regs, bus, instr & 0o77, addr.wrapping_add(2));
        push_extra(&mut words, &dst);
        return Disassembly {
            address: addr,
            text: format!("JMP {}", dst.text),
            words,
        };
    }

    if instr & 0o177000 == 0o004000 {
        let dst = operand_text(regs, bus, instr & 0o77, addr.wrapping_add(2));
        push_extra(&mut words, &dst);
        return Disassembly {
            address: addr,
            text: format!("JSR {},{}", register_name(instr >> 6 & 7), dst.text),
            words,
        };
    }

    if instr & !7 == 0o000200 {
        return Disassembly {
            address: addr,
            text: format!("RTS {}", register_name(instr & 7)),
            words,
        };
    }

    Disassembly {
        address: addr,
        text: "???".to_string(),
        words,
    }
}
