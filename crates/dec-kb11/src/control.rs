//! Control-flow and miscellaneous instructions: HALT, WAIT, RTI/RTT,
//! software traps, RESET, JMP/JSR/RTS.

use pdp_core::StopEvent;

use crate::bus::{Bus, Fault};
use crate::cpu::Cpu;
use crate::registers::WordMode;

impl Cpu {
    pub(crate) fn misc_op<B: Bus>(&mut self, bus: &mut B, instr: u16) -> Result<bool, Fault> {
        match instr {
            0o000000 => {
                // HALT
                self.raise_stop(StopEvent::Halt);
                return Ok(true);
            }
            0o000001 => {
                // WAIT: idle until a device queues an interrupt; the
                // delivery itself happens at the next instruction boundary
                self.wait_for_interrupt();
                return Ok(true);
            }
            0o000002 | 0o000006 => {
                // RTI / RTT. A non-kernel previous mode gets the
                // restricted PSW write (no T, no mode promotion).
                self.regs.pc = self.pop(bus)?;
                let psw = self.pop(bus)?;
                let limited = self.regs.prev_run_mode() != 0;
                self.regs.set_psw(psw, limited);
                return Ok(true);
            }
            0o000003 => {
                // BPT
                self.trap(bus, 0o14, None, false);
                return Ok(true);
            }
            0o000004 => {
                // IOT
                self.trap(bus, 0o20, None, false);
                return Ok(true);
            }
            0o000005 => {
                // RESET: pulse the I/O subsystem, drop pending interrupts
                bus.reset_io();
                self.clear_interrupts();
                return Ok(true);
            }
            0o000007 => {
                // MFPT is not implemented on the 11/70
                self.trap(bus, 0o10, None, false);
                return Ok(true);
            }
            _ => {}
        }

        if instr >> 8 == 0o210 {
            // EMT
            self.trap(bus, 0o30, None, false);
            return Ok(true);
        }

        if instr >> 8 == 0o211 {
            // TRAP
            self.trap(bus, 0o34, None, false);
            return Ok(true);
        }

        if instr & !0o77 == 0o000100 {
            // JMP
            let dst_mode = (instr >> 3 & 7) as u8;
            if dst_mode == 0 {
                // jumping into a register is illegal
                return Ok(false);
            }

            let dst = self.operand(bus, dst_mode, (instr & 7) as u8, WordMode::Word, false)?;
            if let Some(addr) = dst.addr {
                self.regs.pc = addr;
            }
            return Ok(true);
        }

        if instr & 0o177000 == 0o004000 {
            // JSR
            let dst_mode = (instr >> 3 & 7) as u8;
            if dst_mode == 0 {
                return Ok(false);
            }

            let dst = self.operand(bus, dst_mode, (instr & 7) as u8, WordMode::Word, false)?;
            let Some(target) = dst.addr else {
                return Ok(false);
            };

            let link = (instr >> 6 & 7) as u8;
            let link_value = self.regs.get(link);

            self.push(bus, link_value)?;
            bus.log_mmr1(-2, 6);

            self.regs.set(link, self.regs.pc);
            self.regs.pc = target;
            return Ok(true);
        }

        if instr & !7 == 0o000200 {
            // RTS
            let link = (instr & 7) as u8;
            let v = self.pop(bus)?;

            self.regs.pc = self.regs.get(link);
            self.regs.set(link, v);
            return Ok(true);
        }

        Ok(false)
    }
}
