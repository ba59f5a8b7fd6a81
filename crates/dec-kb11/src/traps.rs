//! The vectored trap engine.
//!
//! A trap reads (new PC, new PSW) from the vector pair in kernel D-space,
//! copies the old mode into the new PSW's previous-mode field, and pushes
//! the old PSW and PC onto the new mode's stack. A fault while doing any
//! of that re-enters with the saved PSW restored: depth 2 in kernel mode
//! redirects to vector 4 on the reserved stack at 4, depth 3 gives up and
//! halts the machine.

use log::debug;
use pdp_core::StopEvent;

use crate::bus::{Bus, Fault};
use crate::cpu::Cpu;
use crate::registers::{ModeSelect, Space, WordMode};

impl Cpu {
    /// Take a trap through `vector`. `new_ipl` overrides the IPL field of
    /// the vector's PSW (interrupt delivery); `is_interrupt` only affects
    /// diagnostics.
    pub fn trap<B: Bus>(&mut self, bus: &mut B, vector: u16, new_ipl: Option<u8>, is_interrupt: bool) {
        debug!("trap {vector:03o}, new IPL {new_ipl:?}, interrupt: {is_interrupt}");

        let mut vector = vector;
        let mut before_psw = 0;
        let mut before_pc = 0;

        loop {
            self.trap_depth += 1;

            let kernel_mode = self.regs.run_mode() == 0;

            if self.trap_depth >= 3 {
                // triple fault: the real machine wedges, we stop
                self.raise_stop(StopEvent::Halt);
                break;
            }

            if self.trap_depth >= 2 {
                debug!("trap depth {}", self.trap_depth);
                if kernel_mode {
                    vector = 4;
                }
                self.regs.set(6, 0o4);
            } else {
                before_psw = self.regs.psw();
                bus.log_mmr1(-2, 6);
                before_pc = self.regs.pc;
                bus.log_mmr1(-2, 6);
            }

            match self.enter_trap(bus, vector, new_ipl, before_psw, before_pc, kernel_mode) {
                Ok(()) => {
                    self.trap_depth = 0;
                    break;
                }
                Err(fault) => {
                    // fault while processing the trap: restore the PSW and
                    // re-enter one level deeper
                    debug!("fault while processing trap {vector:03o}: {fault}");
                    self.regs.set_psw(before_psw, false);
                }
            }
        }
    }

    fn enter_trap<B: Bus>(
        &mut self,
        bus: &mut B,
        vector: u16,
        new_ipl: Option<u8>,
        before_psw: u16,
        before_pc: u16,
        kernel_mode: bool,
    ) -> Result<(), Fault> {
        // the vector pair always comes from kernel space
        self.regs.force_kernel_mode();

        let new_pc =
            bus.read(&mut self.regs, vector, WordMode::Word, ModeSelect::Current, false, Space::D)?;
        self.regs.pc = new_pc;

        let mut new_psw = bus.read(
            &mut self.regs,
            vector + 2,
            WordMode::Word,
            ModeSelect::Current,
            false,
            Space::D,
        )? & 0o147777; // mask off the stale previous-mode field

        if let Some(ipl) = new_ipl {
            new_psw = (new_psw & !0o340) | (u16::from(ipl) << 5);
        }
        new_psw |= (before_psw >> 2) & 0o30000; // old mode becomes previous mode
        self.regs.set_psw_raw(new_psw);

        if self.trap_depth >= 2 && kernel_mode {
            self.regs.set(6, 0o4);
        }

        self.push(bus, before_psw)?;
        self.push(bus, before_pc)?;

        Ok(())
    }
}
