//! Instruction fetch/execute loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use pdp_core::{StopEvent, StopFlag};

use crate::bus::{Bus, Fault};
use crate::interrupts::InterruptQueue;
use crate::registers::{ModeSelect, Registers, Space, WordMode};

/// The KB11 processor.
pub struct Cpu {
    pub regs: Registers,
    interrupts: Arc<InterruptQueue>,
    stop: StopFlag,
    /// Nesting depth of the trap engine; see `trap`.
    pub(crate) trap_depth: u8,
    instruction_count: u64,
    wait_time: Duration,
}

impl Cpu {
    #[must_use]
    pub fn new(stop: StopFlag) -> Self {
        Self {
            regs: Registers::new(),
            interrupts: Arc::new(InterruptQueue::new()),
            stop,
            trap_depth: 0,
            instruction_count: 0,
            wait_time: Duration::ZERO,
        }
    }

    /// Power-up / front-panel reset: PC=0, PSW=0, all registers and stack
    /// pointers zero, interrupt queues empty. RAM is left alone.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.interrupts.clear();
        self.trap_depth = 0;
    }

    /// Handle devices use to raise interrupts from any thread.
    #[must_use]
    pub fn interrupt_queue(&self) -> Arc<InterruptQueue> {
        Arc::clone(&self.interrupts)
    }

    /// Queue an interrupt as a device would.
    pub fn queue_interrupt(&self, level: u8, vector: u8) {
        self.interrupts.queue(level, vector);
    }

    #[must_use]
    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Instructions executed since construction.
    #[must_use]
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Total time spent blocked in WAIT.
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Execute one instruction, including interrupt delivery and fault
    /// handling at the instruction boundary.
    pub fn step<B: Bus>(&mut self, bus: &mut B) {
        if !bus.mmr0_locked() {
            bus.clear_mmr1();
        }

        if self.interrupts.any_pending() && self.service_interrupt(bus) {
            if !bus.mmr0_locked() {
                bus.clear_mmr1();
            }
        }

        self.instruction_count += 1;

        let pc = self.regs.pc;
        if !bus.mmr0_locked() {
            bus.set_mmr2(pc);
        }

        if let Err(fault) = self.execute_instruction(bus) {
            debug!("fault during instruction at {pc:06o}: {fault}");
            self.trap(bus, fault.vector(), None, false);
        }
    }

    fn execute_instruction<B: Bus>(&mut self, bus: &mut B) -> Result<(), Fault> {
        let pc = self.regs.pc;
        let instr = bus.read(&mut self.regs, pc, WordMode::Word, ModeSelect::Current, false, Space::I)?;
        self.regs.add(7, 2);

        if self.double_operand(bus, instr)? {
            return Ok(());
        }
        if self.conditional_branch(instr) {
            return Ok(());
        }
        if self.condition_code_op(instr) {
            return Ok(());
        }
        if self.misc_op(bus, instr)? {
            return Ok(());
        }

        warn!("unhandled instruction {instr:06o} at {pc:06o}");
        self.trap(bus, 0o10, None, false);
        Ok(())
    }

    /// Deliver one pending interrupt if its level beats the current IPL.
    fn service_interrupt<B: Bus>(&mut self, bus: &mut B) -> bool {
        let ipl = self.regs.spl();

        if let Some((level, vector)) = self.interrupts.take_above(ipl) {
            debug!("invoking interrupt vector {vector:o} (level {level}, IPL was {ipl})");
            self.trap(bus, u16::from(vector), Some(level), true);
            return true;
        }

        false
    }

    /// Push a word onto the current mode's stack, honoring the stack limit.
    pub(crate) fn push<B: Bus>(&mut self, bus: &mut B, value: u16) -> Result<(), Fault> {
        if self.regs.get(6) == self.regs.stack_limit() {
            debug!(
                "stack limit {:06o} reached pushing {:06o}",
                self.regs.stack_limit(),
                value
            );
            self.trap(bus, 0o4, Some(7), false);
            return Ok(());
        }

        let addr = self.regs.add(6, -2);
        bus.write(&mut self.regs, addr, WordMode::Word, value, ModeSelect::Current, Space::D)?;
        Ok(())
    }

    /// Pop a word from the current mode's stack.
    pub(crate) fn pop<B: Bus>(&mut self, bus: &mut B) -> Result<u16, Fault> {
        let addr = self.regs.get(6);
        let value = bus.read(&mut self.regs, addr, WordMode::Word, ModeSelect::Current, false, Space::D)?;
        self.regs.add(6, 2);
        Ok(value)
    }

    /// Block until an interrupt is queued or a stop is raised (WAIT).
    pub(crate) fn wait_for_interrupt(&mut self) {
        let started = Instant::now();
        self.interrupts.wait_any(&self.stop);
        self.wait_time += started.elapsed();
        debug!("WAIT returned");
    }

    pub(crate) fn raise_stop(&mut self, event: StopEvent) {
        self.stop.raise(event);
    }

    pub(crate) fn clear_interrupts(&mut self) {
        self.interrupts.clear();
    }
}
