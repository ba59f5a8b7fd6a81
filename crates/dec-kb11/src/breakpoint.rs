//! Composable breakpoint predicates.
//!
//! A breakpoint is a small predicate tree over the machine state,
//! evaluated before each step. Memory reads are peeks and cannot fault.

use crate::bus::Bus;
use crate::registers::Registers;

/// A predicate over CPU and memory state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Breakpoint {
    /// PC equals the given address.
    Pc(u16),
    /// Register `reg` holds `value`.
    Register { reg: u8, value: u16 },
    /// The word at virtual address `addr` holds `value`.
    Memory { addr: u16, value: u16 },
    /// All sub-predicates hold.
    And(Vec<Breakpoint>),
    /// Any sub-predicate holds.
    Or(Vec<Breakpoint>),
}

impl Breakpoint {
    /// Evaluate against the current machine state.
    pub fn matches<B: Bus>(&self, regs: &mut Registers, bus: &mut B) -> bool {
        match self {
            Self::Pc(addr) => regs.pc == *addr,
            Self::Register { reg, value } => regs.get(*reg) == *value,
            Self::Memory { addr, value } => bus.peek_word(regs, *addr) == *value,
            Self::And(parts) => parts.iter().all(|p| p.matches(regs, bus)),
            Self::Or(parts) => parts.iter().any(|p| p.matches(regs, bus)),
        }
    }
}
