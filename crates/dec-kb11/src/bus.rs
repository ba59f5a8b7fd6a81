//! The bus as seen from the processor.
//!
//! The CPU issues 16-bit virtual accesses; the machine's bus translates
//! them through the MMU, routes them to RAM or the I/O page, and reports
//! failures as [`Fault`] values. A fault has already recorded its MMR0
//! status bits by the time the `Err` reaches the CPU; the CPU only picks
//! the trap vector and unwinds the instruction.
//!
//! CPU registers live on the I/O page (0177700-0177717, PSW at 0177776),
//! so every access carries a mutable borrow of the register file.

use thiserror::Error;

use crate::registers::{ModeSelect, Registers, Space, WordMode};

/// A guest-visible access failure.
///
/// All of these unwind the current instruction; they differ in the trap
/// vector taken and in the MMR0 bits the bus recorded before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    /// Word access to an odd address.
    #[error("word access to odd address {addr:#o}")]
    OddAddress { addr: u16 },

    /// Physical address beyond the installed memory, or an undecoded I/O
    /// page address.
    #[error("no device or memory at physical address {addr:#o}")]
    NonExistent { addr: u32 },

    /// MMU access-control abort (ACF 0/3/7, or a write to a read-only page).
    #[error("page access abort at virtual address {addr:#o}")]
    AccessAbort { addr: u16 },

    /// MMU memory-management trap (ACF 1/4/5) or page-length violation.
    #[error("memory management trap at virtual address {addr:#o}")]
    ManagementTrap { addr: u16 },
}

impl Fault {
    /// Trap vector for this fault.
    #[must_use]
    pub const fn vector(self) -> u16 {
        match self {
            Self::OddAddress { .. } | Self::NonExistent { .. } | Self::AccessAbort { .. } => 0o4,
            Self::ManagementTrap { .. } => 0o250,
        }
    }
}

/// Result of a bus write.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOutcome {
    /// The write landed on the PSW, so the instruction's own condition-code
    /// update must be suppressed (the store *was* the PSW).
    pub is_psw: bool,
}

/// Informational translation of one virtual address, without fault side
/// effects. Used by MFPI/MTPI to reach the previous mode's space.
#[derive(Debug, Clone, Copy)]
pub struct PhysicalAddresses {
    /// Active page field (virtual address bits 13-15).
    pub apf: u8,
    /// Physical address through the I-space page.
    pub instruction: u32,
    /// Physical address through the D-space page.
    pub data: u32,
    /// True when the I-space physical address is the PSW register.
    pub instruction_is_psw: bool,
    /// True when the D-space physical address is the PSW register.
    pub data_is_psw: bool,
}

/// Bus interface for the KB11.
pub trait Bus {
    /// Read through the MMU under the mode named by `sel`. `peek` reads
    /// skip fault generation and access-control side effects (debugger and
    /// disassembler path).
    fn read(
        &mut self,
        regs: &mut Registers,
        addr: u16,
        word_mode: WordMode,
        sel: ModeSelect,
        peek: bool,
        space: Space,
    ) -> Result<u16, Fault>;

    /// Write through the MMU under the mode named by `sel`.
    fn write(
        &mut self,
        regs: &mut Registers,
        addr: u16,
        word_mode: WordMode,
        value: u16,
        sel: ModeSelect,
        space: Space,
    ) -> Result<WriteOutcome, Fault>;

    /// Read a word at a physical address (no translation).
    fn read_physical(&mut self, addr: u32) -> Result<u16, Fault>;

    /// Write a word at a physical address (no translation).
    fn write_physical(&mut self, addr: u32, value: u16) -> Result<(), Fault>;

    /// Informational translation of `addr` under `mode`, both spaces at
    /// once, without fault reporting.
    fn physical_addresses(&self, mode: u8, addr: u16) -> PhysicalAddresses;

    /// Raise the odd-address fault machinery for a physical address if it
    /// is odd (MFPI/MTPI path).
    fn check_odd(&mut self, addr: u32, mode: u8, space: Space, is_write: bool)
    -> Result<(), Fault>;

    /// True when MMR3 enables D-space for `mode`.
    fn data_space_enabled(&self, mode: u8) -> bool;

    /// True when any of MMR0 bits 13-15 is set (fault state latched).
    fn mmr0_locked(&self) -> bool;

    /// Clear the MMR1 auto-increment log (instruction fetch, unlocked only).
    fn clear_mmr1(&mut self);

    /// Append one auto-increment/decrement to MMR1. Ignored while locked.
    fn log_mmr1(&mut self, delta: i8, reg: u8);

    /// Record the fetch PC in MMR2 (unlocked only; caller checks).
    fn set_mmr2(&mut self, addr: u16);

    /// RESET instruction: reinitialize the MMU enables and pulse every
    /// device's reset line.
    fn reset_io(&mut self);

    /// Word read under the current mode.
    fn read_word(&mut self, regs: &mut Registers, addr: u16, space: Space) -> Result<u16, Fault> {
        self.read(regs, addr, WordMode::Word, ModeSelect::Current, false, space)
    }

    /// Word write under the current mode.
    fn write_word(
        &mut self,
        regs: &mut Registers,
        addr: u16,
        value: u16,
        space: Space,
    ) -> Result<WriteOutcome, Fault> {
        self.write(regs, addr, WordMode::Word, value, ModeSelect::Current, space)
    }

    /// Non-faulting word read (disassembler, breakpoints).
    fn peek_word(&mut self, regs: &mut Registers, addr: u16) -> u16 {
        self.read(regs, addr, WordMode::Word, ModeSelect::Current, true, Space::I)
            .unwrap_or(0)
    }
}
