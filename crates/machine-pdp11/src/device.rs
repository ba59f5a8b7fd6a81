//! Device registry types.
//!
//! Devices claim a range of I/O-page addresses. Register access always
//! happens on the execution thread via the bus; a device with its own
//! thread (input pump, clock) guards the state both sides touch.

use dec_kb11::WordMode;

/// A device mapped into the I/O page.
pub trait IoDevice: Send {
    /// Read a register. Byte reads pass the odd/even address through.
    fn read(&mut self, addr: u16, word_mode: WordMode) -> u16;

    /// Write a register.
    fn write(&mut self, addr: u16, word_mode: WordMode, value: u16);

    /// Bus reset pulse (RESET instruction, machine reset).
    fn reset(&mut self);
}

/// Registry entry: `[base, end)` on the I/O page.
pub(crate) struct DeviceEntry {
    pub base: u16,
    pub end: u16,
    pub device: Box<dyn IoDevice>,
}
