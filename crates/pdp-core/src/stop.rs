//! Process-wide stop event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Why the execution loop should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum StopEvent {
    /// Keep running.
    #[default]
    None = 0,
    /// The guest executed HALT.
    Halt = 1,
    /// The operator asked for the debugger (^E).
    Interrupt = 2,
    /// Orderly shutdown of the emulator process.
    Terminate = 3,
}

impl StopEvent {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Halt,
            2 => Self::Interrupt,
            3 => Self::Terminate,
            _ => Self::None,
        }
    }
}

/// Shared handle to the stop event.
///
/// Cloned into every thread that may request a stop (console input pump,
/// clock thread, signal handler). The CPU polls it between instructions and
/// while blocked in WAIT.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicU8>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Later events overwrite earlier ones.
    pub fn raise(&self, event: StopEvent) {
        self.0.store(event as u8, Ordering::SeqCst);
    }

    /// Current stop request, if any.
    #[must_use]
    pub fn get(&self) -> StopEvent {
        StopEvent::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// True when any stop has been requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.get() != StopEvent::None
    }

    /// Clear the request (the debugger resumes execution).
    pub fn clear(&self) {
        self.0.store(StopEvent::None as u8, Ordering::SeqCst);
    }
}
