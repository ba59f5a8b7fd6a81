//! KW11-L line frequency clock.
//!
//! One control/status register at 0177546: bit 7 is the line-clock monitor
//! flag, bit 6 enables the interrupt. The tick itself comes from outside -
//! the host drives a [`Kw11Ticker`] from whatever periodic source it has
//! (a 50 Hz thread, a test calling `tick` directly).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dec_kb11::{InterruptQueue, WordMode};
use pdp_core::StopFlag;

use crate::device::IoDevice;

/// Line clock CSR address.
pub const ADDR_LFC: u16 = 0o177546;
/// End of the KW11-L register range (exclusive).
pub const ADDR_LFC_END: u16 = ADDR_LFC + 2;

/// Interrupt level and vector of the line clock.
pub const KW11_LEVEL: u8 = 6;
pub const KW11_VECTOR: u8 = 0o100;

const CSR_MONITOR: u16 = 1 << 7;
const CSR_INTERRUPT_ENABLE: u16 = 1 << 6;

#[derive(Debug, Default)]
struct Shared {
    csr: Mutex<u16>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, u16> {
        self.csr.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The bus-facing device.
pub struct Kw11L {
    shared: Arc<Shared>,
    interrupts: Arc<InterruptQueue>,
}

impl Kw11L {
    #[must_use]
    pub fn new(interrupts: Arc<InterruptQueue>) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            interrupts,
        }
    }

    /// A handle the host's tick source drives, from any thread.
    #[must_use]
    pub fn ticker(&self) -> Kw11Ticker {
        Kw11Ticker {
            shared: Arc::clone(&self.shared),
            interrupts: Arc::clone(&self.interrupts),
        }
    }
}

impl IoDevice for Kw11L {
    fn read(&mut self, _addr: u16, _word_mode: WordMode) -> u16 {
        *self.shared.lock()
    }

    fn write(&mut self, _addr: u16, _word_mode: WordMode, value: u16) {
        // clearing bit 7 acknowledges the tick
        *self.shared.lock() = value & (CSR_MONITOR | CSR_INTERRUPT_ENABLE);
    }

    fn reset(&mut self) {
        *self.shared.lock() = 0;
    }
}

/// Cloneable tick handle.
#[derive(Clone)]
pub struct Kw11Ticker {
    shared: Arc<Shared>,
    interrupts: Arc<InterruptQueue>,
}

impl Kw11Ticker {
    /// One line-frequency tick: raise the monitor bit and, when enabled,
    /// queue the clock interrupt.
    pub fn tick(&self) {
        let mut csr = self.shared.lock();
        *csr |= CSR_MONITOR;

        if *csr & CSR_INTERRUPT_ENABLE != 0 {
            self.interrupts.queue(KW11_LEVEL, KW11_VECTOR);
        }
    }

    /// Tick at 50 Hz until a stop is raised. Meant to run on its own
    /// thread.
    pub fn run(&self, stop: &StopFlag) {
        while !stop.is_raised() {
            std::thread::sleep(Duration::from_millis(20));
            self.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_sets_monitor_bit() {
        let interrupts = Arc::new(InterruptQueue::new());
        let mut clock = Kw11L::new(Arc::clone(&interrupts));
        let ticker = clock.ticker();

        ticker.tick();
        assert_eq!(clock.read(ADDR_LFC, WordMode::Word) & CSR_MONITOR, CSR_MONITOR);
        assert_eq!(interrupts.pending_at(KW11_LEVEL), 0);
    }

    #[test]
    fn test_tick_interrupts_when_enabled() {
        let interrupts = Arc::new(InterruptQueue::new());
        let mut clock = Kw11L::new(Arc::clone(&interrupts));
        let ticker = clock.ticker();

        clock.write(ADDR_LFC, WordMode::Word, CSR_INTERRUPT_ENABLE);
        ticker.tick();
        assert_eq!(interrupts.pending_at(KW11_LEVEL), 1);
    }
}
