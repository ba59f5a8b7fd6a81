//! DL11 console interface.
//!
//! Four registers at 0177560: reader status (TKS), reader buffer (TKB),
//! punch status (TPS), punch buffer (TPB). The receive side is fed by a
//! pump thread polling the attached [`ByteChannel`]; the transmit side is
//! always ready. Interrupts go to level 4, vectors 060 (RX) and 064 (TX).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use dec_kb11::{InterruptQueue, WordMode};
use log::debug;
use pdp_core::ByteChannel;

use crate::device::IoDevice;

pub const DL11_BASE: u16 = 0o177560;
/// End of the DL11 register range (exclusive).
pub const DL11_END: u16 = 0o177570;

const ADDR_TKS: u16 = 0o177560;
const ADDR_TKB: u16 = 0o177562;
const ADDR_TPS: u16 = 0o177564;
const ADDR_TPB: u16 = 0o177566;

pub const DL11_LEVEL: u8 = 4;
pub const DL11_RX_VECTOR: u8 = 0o60;
pub const DL11_TX_VECTOR: u8 = 0o64;

const STATUS_DONE: u16 = 1 << 7;
const STATUS_INTERRUPT_ENABLE: u16 = 1 << 6;

#[derive(Debug, Default)]
struct Inner {
    registers: [u16; 4],
    rx: VecDeque<u8>,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parity(byte: u8) -> u16 {
    u16::from(byte.count_ones() & 1 != 0)
}

/// The console device.
pub struct Dl11 {
    shared: Arc<Shared>,
    interrupts: Arc<InterruptQueue>,
    channel: Arc<Mutex<Box<dyn ByteChannel>>>,
    pump_stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl Dl11 {
    /// Create the console and start its receive pump thread.
    #[must_use]
    pub fn new(channel: Box<dyn ByteChannel>, interrupts: Arc<InterruptQueue>) -> Self {
        let shared = Arc::new(Shared::default());
        let channel = Arc::new(Mutex::new(channel));
        let pump_stop = Arc::new(AtomicBool::new(false));

        let pump = {
            let shared = Arc::clone(&shared);
            let interrupts = Arc::clone(&interrupts);
            let channel = Arc::clone(&channel);
            let pump_stop = Arc::clone(&pump_stop);

            std::thread::spawn(move || {
                debug!("DL11 receive pump starting");
                while !pump_stop.load(Ordering::SeqCst) {
                    let mut received = false;
                    {
                        let mut channel =
                            channel.lock().unwrap_or_else(PoisonError::into_inner);
                        let mut inner = shared.lock();
                        while channel.poll() {
                            if let Some(byte) = channel.recv() {
                                inner.rx.push_back(byte);
                                received = true;
                            }
                        }
                        if received {
                            inner.registers[0] |= STATUS_DONE;
                            if inner.registers[0] & STATUS_INTERRUPT_ENABLE != 0 {
                                interrupts.queue(DL11_LEVEL, DL11_RX_VECTOR);
                            }
                        }
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                debug!("DL11 receive pump terminating");
            })
        };

        Self {
            shared,
            interrupts,
            channel,
            pump_stop,
            pump: Some(pump),
        }
    }
}

impl IoDevice for Dl11 {
    fn read(&mut self, addr: u16, word_mode: WordMode) -> u16 {
        let even = addr & !1;
        let mut inner = self.shared.lock();

        let word = match even {
            ADDR_TKS => {
                let have_char = !inner.rx.is_empty();
                let mut v = inner.registers[0] & !STATUS_DONE;
                if have_char {
                    v |= STATUS_DONE;
                }
                v
            }
            ADDR_TKB => match inner.rx.pop_front() {
                Some(byte) => {
                    if !inner.rx.is_empty() {
                        // more input waiting: keep DONE up and re-request
                        inner.registers[0] |= STATUS_DONE;
                        if inner.registers[0] & STATUS_INTERRUPT_ENABLE != 0 {
                            self.interrupts.queue(DL11_LEVEL, DL11_RX_VECTOR);
                        }
                    }
                    u16::from(byte) | parity(byte) << 7
                }
                None => 0,
            },
            ADDR_TPS => inner.registers[2] | STATUS_DONE, // always ready
            _ => inner.registers[3],
        };

        match word_mode {
            WordMode::Word => word,
            WordMode::Byte if addr & 1 != 0 => word >> 8,
            WordMode::Byte => word & 0xff,
        }
    }

    fn write(&mut self, addr: u16, _word_mode: WordMode, value: u16) {
        let even = addr & !1;
        let mut inner = self.shared.lock();

        match even {
            ADDR_TKS => {
                inner.registers[0] = value & STATUS_INTERRUPT_ENABLE;
                if value & STATUS_INTERRUPT_ENABLE != 0 && !inner.rx.is_empty() {
                    self.interrupts.queue(DL11_LEVEL, DL11_RX_VECTOR);
                }
            }
            ADDR_TKB => {}
            ADDR_TPS => {
                let was_enabled = inner.registers[2] & STATUS_INTERRUPT_ENABLE != 0;
                inner.registers[2] = value & STATUS_INTERRUPT_ENABLE;
                // the transmitter is permanently ready, so enabling the
                // interrupt fires one immediately
                if !was_enabled && value & STATUS_INTERRUPT_ENABLE != 0 {
                    self.interrupts.queue(DL11_LEVEL, DL11_TX_VECTOR);
                }
            }
            _ => {
                let byte = value as u8;
                inner.registers[3] = u16::from(byte);
                drop(inner);

                self.channel
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .send(&[byte]);

                let inner = self.shared.lock();
                if inner.registers[2] & STATUS_INTERRUPT_ENABLE != 0 {
                    self.interrupts.queue(DL11_LEVEL, DL11_TX_VECTOR);
                }
            }
        }
    }

    fn reset(&mut self) {
        let mut inner = self.shared.lock();
        inner.registers = [0; 4];
        inner.rx.clear();
    }
}

impl Drop for Dl11 {
    fn drop(&mut self) {
        self.pump_stop.store(true, Ordering::SeqCst);
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A channel with canned input that records what was sent.
    struct ScriptedChannel {
        input: VecDeque<u8>,
        sent: Arc<Mutex<Vec<u8>>>,
    }

    impl ByteChannel for ScriptedChannel {
        fn poll(&mut self) -> bool {
            !self.input.is_empty()
        }

        fn recv(&mut self) -> Option<u8> {
            self.input.pop_front()
        }

        fn send(&mut self, data: &[u8]) {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(data);
        }
    }

    #[test]
    fn test_receive_sets_done_and_interrupts() {
        let interrupts = Arc::new(InterruptQueue::new());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let channel = Box::new(ScriptedChannel {
            input: VecDeque::from(vec![b'A']),
            sent: Arc::clone(&sent),
        });

        let mut dl11 = Dl11::new(channel, Arc::clone(&interrupts));
        dl11.write(ADDR_TKS, WordMode::Word, STATUS_INTERRUPT_ENABLE);

        // give the pump a few polls to latch the byte
        let mut tks = 0;
        for _ in 0..100 {
            tks = dl11.read(ADDR_TKS, WordMode::Word);
            if tks & STATUS_DONE != 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(tks & STATUS_DONE, STATUS_DONE);
        assert_eq!(interrupts.pending_at(DL11_LEVEL), 1);

        let tkb = dl11.read(ADDR_TKB, WordMode::Word);
        assert_eq!(tkb & 0x7f, u16::from(b'A'));
        assert_eq!(dl11.read(ADDR_TKS, WordMode::Word) & STATUS_DONE, 0);
    }

    #[test]
    fn test_transmit_goes_to_channel() {
        let interrupts = Arc::new(InterruptQueue::new());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let channel = Box::new(ScriptedChannel {
            input: VecDeque::new(),
            sent: Arc::clone(&sent),
        });

        let mut dl11 = Dl11::new(channel, Arc::clone(&interrupts));
        assert_eq!(
            dl11.read(ADDR_TPS, WordMode::Word) & STATUS_DONE,
            STATUS_DONE
        );

        dl11.write(ADDR_TPB, WordMode::Word, u16::from(b'X'));
        // transmit is synchronous
        assert_eq!(
            sent.lock().unwrap_or_else(PoisonError::into_inner).as_slice(),
            b"X"
        );
        assert_eq!(interrupts.pending_at(DL11_LEVEL), 0);
    }
}
