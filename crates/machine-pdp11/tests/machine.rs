//! Whole-machine behavior: boot loaders, paper tape, console output,
//! breakpoints, reset semantics.

use std::sync::{Arc, Mutex, PoisonError};

use dec_kb11::Breakpoint;
use machine_pdp11::{BOOT_BASE, BootLoader, Config, Pdp11};
use pdp_core::{ByteChannel, StopEvent};

fn load_words(m: &mut Pdp11, base: u32, words: &[u16]) {
    for (i, &word) in words.iter().enumerate() {
        m.bus.memory_mut().write_word(base + 2 * i as u32, word);
    }
}

#[test]
fn test_boot_loader_deposited_at_1000() {
    let config = Config {
        boot: Some(BootLoader::Rk05),
        ..Config::default()
    };
    let m = Pdp11::new(&config);

    assert_eq!(m.cpu.regs.pc, BOOT_BASE);
    for (i, &word) in BootLoader::Rk05.code().iter().enumerate() {
        assert_eq!(
            m.bus.memory().read_word(u32::from(BOOT_BASE) + 2 * i as u32),
            word
        );
    }
}

#[test]
fn test_rl02_and_rp06_boot_loaders() {
    for boot in [BootLoader::Rl02, BootLoader::Rp06] {
        let mut m = Pdp11::new(&Config::default());
        m.set_boot_loader(boot).expect("deposit");
        assert_eq!(m.cpu.regs.pc, BOOT_BASE);
        assert_eq!(m.bus.memory().read_word(u32::from(BOOT_BASE)), 0o012700);
    }
}

#[test]
fn test_paper_tape_load_and_run() {
    // hand-framed LDA stream: one data record carrying MOV #1,R0 ; HALT
    // at 1000, one start record for 1000
    fn record(address: u16, payload: &[u8]) -> Vec<u8> {
        let length = payload.len() as u16 + 6;
        let mut out = vec![
            0x01,
            0x00,
            length as u8,
            (length >> 8) as u8,
            address as u8,
            (address >> 8) as u8,
        ];
        out.extend_from_slice(payload);
        let sum = out[2..].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        out.push(sum.wrapping_neg());
        out
    }

    let program: [u16; 3] = [0o012700, 1, 0o000000];
    let mut payload = Vec::new();
    for word in program {
        payload.push(word as u8);
        payload.push((word >> 8) as u8);
    }

    let mut tape = record(0o1000, &payload);
    tape.extend(record(0o1000, &[])); // start address
    tape.extend(record(1, &[])); // end of tape

    let mut m = Pdp11::new(&Config::default());
    m.load_lda(&tape).expect("tape loads");
    assert_eq!(m.cpu.regs.pc, 0o1000);

    assert_eq!(m.run(), StopEvent::Halt);
    assert_eq!(m.cpu.regs.get(0), 1);
}

#[test]
fn test_bad_tape_is_rejected() {
    let mut m = Pdp11::new(&Config::default());
    let garbage = [0x01, 0x00, 0x08, 0x00, 0x00, 0x10, 0xAA, 0xBB, 0x00];
    assert!(m.load_lda(&garbage).is_err());
}

/// Console channel capturing everything the machine transmits.
struct CapturingChannel {
    sent: Arc<Mutex<Vec<u8>>>,
}

impl ByteChannel for CapturingChannel {
    fn poll(&mut self) -> bool {
        false
    }

    fn recv(&mut self) -> Option<u8> {
        None
    }

    fn send(&mut self, data: &[u8]) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
    }
}

#[test]
fn test_console_output_through_dl11() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let channel = Box::new(CapturingChannel {
        sent: Arc::clone(&sent),
    });

    let mut m = Pdp11::with_console(&Config::default(), channel);
    // MOVB #101,@#177566 ; HALT  (write 'A' to the punch buffer)
    load_words(&mut m, 0, &[0o112737, 0o101, 0o177566, 0o000000]);

    assert_eq!(m.run(), StopEvent::Halt);
    assert_eq!(
        sent.lock().unwrap_or_else(PoisonError::into_inner).as_slice(),
        b"A"
    );
}

#[test]
fn test_breakpoint_stops_run() {
    let mut m = Pdp11::new(&Config::default());
    load_words(&mut m, 0, &[0o000240, 0o000240, 0o000240, 0o000000]);
    m.add_breakpoint(Breakpoint::Pc(4));

    assert_eq!(m.run(), StopEvent::Interrupt);
    assert_eq!(m.cpu.regs.pc, 4);

    // clearing it lets the program run to its HALT
    m.clear_breakpoints();
    assert_eq!(m.run(), StopEvent::Halt);
}

#[test]
fn test_composite_breakpoint() {
    let mut m = Pdp11::new(&Config::default());
    // MOV #5,R3 ; NOP ; HALT
    load_words(&mut m, 0, &[0o012703, 5, 0o000240, 0o000000]);
    m.add_breakpoint(Breakpoint::And(vec![
        Breakpoint::Pc(4),
        Breakpoint::Register { reg: 3, value: 5 },
    ]));

    assert_eq!(m.run(), StopEvent::Interrupt);
    assert_eq!(m.cpu.regs.pc, 4);
    assert_eq!(m.cpu.regs.get(3), 5);
}

#[test]
fn test_reset_preserves_memory() {
    let mut m = Pdp11::new(&Config::default());
    load_words(&mut m, 0o2000, &[0o123456]);
    m.cpu.regs.set(0, 0o7777);
    m.cpu.regs.pc = 0o2000;
    m.bus.mmu_mut().set_mmr0(1);

    m.reset();

    assert_eq!(m.cpu.regs.get(0), 0, "registers cleared");
    assert_eq!(m.cpu.regs.pc, 0, "PC back at 0");
    assert_eq!(m.cpu.regs.psw(), 0);
    assert!(!m.bus.mmu().is_enabled(), "relocation off");
    assert_eq!(
        m.bus.memory().read_word(0o2000),
        0o123456,
        "memory survives reset"
    );
}

#[test]
fn test_system_size_register() {
    let mut m = Pdp11::new(&Config::default());
    // 31 pages of 8 KiB in 64-byte units, minus one
    let expected = (31 * 8192 / 64 - 1) as u16;

    use dec_kb11::{Bus as CpuBus, ModeSelect, Space, WordMode};
    let lo = m
        .bus
        .read(
            &mut m.cpu.regs,
            0o177760,
            WordMode::Word,
            ModeSelect::Current,
            false,
            Space::D,
        )
        .expect("read");
    assert_eq!(lo, expected);
}

#[test]
fn test_terminate_stops_run_loop() {
    let mut m = Pdp11::new(&Config::default());
    // BR .  (spin forever)
    load_words(&mut m, 0, &[0o000777]);

    let stop = m.stop_flag().clone();
    let killer = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        stop.raise(StopEvent::Terminate);
    });

    assert_eq!(m.run(), StopEvent::Terminate);
    killer.join().expect("killer thread");
}
