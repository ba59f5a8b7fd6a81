//! Interrupt queueing, priority masking and WAIT.

use std::time::Duration;

use dec_kb11::{Bus as CpuBus, ModeSelect, Space, WordMode};
use machine_pdp11::{ADDR_LFC, Config, KW11_LEVEL, Pdp11};

fn machine() -> Pdp11 {
    Pdp11::new(&Config::default())
}

fn load_words(m: &mut Pdp11, base: u32, words: &[u16]) {
    for (i, &word) in words.iter().enumerate() {
        m.bus.memory_mut().write_word(base + 2 * i as u32, word);
    }
}

fn set_vector(m: &mut Pdp11, vector: u32, handler: u16, psw: u16) {
    m.bus.memory_mut().write_word(vector, handler);
    m.bus.memory_mut().write_word(vector + 2, psw);
}

#[test]
fn test_interrupt_delivered_between_instructions() {
    let mut m = machine();
    // running at IPL 4; a level-5 device interrupts through vector 100
    load_words(&mut m, 0, &[0o000240]);
    load_words(&mut m, 0o500, &[0o000240]);
    set_vector(&mut m, 0o100, 0o500, 0o240);
    m.cpu.regs.set_psw(0o200, false);
    m.cpu.regs.set(6, 0o1000);

    m.cpu.queue_interrupt(5, 0o100);
    m.step();

    // delivery happened at the boundary, then the handler's NOP ran
    assert_eq!(m.cpu.regs.pc, 0o502);
    assert_eq!(m.cpu.regs.spl(), 5, "IPL raised to the queueing level");
    assert_eq!(m.cpu.regs.prev_run_mode(), 0, "came from kernel");
    assert_eq!(m.bus.memory().read_word(0o776), 0o200, "old PSW pushed");
    assert_eq!(m.bus.memory().read_word(0o774), 0, "old PC pushed");
}

#[test]
fn test_masked_interrupt_stays_pending() {
    let mut m = machine();
    load_words(&mut m, 0, &[0o000240, 0o000240, 0o000240]);
    load_words(&mut m, 0o510, &[0o000240]);
    set_vector(&mut m, 0o60, 0o510, 0o340);
    m.cpu.regs.set_psw(0o340, false); // IPL 7 masks everything
    m.cpu.regs.set(6, 0o1000);

    m.cpu.queue_interrupt(4, 0o60);

    m.step();
    m.step();
    assert_eq!(m.cpu.regs.pc, 4, "still executing the main program");
    assert_eq!(m.cpu.interrupt_queue().pending_at(4), 1, "still queued");

    // dropping the priority releases it at the next boundary
    m.cpu.regs.set_psw(0, false);
    m.step();
    assert_eq!(m.cpu.regs.pc, 0o512);
}

#[test]
fn test_duplicate_vectors_collapse() {
    let mut m = machine();
    m.cpu.regs.set_psw(0o340, false);

    m.cpu.queue_interrupt(4, 0o60);
    m.cpu.queue_interrupt(4, 0o60);
    m.cpu.queue_interrupt(4, 0o64);

    assert_eq!(m.cpu.interrupt_queue().pending_at(4), 2);
}

#[test]
fn test_higher_level_delivered_first() {
    let mut m = machine();
    load_words(&mut m, 0o500, &[0o000240]);
    load_words(&mut m, 0o510, &[0o000240]);
    set_vector(&mut m, 0o60, 0o500, 0o200);
    set_vector(&mut m, 0o100, 0o510, 0o300);
    m.cpu.regs.set(6, 0o1000);

    m.cpu.queue_interrupt(4, 0o60);
    m.cpu.queue_interrupt(6, 0o100);

    m.step();
    assert_eq!(m.cpu.regs.pc, 0o512, "level 6 first");
    assert_eq!(m.cpu.interrupt_queue().pending_at(4), 1);
}

#[test]
fn test_wait_wakes_on_interrupt() {
    let mut m = machine();
    // WAIT ; NOP
    load_words(&mut m, 0, &[0o000001, 0o000240]);
    load_words(&mut m, 0o520, &[0o000240]);
    set_vector(&mut m, 0o200, 0o520, 0o340);
    m.cpu.regs.set(6, 0o1000);

    let queue = m.cpu.interrupt_queue();
    let poker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        queue.queue(7, 0o200);
    });

    m.step(); // WAIT blocks until the other thread queues
    m.step(); // delivery, then the handler's NOP

    assert_eq!(m.cpu.regs.pc, 0o522);
    assert!(m.cpu.wait_time() > Duration::ZERO, "time spent idle");
    poker.join().expect("poker thread");
}

#[test]
fn test_line_clock_interrupt() {
    let mut m = machine();
    load_words(&mut m, 0, &[0o000240]);
    load_words(&mut m, 0o530, &[0o000240]);
    set_vector(&mut m, 0o100, 0o530, 0o300);
    m.cpu.regs.set(6, 0o1000);

    // enable the clock interrupt through its CSR, then tick
    m.bus
        .write(
            &mut m.cpu.regs,
            ADDR_LFC,
            WordMode::Word,
            0o100,
            ModeSelect::Current,
            Space::D,
        )
        .expect("CSR write");
    m.line_clock().tick();

    assert_eq!(m.cpu.interrupt_queue().pending_at(KW11_LEVEL), 1);

    m.step();
    assert_eq!(m.cpu.regs.pc, 0o532, "clock handler entered");

    // monitor bit visible in the CSR
    let csr = m
        .bus
        .read(
            &mut m.cpu.regs,
            ADDR_LFC,
            WordMode::Word,
            ModeSelect::Current,
            false,
            Space::D,
        )
        .expect("CSR read");
    assert_ne!(csr & 0o200, 0);
}

#[test]
fn test_interrupt_psw_comes_from_vector() {
    let mut m = machine();
    load_words(&mut m, 0o540, &[0o000240]);
    // the vector PSW asks for the register set 1 bit
    set_vector(&mut m, 0o60, 0o540, 0o4000 | 0o200);
    m.cpu.regs.set(6, 0o1000);

    m.cpu.queue_interrupt(4, 0o60);
    m.step();

    assert_eq!(m.cpu.regs.register_set(), 1, "vector PSW applied");
    assert_eq!(m.cpu.regs.spl(), 4, "IPL overridden by the queue level");
}
