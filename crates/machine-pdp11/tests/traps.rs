//! Trap and fault behavior: odd addresses, software traps, double faults.

use machine_pdp11::{Config, Pdp11};
use pdp_core::StopEvent;

fn machine() -> Pdp11 {
    let _ = env_logger::builder().is_test(true).try_init();
    Pdp11::new(&Config::default())
}

fn load_words(m: &mut Pdp11, base: u32, words: &[u16]) {
    for (i, &word) in words.iter().enumerate() {
        m.bus.memory_mut().write_word(base + 2 * i as u32, word);
    }
}

/// Point `vector` at `handler` with the given new PSW.
fn set_vector(m: &mut Pdp11, vector: u32, handler: u16, psw: u16) {
    m.bus.memory_mut().write_word(vector, handler);
    m.bus.memory_mut().write_word(vector + 2, psw);
}

#[test]
fn test_odd_address_read_traps_to_4() {
    let mut m = machine();
    // MOV #1,R0 ; MOV (R0),R1  (read from odd address 1)
    load_words(&mut m, 0, &[0o012700, 1, 0o011001]);
    set_vector(&mut m, 4, 0o500, 0);
    m.cpu.regs.set(6, 0o1000);

    m.step();
    m.step();

    assert_eq!(m.cpu.regs.pc, 0o500, "vector 4 taken");
    assert_eq!(m.cpu.regs.get(1), 0, "destination untouched");
    // old PSW then old PC on the kernel stack
    assert_eq!(m.cpu.regs.get(6), 0o774);
    assert_eq!(m.bus.memory().read_word(0o774), 6, "interrupted PC");
}

#[test]
fn test_odd_address_write_traps_to_4() {
    let mut m = machine();
    // MOV #101,R0 ; MOV R1,(R0)
    load_words(&mut m, 0, &[0o012700, 0o101, 0o010110]);
    set_vector(&mut m, 4, 0o500, 0);
    m.cpu.regs.set(6, 0o1000);

    m.step();
    m.step();

    assert_eq!(m.cpu.regs.pc, 0o500);
}

#[test]
fn test_trap_instruction_round_trip() {
    let mut m = machine();
    // TRAP 7 at 0; handler at 500 does RTI
    load_words(&mut m, 0, &[0o104407, 0o000240]);
    load_words(&mut m, 0o500, &[0o000002]);
    set_vector(&mut m, 0o34, 0o500, 0o340);
    m.cpu.regs.set(6, 0o1000);

    m.step();
    assert_eq!(m.cpu.regs.pc, 0o500);
    assert_eq!(m.cpu.regs.spl(), 7, "PSW from the vector");
    assert_eq!(m.cpu.regs.get(6), 0o774);

    m.step(); // RTI
    assert_eq!(m.cpu.regs.pc, 2, "return past the TRAP");
    assert_eq!(m.cpu.regs.psw(), 0, "PSW restored");
    assert_eq!(m.cpu.regs.get(6), 0o1000, "stack balanced");
}

#[test]
fn test_emt_bpt_iot_vectors() {
    for (instr, vector) in [(0o104000, 0o30u32), (0o000003, 0o14), (0o000004, 0o20)] {
        let mut m = machine();
        load_words(&mut m, 0, &[instr]);
        set_vector(&mut m, vector, 0o600, 0);
        m.cpu.regs.set(6, 0o1000);

        m.step();
        assert_eq!(m.cpu.regs.pc, 0o600, "vector {vector:o}");
    }
}

#[test]
fn test_illegal_instruction_traps_to_10() {
    let mut m = machine();
    load_words(&mut m, 0, &[0o000210]);
    set_vector(&mut m, 0o10, 0o700, 0);
    m.cpu.regs.set(6, 0o1000);

    m.step();
    assert_eq!(m.cpu.regs.pc, 0o700);
}

#[test]
fn test_jmp_to_register_is_illegal() {
    let mut m = machine();
    // JMP R0
    load_words(&mut m, 0, &[0o000100]);
    set_vector(&mut m, 0o10, 0o700, 0);
    m.cpu.regs.set(6, 0o1000);

    m.step();
    assert_eq!(m.cpu.regs.pc, 0o700);
}

#[test]
fn test_mfpt_traps_to_10() {
    // MFPT doesn't exist on the 11/70
    let mut m = machine();
    load_words(&mut m, 0, &[0o000007]);
    set_vector(&mut m, 0o10, 0o700, 0);
    m.cpu.regs.set(6, 0o1000);

    m.step();
    assert_eq!(m.cpu.regs.pc, 0o700);
}

#[test]
fn test_mtps_mfps_trap_to_10() {
    for instr in [0o106427u16, 0o106700] {
        let mut m = machine();
        load_words(&mut m, 0, &[instr, 0]);
        set_vector(&mut m, 0o10, 0o700, 0);
        m.cpu.regs.set(6, 0o1000);

        m.step();
        assert_eq!(m.cpu.regs.pc, 0o700, "instr {instr:06o}");
    }
}

#[test]
fn test_trap_psw_carries_previous_mode() {
    let mut m = machine();
    load_words(&mut m, 0, &[0o104400]); // TRAP 0
    set_vector(&mut m, 0o34, 0o500, 0);
    // run in user mode, user stack; trap lands on the kernel stack
    m.cpu.regs.set_psw(0o140000, false);
    m.cpu.regs.set(6, 0o4000); // user SP
    m.cpu.regs.set_stack_pointer(0, 0o1000);

    m.step();

    assert_eq!(m.cpu.regs.run_mode(), 0, "trap switches to kernel");
    assert_eq!(m.cpu.regs.prev_run_mode(), 3, "previous mode preserved");
    assert_eq!(m.cpu.regs.stack_pointer(0), 0o774, "kernel stack used");
}

#[test]
fn test_double_fault_forces_stack_4() {
    let mut m = machine();
    // TRAP with an odd kernel SP: the frame push faults, re-entry takes
    // vector 4 on the reserved stack at 4
    load_words(&mut m, 0, &[0o104400]);
    set_vector(&mut m, 0o34, 0o500, 0);
    set_vector(&mut m, 4, 0o600, 0);
    m.cpu.regs.set(6, 1);

    m.step();

    assert_eq!(m.cpu.regs.pc, 0o600);
    assert_eq!(m.cpu.regs.get(6), 0, "two words pushed from SP=4");
    assert_eq!(m.cpu.stop_flag().get(), StopEvent::None);
}

#[test]
fn test_triple_fault_halts() {
    let mut m = machine();
    // enable the MMU with every page non-resident: the fetch faults, the
    // vector reads fault, and the machine gives up
    m.bus.mmu_mut().set_mmr0(1);
    m.cpu.regs.set(6, 0o1000);

    m.step();

    assert_eq!(m.cpu.stop_flag().get(), StopEvent::Halt);
}

#[test]
fn test_halt_raises_stop_event() {
    let mut m = machine();
    load_words(&mut m, 0, &[0o000000]);

    m.step();
    assert_eq!(m.cpu.stop_flag().get(), StopEvent::Halt);

    // and the run loop reports it
    m.cpu.stop_flag().clear();
    m.cpu.regs.pc = 0;
    assert_eq!(m.run(), StopEvent::Halt);
}

#[test]
fn test_reset_instruction_reinitializes_io() {
    let mut m = machine();
    load_words(&mut m, 0, &[0o000005]);
    m.bus.mmu_mut().set_mmr3(0o20);
    m.cpu.queue_interrupt(6, 0o100);

    m.step();

    assert_eq!(m.bus.mmu().mmr3(), 0, "MMR3 cleared by RESET");
    assert!(!m.cpu.interrupt_queue().any_pending(), "queues drained");
}

#[test]
fn test_stack_limit_redirects_push() {
    let mut m = machine();
    // SP exactly at the stack limit: the trap frame push is skipped and
    // the CPU winds up in the vector 4 handler instead
    load_words(&mut m, 0, &[0o104400]); // TRAP
    set_vector(&mut m, 0o34, 0o500, 0);
    set_vector(&mut m, 4, 0o600, 0);
    m.cpu.regs.set(6, 0o377); // the reset-time stack limit

    m.step();

    assert_eq!(m.cpu.regs.pc, 0o600, "redirected to vector 4");
}
