//! UNIBUS: physical address routing and the I/O page.
//!
//! Everything at or above the I/O base hits the register decoder; below it
//! is core memory. The decoder covers the CPU registers, PSW, MMU register
//! file, the miscellaneous 11/70 control registers, and a registry of
//! device handlers for the delegated ranges (console DL11, KW11-L line
//! clock). Faults record their MMR0 status here before the `Err` unwinds
//! into the CPU's trap engine.

use dec_kb11::{
    Bus as CpuBus, Fault, ModeSelect, PhysicalAddresses, Registers, Space, WordMode, WriteOutcome,
};
use log::debug;

use crate::device::{DeviceEntry, IoDevice};
use crate::memory::Memory;
use crate::mmu::{self, Mmu, update_word};

pub const ADDR_PSW: u16 = 0o177776;
pub const ADDR_STACK_LIMIT: u16 = 0o177774;
pub const ADDR_PIR: u16 = 0o177772;
pub const ADDR_MICROPROG_BREAK: u16 = 0o177770;
pub const ADDR_CPU_ERR: u16 = 0o177766;
pub const ADDR_SYSTEM_ID: u16 = 0o177764;
pub const ADDR_SYSSIZE: u16 = 0o177760;
pub const ADDR_MAINT: u16 = 0o177750;
pub const ADDR_KERNEL_R: u16 = 0o177700;
pub const ADDR_KERNEL_SP: u16 = 0o177706;
pub const ADDR_PC: u16 = 0o177707;
pub const ADDR_USER_R: u16 = 0o177710;
pub const ADDR_SV_SP: u16 = 0o177716;
pub const ADDR_USER_SP: u16 = 0o177717;
pub const ADDR_CONSW: u16 = 0o177570;
pub const ADDR_LP11_CSR: u16 = 0o177514;
pub const ADDR_KW11P: u16 = 0o172540;

/// What the access-control field says about an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrapAction {
    Proceed,
    Trap250,
    Abort4,
}

/// The UNIBUS.
pub struct Bus {
    memory: Memory,
    mmu: Mmu,
    devices: Vec<DeviceEntry>,
    console_switches: u16,
    console_leds: u16,
    microprogram_break: u16,
}

impl Bus {
    #[must_use]
    pub fn new(n_pages: u32) -> Self {
        Self {
            memory: Memory::new(n_pages),
            mmu: Mmu::new(),
            devices: Vec::new(),
            console_switches: 0,
            console_leds: 0,
            microprogram_break: 0,
        }
    }

    /// Attach a device handler for I/O-page addresses `[base, end)`.
    pub fn add_device(&mut self, base: u16, end: u16, device: Box<dyn IoDevice>) {
        self.devices.push(DeviceEntry { base, end, device });
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    #[must_use]
    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    pub fn set_console_switches(&mut self, value: u16) {
        self.console_switches = value;
    }

    #[must_use]
    pub fn console_leds(&self) -> u16 {
        self.console_leds
    }

    /// Full reset: memory, MMU and every device. Registers are the CPU's
    /// problem.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.mmu.reset();
        for entry in &mut self.devices {
            entry.device.reset();
        }
    }

    /// First physical address belonging to the I/O page.
    #[must_use]
    pub fn io_base(&self) -> u32 {
        if !self.mmu.is_enabled() {
            0o160000
        } else if self.mmu.is_22bit() {
            0o17760000
        } else {
            0o760000
        }
    }

    /// Record the faulting page in MMR0 for an odd-address trap.
    fn record_odd_fault(&mut self, addr: u16) {
        if self.mmu.is_locked() {
            return;
        }

        let mut status = self.mmu.mmr0();
        status &= !(7 << 1);
        status |= (addr >> 13) << 1;
        self.mmu.set_mmr0_fault(status);
    }

    fn trap_action(&self, mode: u8, d_space: bool, apf: u8, is_write: bool) -> (TrapAction, u16) {
        let access_control = self.mmu.access_control(mode, d_space, apf);

        let action = match access_control {
            1 if is_write => TrapAction::Abort4,
            1 | 4 => TrapAction::Trap250,
            2 if is_write => TrapAction::Abort4,
            5 if is_write => TrapAction::Trap250,
            2 | 5 | 6 => TrapAction::Proceed,
            _ => TrapAction::Abort4, // 0, 3, 7
        };

        (action, access_control)
    }

    /// Translate a virtual address. With `trap_on_failure`, access control,
    /// residency and page length are enforced and MMR0 is latched on
    /// failure; peeks pass `false` and never fault.
    fn translate(
        &mut self,
        mode: u8,
        addr: u16,
        trap_on_failure: bool,
        is_write: bool,
        space: Space,
    ) -> Result<u32, Fault> {
        if !self.mmu.is_enabled() && !(is_write && self.mmu.maintenance_check()) {
            return Ok(u32::from(addr));
        }

        let apf = (addr >> 13) as u8;
        let d_space = space == Space::D && self.mmu.data_space_enabled(mode);
        let offset = u32::from(addr & 0o17777);

        let mut physical = self.mmu.physical_offset(mode, d_space, apf) + offset;
        if !self.mmu.is_22bit() {
            physical &= 0o777777;
        }

        if !trap_on_failure {
            return Ok(physical);
        }

        let (action, access_control) = self.trap_action(mode, d_space, apf, is_write);
        if action != TrapAction::Proceed {
            if is_write {
                self.mmu.set_page_trapped(mode, d_space, apf);
            }

            if !self.mmu.is_locked() {
                let mut status = self.mmu.mmr0();
                status &= !(1 << 15 | 1 << 14 | 1 << 13 | 1 << 12 | 3 << 5 | 7 << 1 | 1 << 4);

                if is_write && access_control != 6 {
                    status |= 1 << 13; // read-only
                }
                if access_control == 0 || access_control == 4 {
                    status |= 1 << 15; // non-resident
                } else {
                    status |= 1 << 13;
                }

                status |= u16::from(mode) << 5;
                status |= u16::from(apf) << 1;
                status |= u16::from(d_space) << 4;
                self.mmu.set_mmr0_fault(status);
            }

            debug!("access control {access_control} for {addr:06o}: {action:?}");
            return Err(match action {
                TrapAction::Trap250 => Fault::ManagementTrap { addr },
                _ => Fault::AccessAbort { addr },
            });
        }

        let is_io = physical >= self.io_base();
        if physical >= self.memory.size() && !is_io {
            if !self.mmu.is_locked() {
                let mut status = self.mmu.mmr0() & 0o17777;
                status |= 1 << 15; // non-resident
                status &= !0o16;
                status |= u16::from(apf) << 1;
                status &= !(3 << 5);
                status |= u16::from(mode) << 5;
                self.mmu.set_mmr0_fault(status);
            }

            if is_write {
                self.mmu.set_page_trapped(mode, d_space, apf);
            }

            debug!("non-resident physical address {physical:08o} for {addr:06o}");
            return Err(Fault::NonExistent { addr: physical });
        }

        let length = self.mmu.pdr_length(mode, d_space, apf);
        let compare = addr >> 6 & 0x7f;
        let downward = self.mmu.pdr_downward(mode, d_space, apf);

        if (compare > length && !downward) || (compare < length && downward) {
            if !self.mmu.is_locked() {
                let mut status = self.mmu.mmr0() & 0o17777;
                status |= 1 << 14; // page length
                status &= !0o16;
                status |= u16::from(apf) << 1;
                status &= !(3 << 5);
                status |= u16::from(mode) << 5;
                status &= !(1 << 4);
                status |= u16::from(d_space) << 4;
                self.mmu.set_mmr0_fault(status);
            }

            if is_write {
                self.mmu.set_page_trapped(mode, d_space, apf);
            }

            debug!("page length fault: {compare:o} vs {length:o} (down: {downward}) at {addr:06o}");
            return Err(Fault::ManagementTrap { addr });
        }

        Ok(physical)
    }

    fn run_mode(regs: &Registers, sel: ModeSelect) -> u8 {
        match sel {
            ModeSelect::Current => regs.run_mode(),
            ModeSelect::Previous => regs.prev_run_mode(),
        }
    }

    fn device_index(&self, addr: u16) -> Option<usize> {
        self.devices
            .iter()
            .position(|entry| (entry.base..entry.end).contains(&addr))
    }

    /// I/O page read. `addr` is the 16-bit register address (0160000 up).
    fn io_read(
        &mut self,
        regs: &mut Registers,
        addr: u16,
        word_mode: WordMode,
        peek: bool,
    ) -> Result<u16, Fault> {
        let byte_mask = word_mode.mask();

        // the register window decodes before the odd-address check; the PC
        // register itself sits at an odd address
        match addr {
            a if (ADDR_KERNEL_R..ADDR_KERNEL_SP).contains(&a) => {
                return Ok(regs.get((a - ADDR_KERNEL_R) as u8) & byte_mask);
            }
            a if (ADDR_USER_R..ADDR_SV_SP).contains(&a) => {
                return Ok(regs.get((a - ADDR_USER_R) as u8) & byte_mask);
            }
            ADDR_KERNEL_SP => return Ok(regs.stack_pointer(0) & byte_mask),
            ADDR_PC => return Ok(regs.pc & byte_mask),
            ADDR_SV_SP => return Ok(regs.stack_pointer(1) & byte_mask),
            ADDR_USER_SP => return Ok(regs.stack_pointer(3) & byte_mask),
            _ => {}
        }

        if !peek && word_mode == WordMode::Word && addr & 1 != 0 {
            debug!("I/O read from odd address {addr:06o}");
            self.record_odd_fault(addr);
            return Err(Fault::OddAddress { addr });
        }

        match addr {
            ADDR_CPU_ERR => return Ok(self.mmu.cpu_err() & 0xff),
            ADDR_MAINT => return Ok(1), // power OK
            ADDR_CONSW => return Ok(self.console_switches),
            ADDR_KW11P => return Ok(128),
            ADDR_SYSTEM_ID => return Ok(0o11064),
            ADDR_LP11_CSR => return Ok(0x80),
            a if a == ADDR_PIR || a == ADDR_PIR + 1 => {
                let pir = self.mmu.pir();
                return Ok(match word_mode {
                    WordMode::Word => pir,
                    WordMode::Byte if a == ADDR_PIR => pir & 0xff,
                    WordMode::Byte => pir >> 8,
                });
            }
            a if Mmu::is_page_register(a) => return Ok(self.mmu.read_register(a, word_mode)),
            0o177740..=0o177753 => return Ok(0), // cache control and friends
            0o170200..=0o170377 => return Ok(0), // UNIBUS map
            0o172100..=0o172137 => return Ok(1), // MM11-LP parity
            _ => {}
        }

        match word_mode {
            WordMode::Byte => match addr {
                ADDR_PSW => return Ok(regs.psw() & 0xff),
                a if a == ADDR_PSW + 1 => return Ok(regs.psw() >> 8),
                ADDR_STACK_LIMIT => return Ok(regs.stack_limit() & 0xff),
                a if a == ADDR_STACK_LIMIT + 1 => return Ok(regs.stack_limit() >> 8),
                ADDR_MICROPROG_BREAK => return Ok(self.microprogram_break & 0xff),
                a if a == ADDR_MICROPROG_BREAK + 1 => return Ok(self.microprogram_break >> 8),
                mmu::ADDR_MMR0 => return Ok(self.mmu.mmr0() & 0xff),
                a if a == mmu::ADDR_MMR0 + 1 => return Ok(self.mmu.mmr0() >> 8),
                _ => {}
            },
            WordMode::Word => match addr {
                mmu::ADDR_MMR0 => return Ok(self.mmu.mmr0()),
                mmu::ADDR_MMR1 => return Ok(self.mmu.mmr1()),
                mmu::ADDR_MMR2 => return Ok(self.mmu.mmr2()),
                mmu::ADDR_MMR3 => return Ok(self.mmu.mmr3()),
                ADDR_PSW => return Ok(regs.psw()),
                ADDR_STACK_LIMIT => return Ok(regs.stack_limit()),
                ADDR_MICROPROG_BREAK => return Ok(self.microprogram_break),
                _ => {}
            },
        }

        if !peek && let Some(index) = self.device_index(addr) {
            return Ok(self.devices[index].device.read(addr, word_mode));
        }

        // LO size register field must be all ones, so subtract one
        let system_size = self.memory.size() / 64 - 1;
        if addr == ADDR_SYSSIZE {
            return Ok(system_size as u16);
        }
        if addr == ADDR_SYSSIZE + 2 {
            return Ok((system_size >> 16) as u16);
        }

        if peek {
            return Ok(0o177777);
        }

        debug!("unhandled I/O read from {addr:06o}");
        Err(Fault::NonExistent {
            addr: u32::from(addr),
        })
    }

    /// I/O page write.
    fn io_write(
        &mut self,
        regs: &mut Registers,
        addr: u16,
        word_mode: WordMode,
        value: u16,
    ) -> Result<WriteOutcome, Fault> {
        match word_mode {
            WordMode::Byte => match addr {
                a if a == ADDR_PSW || a == ADDR_PSW + 1 => {
                    let mut psw = update_word(regs.psw(), a & 1 != 0, value);
                    psw &= !0o20; // the T bit cannot be set through memory
                    regs.set_psw(psw, false);
                    return Ok(WriteOutcome { is_psw: true });
                }
                a if a == ADDR_STACK_LIMIT || a == ADDR_STACK_LIMIT + 1 => {
                    let v = update_word(regs.stack_limit(), a & 1 != 0, value) | 0o377;
                    regs.set_stack_limit(v);
                    return Ok(WriteOutcome::default());
                }
                a if a == ADDR_MICROPROG_BREAK || a == ADDR_MICROPROG_BREAK + 1 => {
                    self.microprogram_break =
                        update_word(self.microprogram_break, a & 1 != 0, value);
                    return Ok(WriteOutcome::default());
                }
                a if a == mmu::ADDR_MMR0 || a == mmu::ADDR_MMR0 + 1 => {
                    let v = update_word(self.mmu.mmr0(), a & 1 != 0, value);
                    self.mmu.set_mmr0(v);
                    return Ok(WriteOutcome::default());
                }
                _ => {}
            },
            WordMode::Word => match addr {
                ADDR_PSW => {
                    regs.set_psw(value & !0o20, false);
                    return Ok(WriteOutcome { is_psw: true });
                }
                ADDR_STACK_LIMIT => {
                    regs.set_stack_limit(value & 0xff00);
                    return Ok(WriteOutcome::default());
                }
                a if (ADDR_KERNEL_R..ADDR_KERNEL_SP).contains(&a) => {
                    regs.set((a - ADDR_KERNEL_R) as u8, value);
                    return Ok(WriteOutcome::default());
                }
                a if (ADDR_USER_R..ADDR_SV_SP).contains(&a) => {
                    regs.set((a - ADDR_USER_R) as u8, value);
                    return Ok(WriteOutcome::default());
                }
                ADDR_KERNEL_SP => {
                    regs.set_stack_pointer(0, value);
                    return Ok(WriteOutcome::default());
                }
                ADDR_PC => {
                    regs.pc = value;
                    return Ok(WriteOutcome::default());
                }
                ADDR_SV_SP => {
                    regs.set_stack_pointer(1, value);
                    return Ok(WriteOutcome::default());
                }
                ADDR_USER_SP => {
                    regs.set_stack_pointer(3, value);
                    return Ok(WriteOutcome::default());
                }
                ADDR_MICROPROG_BREAK => {
                    self.microprogram_break = value & 0xff;
                    return Ok(WriteOutcome::default());
                }
                _ => {}
            },
        }

        match addr {
            ADDR_CPU_ERR => {
                // any write clears
                self.mmu.set_cpu_err(0);
                return Ok(WriteOutcome::default());
            }
            mmu::ADDR_MMR3 => {
                self.mmu.set_mmr3(value);
                return Ok(WriteOutcome::default());
            }
            mmu::ADDR_MMR0 => {
                self.mmu.set_mmr0(value);
                return Ok(WriteOutcome::default());
            }
            ADDR_PIR => {
                // the request level is mirrored into both 3-bit fields
                let mut v = value & 0o177000;
                let mut bits = v >> 9;
                while bits != 0 {
                    v += 0o42;
                    bits >>= 1;
                }
                self.mmu.set_pir(v);
                return Ok(WriteOutcome::default());
            }
            a if Mmu::is_page_register(a) => {
                self.mmu.write_register(a, value, word_mode);
                return Ok(WriteOutcome::default());
            }
            0o172100..=0o172137 => return Ok(WriteOutcome::default()), // MM11-LP parity
            0o177740..=0o177753 => return Ok(WriteOutcome::default()), // cache control
            0o170200..=0o170377 => return Ok(WriteOutcome::default()), // UNIBUS map
            ADDR_CONSW => {
                self.console_leds = value;
                return Ok(WriteOutcome::default());
            }
            a if a == ADDR_SYSSIZE || a == ADDR_SYSSIZE + 2 || a == ADDR_SYSTEM_ID => {
                // read-only
                return Ok(WriteOutcome::default());
            }
            _ => {}
        }

        if let Some(index) = self.device_index(addr) {
            self.devices[index].device.write(addr, word_mode, value);
            return Ok(WriteOutcome::default());
        }

        if word_mode == WordMode::Word && addr & 1 != 0 {
            debug!("I/O write to odd address {addr:06o}");
            self.record_odd_fault(addr);
            return Err(Fault::OddAddress { addr });
        }

        debug!("unhandled I/O write of {value:06o} to {addr:06o}");
        Err(Fault::NonExistent {
            addr: u32::from(addr),
        })
    }
}

impl CpuBus for Bus {
    fn read(
        &mut self,
        regs: &mut Registers,
        addr: u16,
        word_mode: WordMode,
        sel: ModeSelect,
        peek: bool,
        space: Space,
    ) -> Result<u16, Fault> {
        let mode = Self::run_mode(regs, sel);
        let physical = self.translate(mode, addr, !peek, false, space)?;

        let io_base = self.io_base();
        if physical >= io_base {
            let io_addr = (physical - io_base + 0o160000) as u16;
            return self.io_read(regs, io_addr, word_mode, peek);
        }

        if !peek && word_mode == WordMode::Word && addr & 1 != 0 {
            debug!("read from odd address {addr:06o}");
            self.record_odd_fault(addr);
            return Err(Fault::OddAddress { addr });
        }

        if physical >= self.memory.size() {
            if peek {
                return Ok(0);
            }
            debug!("read from {addr:06o}: no memory at {physical:08o}");
            return Err(Fault::NonExistent { addr: physical });
        }

        Ok(match word_mode {
            WordMode::Byte => u16::from(self.memory.read_byte(physical)),
            WordMode::Word => self.memory.read_word(physical),
        })
    }

    fn write(
        &mut self,
        regs: &mut Registers,
        addr: u16,
        word_mode: WordMode,
        value: u16,
        sel: ModeSelect,
        space: Space,
    ) -> Result<WriteOutcome, Fault> {
        let mode = Self::run_mode(regs, sel);

        let apf = (addr >> 13) as u8;
        let d_space = space == Space::D && self.mmu.data_space_enabled(mode);
        if self.mmu.is_enabled() && addr & 1 == 0 && addr != mmu::ADDR_MMR0 {
            self.mmu.set_page_written(mode, d_space, apf);
        }

        let physical = self.translate(mode, addr, true, true, space)?;

        let io_base = self.io_base();
        if physical >= io_base {
            let io_addr = (physical - io_base + 0o160000) as u16;
            return self.io_write(regs, io_addr, word_mode, value);
        }

        if word_mode == WordMode::Word && addr & 1 != 0 {
            debug!("write to odd address {addr:06o}");
            self.record_odd_fault(addr);
            return Err(Fault::OddAddress { addr });
        }

        if physical >= self.memory.size() {
            debug!("write to {addr:06o}: no memory at {physical:08o}");
            return Err(Fault::NonExistent { addr: physical });
        }

        match word_mode {
            WordMode::Byte => self.memory.write_byte(physical, value as u8),
            WordMode::Word => self.memory.write_word(physical, value),
        }

        Ok(WriteOutcome::default())
    }

    fn read_physical(&mut self, addr: u32) -> Result<u16, Fault> {
        if addr >= self.memory.size() {
            return Err(Fault::NonExistent { addr });
        }
        Ok(self.memory.read_word(addr))
    }

    fn write_physical(&mut self, addr: u32, value: u16) -> Result<(), Fault> {
        if addr >= self.memory.size() {
            return Err(Fault::NonExistent { addr });
        }
        self.memory.write_word(addr, value);
        Ok(())
    }

    fn physical_addresses(&self, mode: u8, addr: u16) -> PhysicalAddresses {
        let apf = (addr >> 13) as u8;

        if !self.mmu.is_enabled() {
            let is_psw = addr == ADDR_PSW;
            return PhysicalAddresses {
                apf,
                instruction: u32::from(addr),
                data: u32::from(addr),
                instruction_is_psw: is_psw,
                data_is_psw: is_psw,
            };
        }

        let offset = u32::from(addr & 0o17777);
        let mut instruction = self.mmu.physical_offset(mode, false, apf) + offset;
        let mut data = self.mmu.physical_offset(mode, true, apf) + offset;

        if !self.mmu.is_22bit() {
            instruction &= 0o777777;
            data &= 0o777777;
        }

        if !self.mmu.data_space_enabled(mode) {
            data = instruction;
        }

        let io_base = self.io_base();
        let is_psw =
            |physical: u32| physical >= io_base && physical - io_base == u32::from(ADDR_PSW - 0o160000);

        PhysicalAddresses {
            apf,
            instruction,
            data,
            instruction_is_psw: is_psw(instruction),
            data_is_psw: is_psw(data),
        }
    }

    fn check_odd(
        &mut self,
        addr: u32,
        mode: u8,
        space: Space,
        is_write: bool,
    ) -> Result<(), Fault> {
        if addr & 1 != 0 {
            if is_write {
                self.mmu
                    .set_page_trapped(mode, space == Space::D, (addr >> 13 & 7) as u8);
            }
            self.record_odd_fault(addr as u16);
            return Err(Fault::OddAddress { addr: addr as u16 });
        }
        Ok(())
    }

    fn data_space_enabled(&self, mode: u8) -> bool {
        self.mmu.data_space_enabled(mode)
    }

    fn mmr0_locked(&self) -> bool {
        self.mmu.is_locked()
    }

    fn clear_mmr1(&mut self) {
        self.mmu.clear_mmr1();
    }

    fn log_mmr1(&mut self, delta: i8, reg: u8) {
        self.mmu.add_mmr1(delta, reg);
    }

    fn set_mmr2(&mut self, addr: u16) {
        self.mmu.set_mmr2(addr);
    }

    fn reset_io(&mut self) {
        self.mmu.set_mmr0(0);
        self.mmu.set_mmr3(0);
        for entry in &mut self.devices {
            entry.device.reset();
        }
    }
}
