//! The assembled machine.

use dec_kb11::{Breakpoint, Bus as CpuBus, Cpu, Fault, ModeSelect, Space, WordMode};
use format_lda::{LdaError, LdaImage};
use log::{debug, info};
use pdp_core::{ByteChannel, NullChannel, StopEvent, StopFlag};
use thiserror::Error;

use crate::boot::{BOOT_BASE, BootLoader};
use crate::bus::Bus;
use crate::config::Config;
use crate::dl11::{DL11_BASE, DL11_END, Dl11};
use crate::kw11l::{ADDR_LFC, ADDR_LFC_END, Kw11L, Kw11Ticker};

/// Errors loading guest software into the machine.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("bad paper tape image: {0}")]
    Lda(#[from] LdaError),

    #[error("load faulted: {0}")]
    Fault(#[from] Fault),
}

/// A PDP-11/70 with console and line clock attached.
pub struct Pdp11 {
    pub cpu: Cpu,
    pub bus: Bus,
    stop: StopFlag,
    line_clock: Kw11Ticker,
    breakpoints: Vec<Breakpoint>,
}

impl Pdp11 {
    /// Build a machine with a disconnected console.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_console(config, Box::new(NullChannel))
    }

    /// Build a machine with the given byte channel as its console.
    #[must_use]
    pub fn with_console(config: &Config, console: Box<dyn ByteChannel>) -> Self {
        let stop = StopFlag::new();
        let cpu = Cpu::new(stop.clone());
        let mut bus = Bus::new(config.n_pages);

        let clock = Kw11L::new(cpu.interrupt_queue());
        let line_clock = clock.ticker();
        bus.add_device(ADDR_LFC, ADDR_LFC_END, Box::new(clock));

        let console = Dl11::new(console, cpu.interrupt_queue());
        bus.add_device(DL11_BASE, DL11_END, Box::new(console));

        info!(
            "PDP-11/70 with {} KiB of memory",
            config.n_pages * 8192 / 1024
        );

        let mut machine = Self {
            cpu,
            bus,
            stop,
            line_clock,
            breakpoints: Vec::new(),
        };

        if let Some(boot) = config.boot {
            // the bootstrap cannot fault into fresh memory
            let _ = machine.set_boot_loader(boot);
        }

        machine
    }

    /// The shared stop event.
    #[must_use]
    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Handle for the line-frequency tick source.
    #[must_use]
    pub fn line_clock(&self) -> Kw11Ticker {
        self.line_clock.clone()
    }

    /// Spawn the 50 Hz line-clock thread; it exits when a stop is raised.
    pub fn start_line_clock(&self) -> std::thread::JoinHandle<()> {
        let ticker = self.line_clock.clone();
        let stop = self.stop.clone();
        std::thread::spawn(move || ticker.run(&stop))
    }

    /// Reset CPU, MMU and devices; memory contents survive.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.mmu_mut().reset();
        self.bus.reset_io();
    }

    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) {
        self.breakpoints.push(breakpoint);
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// One instruction.
    pub fn step(&mut self) {
        self.cpu.step(&mut self.bus);
    }

    /// Run until something raises a stop event or a breakpoint hits.
    pub fn run(&mut self) -> StopEvent {
        loop {
            let event = self.stop.get();
            if event != StopEvent::None {
                debug!("execution stopped: {event:?}");
                return event;
            }

            if !self.breakpoints.is_empty() {
                let Self {
                    cpu,
                    bus,
                    breakpoints,
                    ..
                } = self;
                if breakpoint_hit(breakpoints, cpu, bus) {
                    debug!("breakpoint at {:06o}", self.cpu.regs.pc);
                    return StopEvent::Interrupt;
                }
            }

            self.cpu.step(&mut self.bus);
        }
    }

    /// Deposit a bootstrap at 01000 and aim the PC at it.
    pub fn set_boot_loader(&mut self, which: BootLoader) -> Result<(), Fault> {
        for (index, &word) in which.code().iter().enumerate() {
            let addr = BOOT_BASE + 2 * index as u16;
            self.bus.write(
                &mut self.cpu.regs,
                addr,
                WordMode::Word,
                word,
                ModeSelect::Current,
                Space::I,
            )?;
        }

        self.cpu.regs.pc = BOOT_BASE;
        info!("bootstrap for {which:?} deposited at {BOOT_BASE:06o}");
        Ok(())
    }

    /// Load a parsed paper tape and aim the PC at its entry point.
    pub fn load_lda_image(&mut self, image: &LdaImage) -> Result<(), Fault> {
        for record in &image.records {
            let mut addr = record.address;
            for &byte in &record.data {
                self.bus.write(
                    &mut self.cpu.regs,
                    addr,
                    WordMode::Byte,
                    u16::from(byte),
                    ModeSelect::Current,
                    Space::I,
                )?;
                addr = addr.wrapping_add(1);
            }
        }

        self.cpu.regs.pc = image.start;
        info!("paper tape loaded, start {:06o}", image.start);
        Ok(())
    }

    /// Parse and load a raw paper-tape image.
    pub fn load_lda(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        let image = format_lda::parse(bytes)?;
        self.load_lda_image(&image)?;
        Ok(())
    }
}

fn breakpoint_hit(breakpoints: &[Breakpoint], cpu: &mut Cpu, bus: &mut Bus) -> bool {
    breakpoints.iter().any(|bp| bp.matches(&mut cpu.regs, bus))
}
