//! PDP-11/70 system emulation.
//!
//! Ties the KB11 processor to core memory, the KT11 MMU, the UNIBUS I/O
//! page and the standard console/clock devices. Disks, tape and extra
//! serial lines stay outside; they reach the machine through the traits
//! in `pdp-core` and the interrupt queue.

mod boot;
mod bus;
mod config;
mod device;
mod dl11;
mod kw11l;
mod memory;
mod mmu;
mod pdp11;

pub use boot::{BOOT_BASE, BootLoader};
pub use bus::Bus;
pub use config::Config;
pub use device::IoDevice;
pub use dl11::{DL11_BASE, DL11_END, DL11_LEVEL, DL11_RX_VECTOR, DL11_TX_VECTOR, Dl11};
pub use kw11l::{ADDR_LFC, KW11_LEVEL, KW11_VECTOR, Kw11L, Kw11Ticker};
pub use memory::{DEFAULT_N_PAGES, Memory, PAGE_SIZE};
pub use mmu::Mmu;
pub use pdp11::{LoadError, Pdp11};
