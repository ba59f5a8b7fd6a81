//! Block-store interface for disk backends.

use std::io;

/// Random-access block storage behind a disk controller.
///
/// Offsets are in bytes; the controller applies its own geometry (RK05:
/// 512-byte sectors, RL02: 256-byte sectors, RP06: 512 bytes × 22 sectors
/// × 19 tracks). Implementations are image files, network block devices,
/// or in-memory stores for tests.
pub trait BlockStore: Send {
    /// Read `target.len()` bytes starting at `offset`.
    fn read(&mut self, offset: u64, target: &mut [u8]) -> io::Result<()>;

    /// Write all of `data` starting at `offset`.
    fn write(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;
}
