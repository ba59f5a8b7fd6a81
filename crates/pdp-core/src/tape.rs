//! Sequential tape-image interface for the TM11.

use std::io;

/// A sequential tape image.
///
/// The TM11 controller issues record-oriented transfers; the image decides
/// how records are framed on the backing store.
pub trait TapeImage: Send {
    /// Read up to `target.len()` bytes from the current position. Returns
    /// the number of bytes read; 0 means end of tape.
    fn read(&mut self, target: &mut [u8]) -> io::Result<usize>;

    /// Append `data` at the current position.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Skip forward (positive) or backward (negative) by whole records of
    /// `record_len` bytes.
    fn seek_records(&mut self, records: i32, record_len: u32) -> io::Result<()>;

    /// Rewind to the beginning of the tape.
    fn rewind(&mut self) -> io::Result<()>;
}
