//! Core contracts for the PDP-11/70 emulator.
//!
//! The execution core consumes its peripherals through the traits defined
//! here: disks are block stores, tape drives are tape images, terminals are
//! byte channels. Concrete backends (image files, TCP, serial) live outside
//! the emulator.

mod block;
mod channel;
mod stop;
mod tape;

pub use block::BlockStore;
pub use channel::{ByteChannel, NullChannel};
pub use stop::{StopEvent, StopFlag};
pub use tape::TapeImage;
