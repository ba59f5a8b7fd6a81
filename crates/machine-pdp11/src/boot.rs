//! Canned boot loaders.
//!
//! Each bootstrap is a handful of words deposited at 01000 that programs
//! the selected controller to pull block 0 into low memory and jumps to
//! it. The controllers themselves are external; the words only touch
//! their CSR addresses.

/// Where the bootstraps load and start.
pub const BOOT_BASE: u16 = 0o1000;

/// Which controller to boot from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootLoader {
    Rk05,
    Rl02,
    Rp06,
}

impl BootLoader {
    /// The bootstrap words, in load order.
    #[must_use]
    pub fn code(self) -> &'static [u16] {
        match self {
            Self::Rk05 => &[
                0o012700, // MOV #177406,R0       ; RKWC
                0o177406,
                0o012710, // MOV #177400,(R0)     ; -256 words
                0o177400,
                0o012740, // MOV #5,-(R0)         ; READ|GO into RKCS
                0o000005,
                0o105710, // TSTB (R0)
                0o100376, // BPL .-2
                0o005007, // CLR PC
            ],
            Self::Rl02 => &[
                0o012700, // MOV #174400,R0       ; RLCS
                0o174400,
                0o012760, // MOV #177400,6(R0)    ; word count
                0o177400,
                0o000006,
                0o012710, // MOV #14,(R0)         ; READ|GO
                0o000014,
                0o105710, // TSTB (R0)
                0o100376, // BPL .-2
                0o005007, // CLR PC
            ],
            Self::Rp06 => &[
                0o012700, // MOV #176704,R0       ; RP CS2 area
                0o176704,
                0o012740, // MOV #177000,-(R0)    ; word count
                0o177000,
                0o012740, // MOV #71,-(R0)        ; READ|GO
                0o000071,
                0o000000, // HALT
            ],
        }
    }
}
