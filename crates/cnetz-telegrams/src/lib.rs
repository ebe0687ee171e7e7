#![allow(dead_code)]

pub mod digits;
pub mod opcode;
pub mod pdus;
pub mod telegram;

pub use opcode::Opcode;
pub use telegram::Telegram;

/// Width of the info word: 6-bit opcode + 64 payload bits.
/// Split into 10 groups of 7 by the block coder.
pub const INFO_BITS: usize = 70;

/// Opcode width in bits
pub const OPCODE_BITS: usize = 6;

/// Payload width in bits; fixed by the protocol for every opcode
pub const PAYLOAD_BITS: usize = 64;
