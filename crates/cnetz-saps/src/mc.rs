use cnetz_core::{BitBuffer, ChanNr, SlotTime};

/// The MC-UNITDATA indication: a decoded 70-bit info word (opcode + payload)
/// delivered by the telegram codec to the call-control layer.
/// Parsing into typed telegram structs happens in the receiving entity.
#[derive(Debug)]
pub struct McTelegramInd {
    pub chan_nr: ChanNr,
    /// 70-bit info word: 6-bit opcode followed by 64 payload bits
    pub sdu: BitBuffer,
    /// Number of corrected bit errors across all ten code words (0..20)
    pub bit_errors: u8,
    pub level: f64,
    pub time_offset: f64,
    pub jitter: f64,
    pub inverted: bool,
}

/// The MC-UNITDATA request: a 70-bit info word to encode and transmit.
#[derive(Debug)]
pub struct McTelegramReq {
    pub chan_nr: ChanNr,
    pub sdu: BitBuffer,
    pub slot: SlotTime,
    /// Encode for distributed in-call signaling
    pub distributed: bool,
}
