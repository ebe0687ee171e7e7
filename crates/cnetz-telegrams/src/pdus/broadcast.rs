use cnetz_core::{expect_opcode, BitBuffer, TelegramParseErr};

use crate::opcode::Opcode;

/// System information broadcast, transmitted on the control channel in every
/// slot that carries no addressed telegram. The mobile derives the slot
/// numbering and the cell capabilities from this.
/// Layout: opcode (6), cell_code (5), slot_nr (5), queueing (1), auth (1),
/// extended_band (1), filler (51).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSignal {
    pub cell_code: u8,
    /// Slot counter 0..31, tells the mobile where it is in the super-frame
    pub slot_nr: u8,
    /// Cell queues channel requests when no traffic channel is free
    pub queueing: bool,
    /// Cell runs challenge/response authentication on call setup
    pub auth: bool,
    /// Cell offers channels in the extended frequency range
    pub extended_band: bool,
}

impl IdleSignal {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, TelegramParseErr> {
        let opcode = buffer.read_field(6, "opcode")?;
        expect_opcode!(opcode, Opcode::IdleSignal)?;
        let cell_code = buffer.read_field(5, "cell_code")? as u8;
        let slot_nr = buffer.read_field(5, "slot_nr")? as u8;
        let queueing = buffer.read_field(1, "queueing")? != 0;
        let auth = buffer.read_field(1, "auth")? != 0;
        let extended_band = buffer.read_field(1, "extended_band")? != 0;
        Ok(Self { cell_code, slot_nr, queueing, auth, extended_band })
    }

    pub fn to_bitbuf(&self, buffer: &mut BitBuffer) {
        buffer.write_bits(Opcode::IdleSignal.into_raw(), 6);
        buffer.write_bits(self.cell_code as u64, 5);
        buffer.write_bits(self.slot_nr as u64, 5);
        buffer.write_bits(self.queueing as u64, 1);
        buffer.write_bits(self.auth as u64, 1);
        buffer.write_bits(self.extended_band as u64, 1);
        let filler = buffer.get_len_remaining();
        buffer.write_zeroes(filler);
    }
}

impl core::fmt::Display for IdleSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "IdleSignal {{ cell_code: {} slot_nr: {} queueing: {} auth: {} extended_band: {} }}",
            self.cell_code, self.slot_nr, self.queueing, self.auth, self.extended_band
        )
    }
}
