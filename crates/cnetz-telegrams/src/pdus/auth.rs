use cnetz_core::{expect_opcode, BitBuffer, Futln, TelegramParseErr};

use crate::opcode::Opcode;

/// Authentication challenge, sent on the traffic channel after seizure when
/// the cell runs authentication. The subscriber card computes the response
/// from the challenge and its secret; the base only compares.
/// Layout: opcode (6), futln (24), challenge (40). No filler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthChallenge {
    pub futln: Futln,
    /// 40-bit random value
    pub challenge: u64,
}

impl AuthChallenge {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, TelegramParseErr> {
        let opcode = buffer.read_field(6, "opcode")?;
        expect_opcode!(opcode, Opcode::AuthChallenge)?;
        let futln = Futln::from_bits(buffer.read_field(24, "futln")?);
        let challenge = buffer.read_field(40, "challenge")?;
        Ok(Self { futln, challenge })
    }

    pub fn to_bitbuf(&self, buffer: &mut BitBuffer) {
        buffer.write_bits(Opcode::AuthChallenge.into_raw(), 6);
        buffer.write_bits(self.futln.to_bits(), 24);
        buffer.write_bits(self.challenge & 0xFF_FFFF_FFFF, 40);
    }
}

impl core::fmt::Display for AuthChallenge {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "AuthChallenge {{ futln: {} challenge: {:010X} }}", self.futln, self.challenge)
    }
}

/// Response to AuthChallenge.
/// Layout: opcode (6), futln (24), response (16), filler (24).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthResponse {
    pub futln: Futln,
    pub response: u16,
}

impl AuthResponse {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, TelegramParseErr> {
        let opcode = buffer.read_field(6, "opcode")?;
        expect_opcode!(opcode, Opcode::AuthResponse)?;
        let futln = Futln::from_bits(buffer.read_field(24, "futln")?);
        let response = buffer.read_field(16, "response")? as u16;
        Ok(Self { futln, response })
    }

    pub fn to_bitbuf(&self, buffer: &mut BitBuffer) {
        buffer.write_bits(Opcode::AuthResponse.into_raw(), 6);
        buffer.write_bits(self.futln.to_bits(), 24);
        buffer.write_bits(self.response as u64, 16);
        let filler = buffer.get_len_remaining();
        buffer.write_zeroes(filler);
    }
}

impl core::fmt::Display for AuthResponse {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "AuthResponse {{ futln: {} response: {:04X} }}", self.futln, self.response)
    }
}
