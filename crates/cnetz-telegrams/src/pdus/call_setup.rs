use cnetz_core::{expect_opcode, BitBuffer, ChanNr, Futln, TelegramParseErr};

use crate::digits::{read_digit_block, write_digit_block};
use crate::opcode::Opcode;
use crate::pdus::{access_request_pdu, addressed_cause_pdu, addressed_pdu};

access_request_pdu!(
    /// Mobile-originated call request, sent unscheduled on the control
    /// channel (Aloha random access).
    /// Response expected: DialInvite / Reject
    CallRequest,
    Opcode::CallRequest
);

addressed_pdu!(
    /// Invitation to transmit the dialed number.
    /// Response expected: DialDigitsLow
    DialInvite,
    Opcode::DialInvite
);

addressed_pdu!(
    /// The transaction was placed in the channel queue; the mobile keeps
    /// listening on the control channel until a channel is assigned.
    QueueNotify,
    Opcode::QueueNotify
);

addressed_cause_pdu!(
    /// Request rejected on the control channel (no channel, queue full,
    /// unknown subscriber, authentication failure).
    Reject,
    Opcode::Reject
);

/// One block of up to 8 dialed digits. A number longer than 8 digits is
/// carried in a low and a high block.
/// Layout: opcode (6), futln (24), count (4), 8 digit nibbles (32), filler (4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialDigits {
    pub futln: Futln,
    /// True for the second (high) digit block
    pub high: bool,
    pub digits: String,
}

impl DialDigits {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, TelegramParseErr> {
        let opcode = buffer.read_field(6, "opcode")?;
        let high = match Opcode::try_from(opcode) {
            Ok(Opcode::DialDigitsLow) => false,
            Ok(Opcode::DialDigitsHigh) => true,
            _ => {
                return Err(TelegramParseErr::InvalidOpcode {
                    expected: Opcode::DialDigitsLow.into_raw(),
                    found: opcode,
                })
            }
        };
        let futln = Futln::from_bits(buffer.read_field(24, "futln")?);
        let digits = read_digit_block(buffer)?;
        Ok(Self { futln, high, digits })
    }

    pub fn to_bitbuf(&self, buffer: &mut BitBuffer) {
        let opcode = if self.high { Opcode::DialDigitsHigh } else { Opcode::DialDigitsLow };
        buffer.write_bits(opcode.into_raw(), 6);
        buffer.write_bits(self.futln.to_bits(), 24);
        write_digit_block(buffer, &self.digits).expect("dial digits validated on entry");
        let filler = buffer.get_len_remaining();
        buffer.write_zeroes(filler);
    }
}

impl core::fmt::Display for DialDigits {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "DialDigits {{ futln: {} high: {} digits: \"{}\" }}",
            self.futln, self.high, self.digits
        )
    }
}

/// Traffic channel assignment, the hand-off point from the control channel.
/// Sent for both call directions; `terminating` distinguishes paging
/// assignments so the mobile knows whether to ring or to proceed dialing.
/// Layout: opcode (6), futln (24), chan (10), combined (1), terminating (1),
/// filler (28).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAssign {
    pub futln: Futln,
    pub chan: ChanNr,
    /// The assigned channel doubles as a control channel (last-resort mode)
    pub combined: bool,
    /// Mobile-terminated call
    pub terminating: bool,
}

impl ChannelAssign {
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Self, TelegramParseErr> {
        let opcode = buffer.read_field(6, "opcode")?;
        expect_opcode!(opcode, Opcode::ChannelAssign)?;
        let futln = Futln::from_bits(buffer.read_field(24, "futln")?);
        let chan = buffer.read_field(10, "chan")? as ChanNr;
        let combined = buffer.read_field(1, "combined")? != 0;
        let terminating = buffer.read_field(1, "terminating")? != 0;
        Ok(Self { futln, chan, combined, terminating })
    }

    pub fn to_bitbuf(&self, buffer: &mut BitBuffer) {
        buffer.write_bits(Opcode::ChannelAssign.into_raw(), 6);
        buffer.write_bits(self.futln.to_bits(), 24);
        buffer.write_bits(self.chan as u64, 10);
        buffer.write_bits(self.combined as u64, 1);
        buffer.write_bits(self.terminating as u64, 1);
        let filler = buffer.get_len_remaining();
        buffer.write_zeroes(filler);
    }
}

impl core::fmt::Display for ChannelAssign {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ChannelAssign {{ futln: {} chan: {} combined: {} terminating: {} }}",
            self.futln, self.chan, self.combined, self.terminating
        )
    }
}

#[cfg(test)]
mod tests {
    use cnetz_core::Cause;

    use super::*;
    use crate::INFO_BITS;

    #[test]
    fn test_dial_digits_roundtrip() {
        let pdu = DialDigits {
            futln: Futln::new(2, 17, 54321),
            high: false,
            digits: "0171123".to_string(),
        };
        let mut bb = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut bb);
        bb.seek(0);
        assert_eq!(DialDigits::from_bitbuf(&mut bb).unwrap(), pdu);

        let pdu = DialDigits { high: true, digits: "4#".to_string(), ..pdu };
        let mut bb = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut bb);
        bb.seek(0);
        assert_eq!(DialDigits::from_bitbuf(&mut bb).unwrap(), pdu);
    }

    #[test]
    fn test_channel_assign_roundtrip() {
        let pdu = ChannelAssign {
            futln: Futln::new(1, 3, 99),
            chan: 831,
            combined: true,
            terminating: false,
        };
        let mut bb = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut bb);
        bb.seek(0);
        assert_eq!(ChannelAssign::from_bitbuf(&mut bb).unwrap(), pdu);
    }

    #[test]
    fn test_reject_roundtrip() {
        let pdu = Reject { futln: Futln::new(1, 3, 99), cause: Cause::NoChannel };
        let mut bb = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut bb);
        bb.seek(0);
        assert_eq!(Reject::from_bitbuf(&mut bb).unwrap(), pdu);
    }
}
