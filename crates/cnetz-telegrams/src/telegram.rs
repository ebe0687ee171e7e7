use cnetz_core::{BitBuffer, Futln, TelegramParseErr};

use crate::opcode::Opcode;
use crate::pdus::*;
use crate::{INFO_BITS, OPCODE_BITS};

/// A fully parsed telegram of any opcode. Decoding peeks the opcode and
/// dispatches to the matching PDU struct.
#[derive(Debug, Clone, PartialEq)]
pub enum Telegram {
    IdleSignal(IdleSignal),
    RegisterAck(RegisterAck),
    RoamAck(RoamAck),
    QueueNotify(QueueNotify),
    Reject(Reject),
    DialInvite(DialInvite),
    ChannelAssign(ChannelAssign),
    SeizureAck(SeizureAck),
    AuthChallenge(AuthChallenge),
    ConnectionHold(ConnectionHold),
    Ring(Ring),
    Connect(Connect),
    ReleaseBase(ReleaseBase),
    ReleaseMobileAck(ReleaseMobileAck),
    Probe(Probe),

    RegisterRequest(RegisterRequest),
    RoamRequest(RoamRequest),
    CallRequest(CallRequest),
    DialDigits(DialDigits),
    SeizureConfirm(SeizureConfirm),
    AuthResponse(AuthResponse),
    ConnectionHoldAck(ConnectionHoldAck),
    RingAck(RingAck),
    Answer(Answer),
    ConnectAck(ConnectAck),
    ReleaseMobile(ReleaseMobile),
    ReleaseBaseAck(ReleaseBaseAck),
    ProbeAck(ProbeAck),
}

impl Telegram {
    /// Parse an info word. The buffer position is expected at the opcode.
    pub fn from_bitbuf(buffer: &mut BitBuffer) -> Result<Telegram, TelegramParseErr> {
        let raw = buffer
            .peek_bits(OPCODE_BITS)
            .ok_or(TelegramParseErr::BufferEnded { field: Some("opcode") })?;
        let opcode = Opcode::try_from(raw).map_err(|found| TelegramParseErr::UnknownOpcode { found })?;

        let telegram = match opcode {
            Opcode::IdleSignal => Telegram::IdleSignal(IdleSignal::from_bitbuf(buffer)?),
            Opcode::RegisterAck => Telegram::RegisterAck(RegisterAck::from_bitbuf(buffer)?),
            Opcode::RoamAck => Telegram::RoamAck(RoamAck::from_bitbuf(buffer)?),
            Opcode::QueueNotify => Telegram::QueueNotify(QueueNotify::from_bitbuf(buffer)?),
            Opcode::Reject => Telegram::Reject(Reject::from_bitbuf(buffer)?),
            Opcode::DialInvite => Telegram::DialInvite(DialInvite::from_bitbuf(buffer)?),
            Opcode::ChannelAssign => Telegram::ChannelAssign(ChannelAssign::from_bitbuf(buffer)?),
            Opcode::SeizureAck => Telegram::SeizureAck(SeizureAck::from_bitbuf(buffer)?),
            Opcode::AuthChallenge => Telegram::AuthChallenge(AuthChallenge::from_bitbuf(buffer)?),
            Opcode::ConnectionHold => Telegram::ConnectionHold(ConnectionHold::from_bitbuf(buffer)?),
            Opcode::Ring => Telegram::Ring(Ring::from_bitbuf(buffer)?),
            Opcode::Connect => Telegram::Connect(Connect::from_bitbuf(buffer)?),
            Opcode::ReleaseBase => Telegram::ReleaseBase(ReleaseBase::from_bitbuf(buffer)?),
            Opcode::ReleaseMobileAck => {
                Telegram::ReleaseMobileAck(ReleaseMobileAck::from_bitbuf(buffer)?)
            }
            Opcode::Probe => Telegram::Probe(Probe::from_bitbuf(buffer)?),
            Opcode::RegisterRequest => {
                Telegram::RegisterRequest(RegisterRequest::from_bitbuf(buffer)?)
            }
            Opcode::RoamRequest => Telegram::RoamRequest(RoamRequest::from_bitbuf(buffer)?),
            Opcode::CallRequest => Telegram::CallRequest(CallRequest::from_bitbuf(buffer)?),
            Opcode::DialDigitsLow | Opcode::DialDigitsHigh => {
                Telegram::DialDigits(DialDigits::from_bitbuf(buffer)?)
            }
            Opcode::SeizureConfirm => Telegram::SeizureConfirm(SeizureConfirm::from_bitbuf(buffer)?),
            Opcode::AuthResponse => Telegram::AuthResponse(AuthResponse::from_bitbuf(buffer)?),
            Opcode::ConnectionHoldAck => {
                Telegram::ConnectionHoldAck(ConnectionHoldAck::from_bitbuf(buffer)?)
            }
            Opcode::RingAck => Telegram::RingAck(RingAck::from_bitbuf(buffer)?),
            Opcode::Answer => Telegram::Answer(Answer::from_bitbuf(buffer)?),
            Opcode::ConnectAck => Telegram::ConnectAck(ConnectAck::from_bitbuf(buffer)?),
            Opcode::ReleaseMobile => Telegram::ReleaseMobile(ReleaseMobile::from_bitbuf(buffer)?),
            Opcode::ReleaseBaseAck => Telegram::ReleaseBaseAck(ReleaseBaseAck::from_bitbuf(buffer)?),
            Opcode::ProbeAck => Telegram::ProbeAck(ProbeAck::from_bitbuf(buffer)?),
        };
        Ok(telegram)
    }

    pub fn to_bitbuf(&self, buffer: &mut BitBuffer) {
        match self {
            Telegram::IdleSignal(pdu) => pdu.to_bitbuf(buffer),
            Telegram::RegisterAck(pdu) => pdu.to_bitbuf(buffer),
            Telegram::RoamAck(pdu) => pdu.to_bitbuf(buffer),
            Telegram::QueueNotify(pdu) => pdu.to_bitbuf(buffer),
            Telegram::Reject(pdu) => pdu.to_bitbuf(buffer),
            Telegram::DialInvite(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ChannelAssign(pdu) => pdu.to_bitbuf(buffer),
            Telegram::SeizureAck(pdu) => pdu.to_bitbuf(buffer),
            Telegram::AuthChallenge(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ConnectionHold(pdu) => pdu.to_bitbuf(buffer),
            Telegram::Ring(pdu) => pdu.to_bitbuf(buffer),
            Telegram::Connect(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ReleaseBase(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ReleaseMobileAck(pdu) => pdu.to_bitbuf(buffer),
            Telegram::Probe(pdu) => pdu.to_bitbuf(buffer),
            Telegram::RegisterRequest(pdu) => pdu.to_bitbuf(buffer),
            Telegram::RoamRequest(pdu) => pdu.to_bitbuf(buffer),
            Telegram::CallRequest(pdu) => pdu.to_bitbuf(buffer),
            Telegram::DialDigits(pdu) => pdu.to_bitbuf(buffer),
            Telegram::SeizureConfirm(pdu) => pdu.to_bitbuf(buffer),
            Telegram::AuthResponse(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ConnectionHoldAck(pdu) => pdu.to_bitbuf(buffer),
            Telegram::RingAck(pdu) => pdu.to_bitbuf(buffer),
            Telegram::Answer(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ConnectAck(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ReleaseMobile(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ReleaseBaseAck(pdu) => pdu.to_bitbuf(buffer),
            Telegram::ProbeAck(pdu) => pdu.to_bitbuf(buffer),
        }
    }

    /// Encode into a fresh 70-bit info word, position reset to the start
    pub fn encode(&self) -> BitBuffer {
        let mut buffer = BitBuffer::new(INFO_BITS);
        self.to_bitbuf(&mut buffer);
        buffer.seek(0);
        buffer
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Telegram::IdleSignal(_) => Opcode::IdleSignal,
            Telegram::RegisterAck(_) => Opcode::RegisterAck,
            Telegram::RoamAck(_) => Opcode::RoamAck,
            Telegram::QueueNotify(_) => Opcode::QueueNotify,
            Telegram::Reject(_) => Opcode::Reject,
            Telegram::DialInvite(_) => Opcode::DialInvite,
            Telegram::ChannelAssign(_) => Opcode::ChannelAssign,
            Telegram::SeizureAck(_) => Opcode::SeizureAck,
            Telegram::AuthChallenge(_) => Opcode::AuthChallenge,
            Telegram::ConnectionHold(_) => Opcode::ConnectionHold,
            Telegram::Ring(_) => Opcode::Ring,
            Telegram::Connect(_) => Opcode::Connect,
            Telegram::ReleaseBase(_) => Opcode::ReleaseBase,
            Telegram::ReleaseMobileAck(_) => Opcode::ReleaseMobileAck,
            Telegram::Probe(_) => Opcode::Probe,
            Telegram::RegisterRequest(_) => Opcode::RegisterRequest,
            Telegram::RoamRequest(_) => Opcode::RoamRequest,
            Telegram::CallRequest(_) => Opcode::CallRequest,
            Telegram::DialDigits(pdu) => {
                if pdu.high {
                    Opcode::DialDigitsHigh
                } else {
                    Opcode::DialDigitsLow
                }
            }
            Telegram::SeizureConfirm(_) => Opcode::SeizureConfirm,
            Telegram::AuthResponse(_) => Opcode::AuthResponse,
            Telegram::ConnectionHoldAck(_) => Opcode::ConnectionHoldAck,
            Telegram::RingAck(_) => Opcode::RingAck,
            Telegram::Answer(_) => Opcode::Answer,
            Telegram::ConnectAck(_) => Opcode::ConnectAck,
            Telegram::ReleaseMobile(_) => Opcode::ReleaseMobile,
            Telegram::ReleaseBaseAck(_) => Opcode::ReleaseBaseAck,
            Telegram::ProbeAck(_) => Opcode::ProbeAck,
        }
    }

    /// Addressed subscriber identity; None only for the broadcast IdleSignal
    pub fn futln(&self) -> Option<Futln> {
        match self {
            Telegram::IdleSignal(_) => None,
            Telegram::RegisterAck(pdu) => Some(pdu.futln),
            Telegram::RoamAck(pdu) => Some(pdu.futln),
            Telegram::QueueNotify(pdu) => Some(pdu.futln),
            Telegram::Reject(pdu) => Some(pdu.futln),
            Telegram::DialInvite(pdu) => Some(pdu.futln),
            Telegram::ChannelAssign(pdu) => Some(pdu.futln),
            Telegram::SeizureAck(pdu) => Some(pdu.futln),
            Telegram::AuthChallenge(pdu) => Some(pdu.futln),
            Telegram::ConnectionHold(pdu) => Some(pdu.futln),
            Telegram::Ring(pdu) => Some(pdu.futln),
            Telegram::Connect(pdu) => Some(pdu.futln),
            Telegram::ReleaseBase(pdu) => Some(pdu.futln),
            Telegram::ReleaseMobileAck(pdu) => Some(pdu.futln),
            Telegram::Probe(pdu) => Some(pdu.futln),
            Telegram::RegisterRequest(pdu) => Some(pdu.futln),
            Telegram::RoamRequest(pdu) => Some(pdu.futln),
            Telegram::CallRequest(pdu) => Some(pdu.futln),
            Telegram::DialDigits(pdu) => Some(pdu.futln),
            Telegram::SeizureConfirm(pdu) => Some(pdu.futln),
            Telegram::AuthResponse(pdu) => Some(pdu.futln),
            Telegram::ConnectionHoldAck(pdu) => Some(pdu.futln),
            Telegram::RingAck(pdu) => Some(pdu.futln),
            Telegram::Answer(pdu) => Some(pdu.futln),
            Telegram::ConnectAck(pdu) => Some(pdu.futln),
            Telegram::ReleaseMobile(pdu) => Some(pdu.futln),
            Telegram::ReleaseBaseAck(pdu) => Some(pdu.futln),
            Telegram::ProbeAck(pdu) => Some(pdu.futln),
        }
    }

    /// Cell code carried by uplink random-access telegrams, used for
    /// cell-match validation. None for telegrams without the field.
    pub fn cell_code(&self) -> Option<u8> {
        match self {
            Telegram::RegisterRequest(pdu) => Some(pdu.cell_code),
            Telegram::RoamRequest(pdu) => Some(pdu.cell_code),
            Telegram::CallRequest(pdu) => Some(pdu.cell_code),
            _ => None,
        }
    }
}

impl core::fmt::Display for Telegram {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Telegram::IdleSignal(pdu) => write!(f, "{}", pdu),
            Telegram::RegisterAck(pdu) => write!(f, "{}", pdu),
            Telegram::RoamAck(pdu) => write!(f, "{}", pdu),
            Telegram::QueueNotify(pdu) => write!(f, "{}", pdu),
            Telegram::Reject(pdu) => write!(f, "{}", pdu),
            Telegram::DialInvite(pdu) => write!(f, "{}", pdu),
            Telegram::ChannelAssign(pdu) => write!(f, "{}", pdu),
            Telegram::SeizureAck(pdu) => write!(f, "{}", pdu),
            Telegram::AuthChallenge(pdu) => write!(f, "{}", pdu),
            Telegram::ConnectionHold(pdu) => write!(f, "{}", pdu),
            Telegram::Ring(pdu) => write!(f, "{}", pdu),
            Telegram::Connect(pdu) => write!(f, "{}", pdu),
            Telegram::ReleaseBase(pdu) => write!(f, "{}", pdu),
            Telegram::ReleaseMobileAck(pdu) => write!(f, "{}", pdu),
            Telegram::Probe(pdu) => write!(f, "{}", pdu),
            Telegram::RegisterRequest(pdu) => write!(f, "{}", pdu),
            Telegram::RoamRequest(pdu) => write!(f, "{}", pdu),
            Telegram::CallRequest(pdu) => write!(f, "{}", pdu),
            Telegram::DialDigits(pdu) => write!(f, "{}", pdu),
            Telegram::SeizureConfirm(pdu) => write!(f, "{}", pdu),
            Telegram::AuthResponse(pdu) => write!(f, "{}", pdu),
            Telegram::ConnectionHoldAck(pdu) => write!(f, "{}", pdu),
            Telegram::RingAck(pdu) => write!(f, "{}", pdu),
            Telegram::Answer(pdu) => write!(f, "{}", pdu),
            Telegram::ConnectAck(pdu) => write!(f, "{}", pdu),
            Telegram::ReleaseMobile(pdu) => write!(f, "{}", pdu),
            Telegram::ReleaseBaseAck(pdu) => write!(f, "{}", pdu),
            Telegram::ProbeAck(pdu) => write!(f, "{}", pdu),
        }
    }
}

#[cfg(test)]
mod tests {
    use cnetz_core::Futln;

    use super::*;

    #[test]
    fn test_dispatch_roundtrip() {
        let telegrams = vec![
            Telegram::IdleSignal(IdleSignal {
                cell_code: 3,
                slot_nr: 0,
                queueing: true,
                auth: true,
                extended_band: false,
            }),
            Telegram::ChannelAssign(ChannelAssign {
                futln: Futln::new(2, 17, 54321),
                chan: 124,
                combined: false,
                terminating: true,
            }),
            Telegram::DialDigits(DialDigits {
                futln: Futln::new(1, 3, 4711),
                high: false,
                digits: "0815".to_string(),
            }),
            Telegram::AuthChallenge(AuthChallenge {
                futln: Futln::new(1, 3, 4711),
                challenge: 0x12_3456_789A,
            }),
        ];
        for telegram in telegrams {
            let mut encoded = telegram.encode();
            assert_eq!(encoded.get_len(), INFO_BITS);
            let decoded = Telegram::from_bitbuf(&mut encoded).unwrap();
            assert_eq!(decoded, telegram);
            assert_eq!(decoded.opcode(), telegram.opcode());
        }
    }

    #[test]
    fn test_unknown_opcode() {
        let mut buffer = BitBuffer::new(INFO_BITS);
        buffer.write_bits(0x3F, 6);
        buffer.write_zeroes(64);
        buffer.seek(0);
        assert_eq!(
            Telegram::from_bitbuf(&mut buffer),
            Err(TelegramParseErr::UnknownOpcode { found: 0x3F })
        );
    }
}
