/// Telegram opcodes, 6 bits on the air interface.
/// Downlink (base to mobile) opcodes occupy 0x01..0x1F, uplink 0x20..0x3F.
/// Opcode 0 is reserved so an all-zero info word is never a valid telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // Downlink
    IdleSignal = 0x01,
    RegisterAck = 0x02,
    RoamAck = 0x03,
    QueueNotify = 0x04,
    Reject = 0x05,
    DialInvite = 0x06,
    ChannelAssign = 0x07,
    SeizureAck = 0x08,
    AuthChallenge = 0x09,
    ConnectionHold = 0x0A,
    Ring = 0x0B,
    Connect = 0x0C,
    ReleaseBase = 0x0D,
    ReleaseMobileAck = 0x0E,
    Probe = 0x0F,

    // Uplink
    RegisterRequest = 0x20,
    RoamRequest = 0x21,
    CallRequest = 0x22,
    DialDigitsLow = 0x23,
    DialDigitsHigh = 0x24,
    SeizureConfirm = 0x25,
    AuthResponse = 0x26,
    ConnectionHoldAck = 0x27,
    RingAck = 0x28,
    Answer = 0x29,
    ConnectAck = 0x2A,
    ReleaseMobile = 0x2B,
    ReleaseBaseAck = 0x2C,
    ProbeAck = 0x2D,
}

impl Opcode {
    pub fn into_raw(self) -> u64 {
        self as u64
    }

    /// True for opcodes sent by the mobile
    pub fn is_uplink(self) -> bool {
        (self as u8) >= 0x20
    }
}

impl TryFrom<u64> for Opcode {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let op = match value {
            0x01 => Opcode::IdleSignal,
            0x02 => Opcode::RegisterAck,
            0x03 => Opcode::RoamAck,
            0x04 => Opcode::QueueNotify,
            0x05 => Opcode::Reject,
            0x06 => Opcode::DialInvite,
            0x07 => Opcode::ChannelAssign,
            0x08 => Opcode::SeizureAck,
            0x09 => Opcode::AuthChallenge,
            0x0A => Opcode::ConnectionHold,
            0x0B => Opcode::Ring,
            0x0C => Opcode::Connect,
            0x0D => Opcode::ReleaseBase,
            0x0E => Opcode::ReleaseMobileAck,
            0x0F => Opcode::Probe,
            0x20 => Opcode::RegisterRequest,
            0x21 => Opcode::RoamRequest,
            0x22 => Opcode::CallRequest,
            0x23 => Opcode::DialDigitsLow,
            0x24 => Opcode::DialDigitsHigh,
            0x25 => Opcode::SeizureConfirm,
            0x26 => Opcode::AuthResponse,
            0x27 => Opcode::ConnectionHoldAck,
            0x28 => Opcode::RingAck,
            0x29 => Opcode::Answer,
            0x2A => Opcode::ConnectAck,
            0x2B => Opcode::ReleaseMobile,
            0x2C => Opcode::ReleaseBaseAck,
            0x2D => Opcode::ProbeAck,
            other => return Err(other),
        };
        Ok(op)
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        for raw in 0u64..64 {
            if let Ok(op) = Opcode::try_from(raw) {
                assert_eq!(op.into_raw(), raw);
            }
        }
        assert!(Opcode::try_from(0).is_err());
        assert!(Opcode::try_from(0x3F).is_err());
    }

    #[test]
    fn test_direction() {
        assert!(!Opcode::IdleSignal.is_uplink());
        assert!(!Opcode::ReleaseBase.is_uplink());
        assert!(Opcode::RegisterRequest.is_uplink());
        assert!(Opcode::ReleaseBaseAck.is_uplink());
    }
}
