/// Release/reject cause codes, 6 bits on the air interface.
/// Shared between telegrams and the line/collaborator interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cause {
    NormalRelease = 0,
    BusySubscriber = 1,
    /// No traffic channel free and queueing not available
    NoChannel = 2,
    QueueFull = 3,
    NoAnswer = 4,
    /// Peer did not respond within the expected window, retries exhausted
    Timeout = 5,
    /// Challenge/response mismatch; always fatal to the transaction
    AuthFailed = 6,
    /// Subscriber stopped answering registry probes
    SubscriberGone = 7,
    InvalidNumber = 8,
    NetworkCongestion = 9,
    OutOfOrder = 10,
    Unspecified = 63,
}

impl Cause {
    pub fn into_raw(self) -> u64 {
        self as u64
    }
}

impl TryFrom<u64> for Cause {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Cause::NormalRelease),
            1 => Ok(Cause::BusySubscriber),
            2 => Ok(Cause::NoChannel),
            3 => Ok(Cause::QueueFull),
            4 => Ok(Cause::NoAnswer),
            5 => Ok(Cause::Timeout),
            6 => Ok(Cause::AuthFailed),
            7 => Ok(Cause::SubscriberGone),
            8 => Ok(Cause::InvalidNumber),
            9 => Ok(Cause::NetworkCongestion),
            10 => Ok(Cause::OutOfOrder),
            63 => Ok(Cause::Unspecified),
            other => Err(other),
        }
    }
}

impl core::fmt::Display for Cause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        for cause in [
            Cause::NormalRelease,
            Cause::NoChannel,
            Cause::Timeout,
            Cause::AuthFailed,
            Cause::SubscriberGone,
            Cause::Unspecified,
        ] {
            assert_eq!(Cause::try_from(cause.into_raw()).unwrap(), cause);
        }
        assert!(Cause::try_from(42).is_err());
    }
}
