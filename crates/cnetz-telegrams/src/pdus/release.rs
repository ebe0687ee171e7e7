use crate::opcode::Opcode;
use crate::pdus::{addressed_cause_pdu, addressed_pdu};

addressed_cause_pdu!(
    /// Release initiated by the network side. Repeated a bounded number of
    /// times until the mobile acknowledges.
    /// Response expected: ReleaseBaseAck
    ReleaseBase,
    Opcode::ReleaseBase
);

addressed_pdu!(
    /// Quittance to ReleaseBase.
    ReleaseBaseAck,
    Opcode::ReleaseBaseAck
);

addressed_cause_pdu!(
    /// Release initiated by the subscriber (on-hook).
    /// Response expected: ReleaseMobileAck
    ReleaseMobile,
    Opcode::ReleaseMobile
);

addressed_pdu!(
    /// Quittance to ReleaseMobile.
    ReleaseMobileAck,
    Opcode::ReleaseMobileAck
);

#[cfg(test)]
mod tests {
    use cnetz_core::{BitBuffer, Cause, Futln};

    use super::*;
    use crate::INFO_BITS;

    #[test]
    fn test_release_base_roundtrip() {
        let pdu = ReleaseBase { futln: Futln::new(2, 17, 54321), cause: Cause::Timeout };
        let mut bb = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut bb);
        bb.seek(0);
        assert_eq!(ReleaseBase::from_bitbuf(&mut bb).unwrap(), pdu);
    }
}
