use crate::opcode::Opcode;
use crate::pdus::{access_request_pdu, addressed_pdu, cell_ack_pdu};

access_request_pdu!(
    /// First-time attach of a subscriber on this cell.
    /// Response expected: RegisterAck
    RegisterRequest,
    Opcode::RegisterRequest
);

access_request_pdu!(
    /// A subscriber already attached elsewhere announces itself on this
    /// cell's control channel.
    /// Response expected: RoamAck
    RoamRequest,
    Opcode::RoamRequest
);

cell_ack_pdu!(
    /// Quittance to RegisterRequest. No further exchange follows.
    RegisterAck,
    Opcode::RegisterAck
);

cell_ack_pdu!(
    /// Quittance to RoamRequest.
    RoamAck,
    Opcode::RoamAck
);

addressed_pdu!(
    /// Keep-alive page transmitted by the registry to verify a subscriber is
    /// still reachable without occupying a voice channel.
    /// Response expected: ProbeAck
    Probe,
    Opcode::Probe
);

addressed_pdu!(
    /// Quittance to Probe.
    ProbeAck,
    Opcode::ProbeAck
);

#[cfg(test)]
mod tests {
    use cnetz_core::{BitBuffer, Futln};

    use super::*;
    use crate::INFO_BITS;

    #[test]
    fn test_register_ack_fixture() {
        // opcode 2, futln 2-17-54321, cell 9
        let bitstr = "0000100101000111010100001100010100100000000000000000000000000000000000";
        let mut buffer = BitBuffer::from_bitstr(bitstr);
        let pdu = RegisterAck::from_bitbuf(&mut buffer).unwrap();
        assert_eq!(pdu.futln, Futln::new(2, 17, 54321));
        assert_eq!(pdu.cell_code, 9);

        let mut out = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut out);
        assert_eq!(out.to_bitstr(), bitstr);
    }

    #[test]
    fn test_register_request_layouts() {
        // Plain layout
        let pdu = RegisterRequest {
            futln: Futln::new(1, 3, 4711),
            cell_code: 21,
            chip_card: false,
            extended_band: true,
            card_code: None,
        };
        let mut bb = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut bb);
        bb.seek(0);
        assert_eq!(RegisterRequest::from_bitbuf(&mut bb).unwrap(), pdu);

        // Auth layout appends the 16-bit card code
        let pdu = RegisterRequest { card_code: Some(0xBEEF), chip_card: true, ..pdu };
        let mut bb = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut bb);
        bb.seek(0);
        assert_eq!(RegisterRequest::from_bitbuf(&mut bb).unwrap(), pdu);
    }

    #[test]
    fn test_wrong_opcode_rejected() {
        let pdu = RoamRequest {
            futln: Futln::new(0, 0, 1),
            cell_code: 0,
            chip_card: false,
            extended_band: false,
            card_code: None,
        };
        let mut bb = BitBuffer::new(INFO_BITS);
        pdu.to_bitbuf(&mut bb);
        bb.seek(0);
        assert!(RegisterRequest::from_bitbuf(&mut bb).is_err());
    }
}
