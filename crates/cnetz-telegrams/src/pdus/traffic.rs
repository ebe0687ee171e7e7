use crate::opcode::Opcode;
use crate::pdus::addressed_pdu;

addressed_pdu!(
    /// Transmitted repeatedly on a freshly assigned traffic channel until the
    /// mobile confirms seizure.
    /// Response expected: SeizureConfirm
    SeizureAck,
    Opcode::SeizureAck
);

addressed_pdu!(
    /// The mobile arrived on the traffic channel.
    SeizureConfirm,
    Opcode::SeizureConfirm
);

addressed_pdu!(
    /// Keep-alive exchange on the traffic channel; concentrated during call
    /// setup, distributed between voice once the call is through-connected.
    /// Response expected: ConnectionHoldAck
    ConnectionHold,
    Opcode::ConnectionHold
);

addressed_pdu!(
    /// Quittance to ConnectionHold.
    ConnectionHoldAck,
    Opcode::ConnectionHoldAck
);

addressed_pdu!(
    /// Order to ring the called subscriber (mobile-terminated call).
    /// Response expected: RingAck, then Answer
    Ring,
    Opcode::Ring
);

addressed_pdu!(
    /// The mobile started ringing.
    RingAck,
    Opcode::RingAck
);

addressed_pdu!(
    /// The called subscriber picked up.
    Answer,
    Opcode::Answer
);

addressed_pdu!(
    /// Through-connect order: the audio path is live from here on.
    /// Response expected: ConnectAck
    Connect,
    Opcode::Connect
);

addressed_pdu!(
    /// Quittance to Connect.
    ConnectAck,
    Opcode::ConnectAck
);
