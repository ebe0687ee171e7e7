use cnetz_core::{BitBuffer, ChanNr, SlotTime};

/// The FS-UNITDATA indication: the bit synchronizer delivers the 150 coded
/// bits of a received frame, plus the reception metrics the call-control
/// layer uses for logging and auto-polarity decisions.
#[derive(Debug)]
pub struct FsFrameInd {
    pub chan_nr: ChanNr,
    /// 150 interleaved code bits, already stripped of sync and marker
    pub coded: BitBuffer,
    /// Mean transition magnitude over the sync sequence
    pub level: f64,
    /// Offset of the recovered frame origin from the expected slot boundary,
    /// in bits
    pub time_offset: f64,
    /// Standard deviation of the per-bit arrival times over the sync sequence
    pub jitter: f64,
    /// True if the frame was detected with inverted polarity
    pub inverted: bool,
}

/// The FS-UNITDATA request: hand a fully assembled 184-bit air frame to the
/// bit synchronizer for transmission at the given slot.
#[derive(Debug)]
pub struct FsFrameReq {
    pub chan_nr: ChanNr,
    /// Complete air frame: 3x11-bit sync + marker + 150 coded bits
    pub frame: BitBuffer,
    pub slot: SlotTime,
    /// Transmit with distributed in-call signaling gaps
    pub distributed: bool,
}

/// Copy the receive-clock phase of one channel onto another. Issued on
/// channel grant so the traffic channel starts with the phase the control
/// channel already tracked for this mobile, avoiding a cold resync.
#[derive(Debug)]
pub struct FsClockCopyReq {
    pub from_chan: ChanNr,
    pub to_chan: ChanNr,
}

/// Switch the receive path of a channel between concentrated and
/// distributed in-call signaling
#[derive(Debug)]
pub struct FsModeReq {
    pub chan_nr: ChanNr,
    pub distributed: bool,
}

/// Uplink voice samples received on a traffic channel
#[derive(Debug)]
pub struct FsVoiceInd {
    pub chan_nr: ChanNr,
    pub samples: Vec<i16>,
}

/// Downlink voice samples to transmit on a traffic channel
#[derive(Debug)]
pub struct FsVoiceReq {
    pub chan_nr: ChanNr,
    pub samples: Vec<i16>,
}
