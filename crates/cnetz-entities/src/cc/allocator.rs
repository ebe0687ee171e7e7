use cnetz_config::ChannelRole;
use cnetz_core::ChanNr;

use crate::cc::channel::{Channel, ChannelState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocErr {
    NoChannel,
}

/// Find a transceiver eligible to host a new traffic leg.
///
/// Selection order: a dedicated traffic-only channel that is IDLE is always
/// preferred; a combined control+traffic channel is a last resort, since
/// some mobile sets reject combined channels. A combined channel may still
/// carry control-phase transactions; those are flushed at grant time.
/// Mobiles without declared extended-band support are excluded from
/// extended-band channels.
pub fn select_traffic_channel(
    channels: &[Channel],
    extended_ok: bool,
    extended_band_start: ChanNr,
) -> Result<usize, AllocErr> {
    let band_ok = |c: &Channel| !c.reserved && (extended_ok || c.nr < extended_band_start);

    if let Some(idx) = channels
        .iter()
        .position(|c| c.role == ChannelRole::Traffic && c.state == ChannelState::Idle && band_ok(c))
    {
        return Ok(idx);
    }
    if let Some(idx) = channels
        .iter()
        .position(|c| c.role == ChannelRole::Combined && c.in_control_mode() && band_ok(c))
    {
        return Ok(idx);
    }
    Err(AllocErr::NoChannel)
}
