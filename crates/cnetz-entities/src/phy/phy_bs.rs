//! Phy entity: owns the receive chain and transmit frame store of every
//! configured channel. The embedding audio layer pushes demodulated samples
//! in and pulls transmit bitstreams out; no sound hardware is driven here.

use std::collections::{BTreeMap, VecDeque};

use cnetz_config::SharedConfig;
use cnetz_core::timebase::BIT_RATE;
use cnetz_core::{ChanNr, CnetzEntity, Sap};
use cnetz_saps::fs::{FsFrameInd, FsVoiceInd};
use cnetz_saps::{SapMsg, SapMsgInner};

use crate::coder::components::framing::FRAME_BITS;
use crate::phy::clock::{RxClock, TxClock};
use crate::phy::framesync::FrameRx;
use crate::{CnetzEntityTrait, MessageQueue};

struct ChanPhy {
    nr: ChanNr,
    rx: FrameRx,
    clock: RxClock,
    /// Demodulated samples pushed by the embedding layer, drained each tick
    rx_buf: Vec<f32>,
    /// Uplink voice samples (traffic channels)
    voice_up: Vec<i16>,
    /// Downlink voice samples awaiting the embedding layer
    voice_down: VecDeque<i16>,
    /// Scheduled transmit frames, keyed by their absolute start bit index
    pending_tx: BTreeMap<i64, Vec<u8>>,
}

pub struct PhyBs {
    config: SharedConfig,
    spb: f64,
    /// Transmit telegrams with inverted polarity (cell configuration)
    tx_inverted: bool,
    chans: Vec<ChanPhy>,
    tx_clock: TxClock,
}

impl PhyBs {
    pub fn new(config: SharedConfig) -> Self {
        let cfg = config.config();
        let spb = cfg.phy.sample_rate as f64 / BIT_RATE;
        let chans = cfg
            .channels
            .iter()
            .map(|c| ChanPhy {
                nr: c.nr,
                rx: FrameRx::new(spb, cfg.phy.detector),
                clock: RxClock::new(spb),
                rx_buf: Vec::new(),
                voice_up: Vec::new(),
                voice_down: VecDeque::new(),
                pending_tx: BTreeMap::new(),
            })
            .collect();
        let tx_inverted = cfg.cell.inverted_polarity;
        Self { config, spb, tx_inverted, chans, tx_clock: TxClock::new() }
    }

    fn chan_mut(&mut self, nr: ChanNr) -> Option<&mut ChanPhy> {
        self.chans.iter_mut().find(|c| c.nr == nr)
    }

    /// Push demodulated receive samples for one channel.
    /// Called by the embedding audio layer; processed on the next tick.
    pub fn push_rx_samples(&mut self, chan_nr: ChanNr, samples: &[f32]) {
        if let Some(chan) = self.chan_mut(chan_nr) {
            chan.rx_buf.extend_from_slice(samples);
        } else {
            tracing::warn!("push_rx_samples for unknown channel {}", chan_nr);
        }
    }

    /// Push uplink voice samples for an in-call traffic channel
    pub fn push_voice(&mut self, chan_nr: ChanNr, samples: &[i16]) {
        if let Some(chan) = self.chan_mut(chan_nr) {
            chan.voice_up.extend_from_slice(samples);
        }
    }

    /// Take buffered downlink voice samples for one channel
    pub fn take_voice(&mut self, chan_nr: ChanNr) -> Vec<i16> {
        match self.chan_mut(chan_nr) {
            Some(chan) => chan.voice_down.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Pull the next `num_bits` transmit bits of every channel at once.
    /// All channels share one transmit bit clock, so their phases stay
    /// aligned on the common sound source. Bits outside a scheduled frame
    /// are idle filler.
    pub fn pull_tx(&mut self, num_bits: usize) -> Vec<(ChanNr, Vec<u8>)> {
        let start = self.tx_clock.pos();
        let end = start + num_bits as i64;
        let mut out = Vec::with_capacity(self.chans.len());

        for chan in &mut self.chans {
            let mut bits = Vec::with_capacity(num_bits);
            for p in start..end {
                let mut bit = (p & 1) as u8;
                // frames start at or before p and may cover it
                if let Some((&fstart, frame)) = chan.pending_tx.range(..=p).next_back() {
                    let offset = (p - fstart) as usize;
                    if offset < frame.len() {
                        bit = frame[offset];
                    }
                }
                if self.tx_inverted {
                    bit ^= 1;
                }
                bits.push(bit);
            }
            // drop frames that have been fully transmitted
            chan.pending_tx.retain(|&fstart, frame| fstart + frame.len() as i64 > end);
            out.push((chan.nr, bits));
        }

        self.tx_clock.advance(num_bits);
        out
    }
}

impl CnetzEntityTrait for PhyBs {
    fn entity(&self) -> CnetzEntity {
        CnetzEntity::Phy
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }

    fn tick_start(&mut self, queue: &mut MessageQueue, ts: cnetz_core::SlotTime) {
        let spb = self.spb;
        for chan in &mut self.chans {
            let samples = std::mem::take(&mut chan.rx_buf);
            for sample in samples {
                if let Some(frame) = chan.rx.sample(sample) {
                    let err_samples = chan.clock.track(frame.origin, spb);
                    queue.push_back(SapMsg {
                        sap: Sap::FsSap,
                        src: CnetzEntity::Phy,
                        dest: CnetzEntity::Coder,
                        time: ts,
                        msg: SapMsgInner::FsFrameInd(FsFrameInd {
                            chan_nr: chan.nr,
                            coded: cnetz_core::BitBuffer::from_bitarr(&frame.bits),
                            level: frame.level,
                            time_offset: err_samples / spb,
                            jitter: frame.jitter / spb,
                            inverted: frame.inverted,
                        }),
                    });
                }
            }

            if !chan.voice_up.is_empty() {
                let samples = std::mem::take(&mut chan.voice_up);
                queue.push_back(SapMsg {
                    sap: Sap::FsSap,
                    src: CnetzEntity::Phy,
                    dest: CnetzEntity::CallControl,
                    time: ts,
                    msg: SapMsgInner::FsVoiceInd(FsVoiceInd { chan_nr: chan.nr, samples }),
                });
            }
        }
    }

    fn rx_prim(&mut self, _queue: &mut MessageQueue, message: SapMsg) {
        match message.msg {
            SapMsgInner::FsFrameReq(prim) => {
                assert_eq!(prim.frame.get_len(), FRAME_BITS);
                let start = TxClock::slot_start_bit(prim.slot);
                if let Some(chan) = self.chan_mut(prim.chan_nr) {
                    chan.pending_tx.insert(start, prim.frame.as_bits().to_vec());
                } else {
                    tracing::warn!("FsFrameReq for unknown channel {}", prim.chan_nr);
                }
            }
            SapMsgInner::FsModeReq(prim) => {
                if let Some(chan) = self.chan_mut(prim.chan_nr) {
                    tracing::debug!(
                        "chan {}: rx mode {}",
                        prim.chan_nr,
                        if prim.distributed { "distributed" } else { "concentrated" }
                    );
                    chan.rx.set_distributed(prim.distributed);
                }
            }
            SapMsgInner::FsClockCopyReq(prim) => {
                let from = self.chans.iter().position(|c| c.nr == prim.from_chan);
                let to = self.chans.iter().position(|c| c.nr == prim.to_chan);
                if let (Some(from), Some(to)) = (from, to) {
                    if from != to {
                        // split_at_mut to hold both channels at once
                        let (head, tail) = self.chans.split_at_mut(from.max(to));
                        let (src, dst) = if from < to {
                            (&head[from].clock, &mut tail[0].clock)
                        } else {
                            (&tail[0].clock, &mut head[to].clock)
                        };
                        dst.copy_phase_from(src);
                        tracing::debug!(
                            "clock phase copied {} -> {}",
                            prim.from_chan,
                            prim.to_chan
                        );
                    }
                } else {
                    tracing::warn!(
                        "FsClockCopyReq with unknown channel {} or {}",
                        prim.from_chan,
                        prim.to_chan
                    );
                }
            }
            SapMsgInner::FsVoiceReq(prim) => {
                if let Some(chan) = self.chan_mut(prim.chan_nr) {
                    chan.voice_down.extend(prim.samples);
                }
            }
            other => panic!("unexpected primitive for Phy: {:?}", other),
        }
    }
}
