//! Frame synchronization: correlate recovered bits against the 33-bit sync
//! pattern (both polarities), then sample exactly 150 further bits at fixed
//! one-bit spacing without any further resynchronization within the frame.

use std::collections::VecDeque;

use cnetz_config::FskDetector;

use crate::coder::components::framing::{SYNC_BITS, SYNC_REPEATS, SYNC_SEQ};
use crate::coder::components::interleave::BLOCK_BITS;
use crate::phy::bitsync::{BitEvent, BitSync};

/// Weighted agreement a window must reach to count as sync: 29 of 33,
/// tolerating two flipped bits (each flip costs two) and rejecting three
pub const SYNC_THRESHOLD: f64 = 29.0 / 33.0;

/// Distributed in-call signaling: payload arrives in groups of this many
/// bits ...
pub const DIST_SIG_GROUP_BITS: usize = 30;

/// ... separated by voice windows of this many bit periods, which the frame
/// sampler skips
pub const DIST_VOICE_GAP_BITS: usize = 66;

/// A fully sampled frame with its reception metrics
#[derive(Debug, Clone)]
pub struct RxFrame {
    pub bits: [u8; BLOCK_BITS],
    /// Mean transition magnitude over the sync sequence
    pub level: f64,
    /// Sample time of the first sync bit boundary
    pub origin: f64,
    /// RMS deviation of the sync bit times from the fitted bit grid
    pub jitter: f64,
    pub inverted: bool,
}

enum RxState {
    /// Scanning the recovered bit stream for the sync pattern
    Hunt,
    /// Locked: sampling payload bits on the fixed grid
    Read {
        bits: [u8; BLOCK_BITS],
        idx: usize,
        next_center: f64,
        acc: f64,
        acc_n: u32,
        level: f64,
        origin: f64,
        jitter: f64,
        inverted: bool,
    },
}

/// Receive chain of one channel: bit synchronizer plus frame assembly
pub struct FrameRx {
    spb: f64,
    bitsync: BitSync,
    state: RxState,
    distributed: bool,
    sync_pattern: [u8; SYNC_BITS],
    history: VecDeque<BitEvent>,
}

impl FrameRx {
    pub fn new(spb: f64, detector: FskDetector) -> Self {
        let mut sync_pattern = [0u8; SYNC_BITS];
        for rep in 0..SYNC_REPEATS {
            sync_pattern[rep * SYNC_SEQ.len()..(rep + 1) * SYNC_SEQ.len()]
                .copy_from_slice(&SYNC_SEQ);
        }
        Self {
            spb,
            bitsync: BitSync::new(spb, detector),
            state: RxState::Hunt,
            distributed: false,
            sync_pattern,
            history: VecDeque::with_capacity(SYNC_BITS + 1),
        }
    }

    /// Switch between concentrated and distributed payload layout
    pub fn set_distributed(&mut self, distributed: bool) {
        self.distributed = distributed;
    }

    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    /// Process one input sample; returns a frame when one completes
    pub fn sample(&mut self, input: f32) -> Option<RxFrame> {
        let events = self.bitsync.feed(input);
        let now = self.bitsync.clock();

        if matches!(self.state, RxState::Hunt) {
            for event in events {
                self.history.push_back(event);
                if self.history.len() > SYNC_BITS {
                    self.history.pop_front();
                }
                if self.history.len() == SYNC_BITS {
                    if let Some(inverted) = self.correlate() {
                        self.lock(inverted);
                        break;
                    }
                }
            }
            return None;
        }

        let distributed = self.distributed;
        let spb = self.spb;
        let RxState::Read {
            bits,
            idx,
            next_center,
            acc,
            acc_n,
            level,
            origin,
            jitter,
            inverted,
        } = &mut self.state
        else {
            return None;
        };

        // sampling is purely grid-driven; recovered bits are ignored
        let t = now - 1.0;
        if (t - *next_center).abs() <= spb / 4.0 {
            *acc += input as f64;
            *acc_n += 1;
        }
        if t >= *next_center + spb / 2.0 {
            let avg = if *acc_n > 0 { *acc / *acc_n as f64 } else { 0.0 };
            let mut bit = (avg >= 0.0) as u8;
            if *inverted {
                bit ^= 1;
            }
            bits[*idx] = bit;
            *idx += 1;
            *acc = 0.0;
            *acc_n = 0;
            *next_center += spb;
            if distributed && *idx < BLOCK_BITS && *idx % DIST_SIG_GROUP_BITS == 0 {
                *next_center += DIST_VOICE_GAP_BITS as f64 * spb;
            }
            if *idx == BLOCK_BITS {
                let frame = RxFrame {
                    bits: *bits,
                    level: *level,
                    origin: *origin,
                    jitter: *jitter,
                    inverted: *inverted,
                };
                self.state = RxState::Hunt;
                self.history.clear();
                return Some(frame);
            }
        }
        None
    }

    /// Weighted correlation of the bit history against the sync pattern.
    /// Returns Some(inverted) on a hit. A corrupted pattern simply never
    /// reaches the threshold; no error is raised.
    fn correlate(&self) -> Option<bool> {
        let mut score = 0.0;
        let mut total = 0.0;
        for (i, event) in self.history.iter().enumerate() {
            total += event.level;
            if event.value == self.sync_pattern[i] {
                score += event.level;
            } else {
                score -= event.level;
            }
        }
        if total <= 0.0 {
            return None;
        }
        // small epsilon so the exact-2-flip boundary case is not lost to
        // float rounding
        let threshold = SYNC_THRESHOLD * total - 1e-9;
        if score >= threshold {
            Some(false)
        } else if -score >= threshold {
            Some(true)
        } else {
            None
        }
    }

    fn lock(&mut self, inverted: bool) {
        let n = SYNC_BITS as f64;

        // fit the bit grid through the sync arrival times
        let mut origin = 0.0;
        for (i, event) in self.history.iter().enumerate() {
            origin += event.time - i as f64 * self.spb;
        }
        origin /= n;

        let mut jitter = 0.0;
        let mut level = 0.0;
        for (i, event) in self.history.iter().enumerate() {
            let residual = event.time - origin - i as f64 * self.spb;
            jitter += residual * residual;
            level += event.level;
        }
        let jitter = (jitter / n).sqrt();
        let level = level / n;

        // the mean sync magnitude becomes the fixed threshold for the
        // remainder of the frame
        self.bitsync.set_threshold(level / 2.0);

        // payload bit 0 sits one marker bit after the 33 sync bits
        let first_center = origin + (SYNC_BITS as f64 + 1.0 + 0.5) * self.spb;

        tracing::trace!(
            "sync locked: origin {:.1} level {:.2} jitter {:.2} inverted {}",
            origin,
            level,
            jitter,
            inverted
        );

        self.state = RxState::Read {
            bits: [0u8; BLOCK_BITS],
            idx: 0,
            next_center: first_center,
            acc: 0.0,
            acc_n: 0,
            level,
            origin,
            jitter,
            inverted,
        };
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use cnetz_core::BitBuffer;

    use super::*;
    use crate::coder::coder_bs::encode_telegram;
    use crate::coder::components::framing::FRAME_BITS;
    use cnetz_telegrams::INFO_BITS;

    const SPB: f64 = 10.0;

    fn test_info_word() -> BitBuffer {
        let mut info = [0u8; INFO_BITS];
        for (i, bit) in info.iter_mut().enumerate() {
            *bit = ((i * 5 + 2) % 7 < 3) as u8;
        }
        BitBuffer::from_bitarr(&info)
    }

    /// Render frame bits as a clean FSK square wave, with idle bits around it
    fn render(frame_bits: &[u8], invert: bool, flips: &[usize]) -> Vec<f32> {
        let mut bits: Vec<u8> = Vec::new();
        // leading idle: alternating filler so the bit recovery has a signal
        for i in 0..20 {
            bits.push((i % 2) as u8);
        }
        for (i, &b) in frame_bits.iter().enumerate() {
            let mut bit = b;
            if flips.contains(&i) {
                bit ^= 1;
            }
            bits.push(bit);
        }
        for i in 0..20 {
            bits.push((i % 2) as u8);
        }
        let mut samples = Vec::with_capacity(bits.len() * SPB as usize);
        for b in bits {
            let mut level = if b == 1 { 1.0f32 } else { -1.0 };
            if invert {
                level = -level;
            }
            for _ in 0..SPB as usize {
                samples.push(level);
            }
        }
        samples
    }

    fn receive(samples: &[f32]) -> Option<RxFrame> {
        let mut rx = FrameRx::new(SPB, FskDetector::SlopeMax);
        let mut result = None;
        for &s in samples {
            if let Some(frame) = rx.sample(s) {
                result = Some(frame);
            }
        }
        result
    }

    #[test]
    fn test_clean_frame_received() {
        let sdu = test_info_word();
        let frame = encode_telegram(&sdu);
        assert_eq!(frame.get_len(), FRAME_BITS);
        let samples = render(frame.as_bits(), false, &[]);
        let rx = receive(&samples).expect("frame not detected");
        assert!(!rx.inverted);
        assert_eq!(&rx.bits[..], &frame.as_bits()[SYNC_BITS + 1..]);
        assert!(rx.jitter < 1.0, "jitter {} too high", rx.jitter);
    }

    #[test]
    fn test_inverted_frame_received() {
        let sdu = test_info_word();
        let frame = encode_telegram(&sdu);
        let samples = render(frame.as_bits(), true, &[]);
        let rx = receive(&samples).expect("inverted frame not detected");
        assert!(rx.inverted);
        assert_eq!(&rx.bits[..], &frame.as_bits()[SYNC_BITS + 1..]);
    }

    #[test]
    fn test_sync_tolerates_two_flipped_bits() {
        let sdu = test_info_word();
        let frame = encode_telegram(&sdu);
        // flips inside the 33-bit sync pattern
        let samples = render(frame.as_bits(), false, &[2, 20]);
        assert!(receive(&samples).is_some(), "2-bit-damaged sync not detected");
    }

    #[test]
    fn test_sync_rejects_three_flipped_bits() {
        let sdu = test_info_word();
        let frame = encode_telegram(&sdu);
        let samples = render(frame.as_bits(), false, &[2, 13, 20]);
        assert!(receive(&samples).is_none(), "3-bit-damaged sync falsely detected");
    }

    #[test]
    fn test_distributed_payload_with_voice_gaps() {
        let sdu = test_info_word();
        let frame = encode_telegram(&sdu);
        let frame_bits = frame.as_bits();

        // rebuild the on-air bit stream with voice windows between groups
        let mut bits: Vec<u8> = Vec::new();
        for i in 0..20 {
            bits.push((i % 2) as u8);
        }
        bits.extend_from_slice(&frame_bits[..SYNC_BITS + 1]);
        for (i, &b) in frame_bits[SYNC_BITS + 1..].iter().enumerate() {
            bits.push(b);
            if (i + 1) % DIST_SIG_GROUP_BITS == 0 && i + 1 < BLOCK_BITS {
                // voice window: alternating pattern stands in for audio
                for v in 0..DIST_VOICE_GAP_BITS {
                    bits.push((v % 2) as u8);
                }
            }
        }
        for i in 0..20 {
            bits.push((i % 2) as u8);
        }

        let mut samples = Vec::new();
        for b in bits {
            for _ in 0..SPB as usize {
                samples.push(if b == 1 { 1.0f32 } else { -1.0 });
            }
        }

        let mut rx = FrameRx::new(SPB, FskDetector::SlopeMax);
        rx.set_distributed(true);
        let mut result = None;
        for s in samples {
            if let Some(frame) = rx.sample(s) {
                result = Some(frame);
            }
        }
        let rx_frame = result.expect("distributed frame not received");
        assert_eq!(&rx_frame.bits[..], &frame_bits[SYNC_BITS + 1..]);
    }
}
