//! Clock-less bit recovery from the demodulated FSK baseband.
//!
//! A sliding window one bit-period wide is searched for its dominant
//! transition. A transition is accepted only if its magnitude exceeds the
//! adaptive threshold and its peak falls in the middle of the window, which
//! detects the transition about half a bit late. While unsynchronized every
//! accepted transition restarts a 1.5-bit wait; when no transition arrives
//! the last bit value is repeated and the wait shortens to 1.0 bit.

use std::collections::VecDeque;

use cnetz_config::FskDetector;

/// One recovered bit: its value, the magnitude of the transition that
/// produced it, and the sample time of its bit boundary.
#[derive(Debug, Clone, Copy)]
pub struct BitEvent {
    pub value: u8,
    pub level: f64,
    pub time: f64,
}

pub struct BitSync {
    detector: FskDetector,
    spb: f64,
    w_len: usize,
    window: VecDeque<f32>,

    /// Samples consumed so far; the last fed sample has time `clock - 1`
    clock: f64,

    threshold: f64,
    last_bit: u8,
    last_level: f64,
    /// Bit-boundary time of the most recently emitted bit
    last_bit_time: f64,
    /// Time of the most recently accepted transition
    last_transition: f64,
    /// When to emit a repeated bit if no transition arrives
    next_deadline: f64,
}

impl BitSync {
    pub fn new(spb: f64, detector: FskDetector) -> Self {
        let w_len = spb.round() as usize + 1;
        Self {
            detector,
            spb,
            w_len,
            window: VecDeque::with_capacity(w_len + 1),
            clock: 0.0,
            threshold: 0.0,
            last_bit: 0,
            last_level: 0.0,
            last_bit_time: 0.0,
            last_transition: f64::NEG_INFINITY,
            next_deadline: f64::INFINITY,
        }
    }

    /// Fix the threshold, normally to half the mean sync magnitude after a
    /// frame has been locked
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Process one input sample; returns zero, one or two recovered bits
    pub fn feed(&mut self, sample: f32) -> Vec<BitEvent> {
        self.window.push_back(sample);
        if self.window.len() > self.w_len {
            self.window.pop_front();
        }
        self.clock += 1.0;

        let mut out = Vec::new();
        if self.window.len() < self.w_len {
            return out;
        }

        if let Some((pos, magnitude, rising)) = self.find_transition() {
            let mid = (self.w_len as f64 - 1.0) / 2.0;
            let centered = (pos - mid).abs() <= self.spb / 4.0;
            // the transition happened `w_len - pos` samples before `clock`
            let t = self.clock - self.w_len as f64 + pos;
            let fresh = t > self.last_transition + self.spb / 2.0;
            if magnitude > self.threshold && centered && fresh {
                let bit = rising as u8;
                self.last_bit = bit;
                self.last_level = magnitude;
                self.last_bit_time = t;
                self.last_transition = t;
                self.threshold = magnitude / 2.0;
                self.next_deadline = t + 1.5 * self.spb;
                out.push(BitEvent { value: bit, level: magnitude, time: t });
            }
        }

        if self.clock >= self.next_deadline {
            // no transition: repeat the last bit value on the bit grid
            self.last_bit_time += self.spb;
            self.next_deadline += self.spb;
            // slowly lower the threshold so a fading signal can reacquire
            self.threshold *= 0.8;
            out.push(BitEvent {
                value: self.last_bit,
                level: self.last_level,
                time: self.last_bit_time,
            });
        }

        out
    }

    /// Classify the dominant transition in the window.
    /// Returns (position between samples, magnitude, rising).
    fn find_transition(&self) -> Option<(f64, f64, bool)> {
        let mut best: Option<(f64, f64, bool)> = None;
        for j in 0..self.w_len - 1 {
            let a = self.window[j];
            let b = self.window[j + 1];
            let candidate = match self.detector {
                // maximum inter-sample slope, robust against DC offset
                FskDetector::SlopeMax => true,
                // only slopes crossing zero qualify
                FskDetector::ZeroCrossing => (a <= 0.0) != (b <= 0.0),
            };
            if !candidate {
                continue;
            }
            let d = (b - a) as f64;
            if best.map_or(true, |(_, m, _)| d.abs() > m) {
                best = Some((j as f64 + 0.5, d.abs(), d > 0.0));
            }
        }
        best
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn spb(&self) -> f64 {
        self.spb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPB: f64 = 10.0;

    fn feed_bits(sync: &mut BitSync, bits: &[u8], amp: f32) -> Vec<BitEvent> {
        let mut events = Vec::new();
        for &bit in bits {
            let level = if bit == 1 { amp } else { -amp };
            for _ in 0..SPB as usize {
                events.extend(sync.feed(level));
            }
        }
        events
    }

    #[test]
    fn test_recovers_alternating_bits() {
        let mut sync = BitSync::new(SPB, FskDetector::SlopeMax);
        let pattern = [0u8, 1, 0, 1, 0, 1, 0, 1];
        let events = feed_bits(&mut sync, &pattern, 1.0);
        // first bit produces no transition; all following alternations do
        let values: Vec<u8> = events.iter().map(|e| e.value).collect();
        assert!(values.len() >= pattern.len() - 2);
        for pair in values.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        // transitions are one bit period apart
        for pair in events.windows(2) {
            assert!((pair[1].time - pair[0].time - SPB).abs() < 1.0);
        }
    }

    #[test]
    fn test_repeats_bits_in_runs() {
        let mut sync = BitSync::new(SPB, FskDetector::SlopeMax);
        let pattern = [0u8, 1, 1, 1, 1, 0];
        let events = feed_bits(&mut sync, &pattern, 1.0);
        let values: Vec<u8> = events.iter().map(|e| e.value).collect();
        // rising transition, three repeats, falling transition
        assert_eq!(values, vec![1, 1, 1, 1, 0]);
        for pair in events.windows(2) {
            assert!((pair[1].time - pair[0].time - SPB).abs() < 1.0);
        }
    }

    #[test]
    fn test_threshold_rejects_small_glitches() {
        let mut sync = BitSync::new(SPB, FskDetector::SlopeMax);
        // strong transition fixes the threshold
        feed_bits(&mut sync, &[0, 1], 1.0);
        // a tiny wiggle must not register as a transition
        let mut glitch_events = Vec::new();
        for i in 0..(2.0 * SPB) as usize {
            let s = 1.0 + if i == 5 { -0.2 } else { 0.0 };
            glitch_events.extend(sync.feed(s));
        }
        assert!(glitch_events.iter().all(|e| e.value == 1), "glitch flipped a bit");
    }

    #[test]
    fn test_zero_crossing_detector() {
        let mut sync = BitSync::new(SPB, FskDetector::ZeroCrossing);
        let events = feed_bits(&mut sync, &[0, 1, 0], 1.0);
        let values: Vec<u8> = events.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1, 0]);
    }
}
