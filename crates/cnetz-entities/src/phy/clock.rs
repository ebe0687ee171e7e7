//! Receive and transmit clock tracking.
//!
//! The receive clock follows the remote transmitter through a first-order
//! loop: a frame arriving more than half a bit away from the expected slot
//! boundary snaps the clock, smaller errors are corrected by half the
//! measured offset. The local clock therefore tracks the remote timing
//! without ever knowing the fixed transmission latency.

use cnetz_core::timebase::SLOT_BITS;
use cnetz_core::SlotTime;

pub struct RxClock {
    /// Sample time of a reference slot-grid origin
    origin: f64,
    slot_samples: f64,
    locked: bool,
}

impl RxClock {
    pub fn new(spb: f64) -> Self {
        Self {
            origin: 0.0,
            slot_samples: SLOT_BITS as f64 * spb,
            locked: false,
        }
    }

    /// Feed the measured frame origin of a decoded frame.
    /// Returns the timing error in samples relative to the nearest expected
    /// slot boundary (zero for the very first frame, which anchors the grid).
    pub fn track(&mut self, measured: f64, spb: f64) -> f64 {
        if !self.locked {
            self.origin = measured;
            self.locked = true;
            return 0.0;
        }
        let n = ((measured - self.origin) / self.slot_samples).round();
        let expected = self.origin + n * self.slot_samples;
        let err = measured - expected;
        if err.abs() > 0.5 * spb {
            // too far out: snap immediately
            self.origin += err;
        } else {
            // first-order loop: correct by half the offset
            self.origin += err / 2.0;
        }
        err
    }

    /// One-shot phase copy onto a freshly granted traffic channel, so it
    /// starts without a cold resynchronization
    pub fn copy_phase_from(&mut self, other: &RxClock) {
        self.origin = other.origin;
        self.locked = other.locked;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

/// Transmit bit clock shared by all channels of one sound source: a single
/// monotonically increasing bit index, slot boundaries at fixed positions.
pub struct TxClock {
    pos: i64,
}

impl TxClock {
    pub fn new() -> Self {
        Self { pos: 0 }
    }

    /// First bit index of the given slot
    pub fn slot_start_bit(slot: SlotTime) -> i64 {
        slot.to_int() * SLOT_BITS as i64
    }

    pub fn pos(&self) -> i64 {
        self.pos
    }

    pub fn advance(&mut self, num_bits: usize) {
        self.pos += num_bits as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPB: f64 = 10.0;
    const SLOT_SAMPLES: f64 = SLOT_BITS as f64 * SPB;

    #[test]
    fn test_first_frame_anchors() {
        let mut clock = RxClock::new(SPB);
        assert_eq!(clock.track(12345.0, SPB), 0.0);
        assert!(clock.is_locked());
    }

    #[test]
    fn test_small_error_halved() {
        let mut clock = RxClock::new(SPB);
        clock.track(1000.0, SPB);
        // 0.3 bit late: corrected by half
        let err = clock.track(1000.0 + SLOT_SAMPLES + 3.0, SPB);
        assert!((err - 3.0).abs() < 1e-9);
        // next frame exactly on the remote grid: residual error is half
        let err = clock.track(1000.0 + 2.0 * SLOT_SAMPLES + 3.0, SPB);
        assert!((err - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_large_error_snaps() {
        let mut clock = RxClock::new(SPB);
        clock.track(1000.0, SPB);
        // 0.8 bit late: snap
        let err = clock.track(1000.0 + SLOT_SAMPLES + 8.0, SPB);
        assert!((err - 8.0).abs() < 1e-9);
        // the grid followed completely
        let err = clock.track(1000.0 + 2.0 * SLOT_SAMPLES + 8.0, SPB);
        assert!(err.abs() < 1e-9);
    }

    #[test]
    fn test_phase_copy() {
        let mut a = RxClock::new(SPB);
        a.track(500.0, SPB);
        let mut b = RxClock::new(SPB);
        b.copy_phase_from(&a);
        // a frame on a's grid shows no error on b
        let err = b.track(500.0 + SLOT_SAMPLES, SPB);
        assert!(err.abs() < 1e-9);
    }
}
