use core::fmt;

/// FSK bit rate of the air interface
pub const BIT_RATE: f64 = 5280.0;

/// Bits per time slot: one 184-bit downlink frame, the uplink response
/// window and guard time
pub const SLOT_BITS: u32 = 396;

/// Slots per super-frame; the slot counter broadcast on the control channel
/// runs 0..32
pub const SLOTS_PER_SUPERFRAME: u8 = 32;

/// Duration of one slot in seconds (75 ms; a super-frame is 2.4 s)
pub const SLOT_SECONDS: f64 = SLOT_BITS as f64 / BIT_RATE;

/// Convert a duration in seconds to a slot count, rounding to nearest
pub fn seconds_to_slots(seconds: f64) -> i64 {
    (seconds / SLOT_SECONDS).round() as i64
}

/// Position in the repeating super-frame time base.
/// All slot numbering and timer arithmetic is expressed against this clock.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SlotTime {
    /// Slot within the super-frame, 0..31
    pub slot: u8,
    /// Super-frame counter, incremented every 2.4 s
    pub sf: u32,
}

impl Default for SlotTime {
    fn default() -> SlotTime {
        SlotTime { slot: 0, sf: 0 }
    }
}

impl SlotTime {
    pub fn is_valid(self) -> bool {
        self.slot < SLOTS_PER_SUPERFRAME
    }

    pub fn to_int(self) -> i64 {
        self.sf as i64 * SLOTS_PER_SUPERFRAME as i64 + self.slot as i64
    }

    pub fn from_int(time: i64) -> SlotTime {
        let n = SLOTS_PER_SUPERFRAME as i64;
        SlotTime {
            slot: time.rem_euclid(n) as u8,
            sf: time.div_euclid(n) as u32,
        }
    }

    /// Add a number of slots (may be negative)
    pub fn add_slots(self, num_slots: i64) -> SlotTime {
        SlotTime::from_int(self.to_int() + num_slots)
    }

    /// Difference between two SlotTimes in slots
    pub fn diff(self, b: Self) -> i64 {
        self.to_int() - b.to_int()
    }

    /// Age of this SlotTime compared to now
    #[inline(always)]
    pub fn age(self, now: SlotTime) -> i64 {
        now.diff(self)
    }

    /// Round this time up to the next occurrence of the given slot number.
    /// If already at the right slot, time remains unchanged.
    pub fn forward_to_slot(self, slot: u8) -> SlotTime {
        let n = SLOTS_PER_SUPERFRAME as i64;
        let to_add = ((slot as i64 + n) - self.slot as i64) % n;
        self.add_slots(to_add)
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:6}/{:02}", self.sf, self.slot)
    }
}

impl fmt::Debug for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:6}/{:02}", self.sf, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_slots_and_diff() {
        let t0 = SlotTime::default();
        let t1 = t0.add_slots(1);
        assert_eq!(t1.slot, 1);
        assert_eq!(t1.sf, 0);

        let t2 = t0.add_slots(32);
        assert_eq!(t2.slot, 0);
        assert_eq!(t2.sf, 1);

        let t3 = t0.add_slots(100);
        assert_eq!(t3.diff(t0), 100);
        assert_eq!(t0.age(t3), 100);

        let back = t3.add_slots(-100);
        assert_eq!(back, t0);
    }

    #[test]
    fn test_forward_to_slot() {
        let t = SlotTime { slot: 10, sf: 5 };
        assert_eq!(t.forward_to_slot(10), t);
        let next = t.forward_to_slot(9);
        assert_eq!(next.slot, 9);
        assert_eq!(next.sf, 6);
        let near = t.forward_to_slot(12);
        assert_eq!(near.slot, 12);
        assert_eq!(near.sf, 5);
    }

    #[test]
    fn test_seconds_to_slots() {
        assert_eq!(seconds_to_slots(SLOT_SECONDS), 1);
        // a super-frame is 2.4 s
        assert_eq!(seconds_to_slots(2.4), 32);
        assert_eq!(seconds_to_slots(60.0), 800);
    }
}
