use cnetz_core::SlotTime;

/// One explicit software timer, expressed in slot time.
/// Checked once per scheduler pass; stopping is idempotent.
#[derive(Debug, Default)]
pub struct SlotTimer {
    expires: Option<SlotTime>,
}

impl SlotTimer {
    pub fn new() -> Self {
        Self { expires: None }
    }

    pub fn start(&mut self, now: SlotTime, slots: i64) {
        self.expires = Some(now.add_slots(slots));
    }

    pub fn stop(&mut self) {
        self.expires = None;
    }

    pub fn is_running(&self) -> bool {
        self.expires.is_some()
    }

    /// True once `now` has reached the expiry slot. The timer keeps
    /// reporting expiry until stopped or restarted.
    pub fn has_expired(&self, now: SlotTime) -> bool {
        matches!(self.expires, Some(e) if now.diff(e) >= 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_expire() {
        let now = SlotTime::default();
        let mut timer = SlotTimer::new();
        assert!(!timer.is_running());
        assert!(!timer.has_expired(now));

        timer.start(now, 10);
        assert!(timer.is_running());
        assert!(!timer.has_expired(now.add_slots(9)));
        assert!(timer.has_expired(now.add_slots(10)));
        assert!(timer.has_expired(now.add_slots(11)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let now = SlotTime::default();
        let mut timer = SlotTimer::new();
        timer.start(now, 5);
        timer.stop();
        timer.stop();
        assert!(!timer.is_running());
        assert!(!timer.has_expired(now.add_slots(100)));
    }

    #[test]
    fn test_restart_moves_expiry() {
        let now = SlotTime::default();
        let mut timer = SlotTimer::new();
        timer.start(now, 5);
        timer.start(now.add_slots(4), 5);
        assert!(!timer.has_expired(now.add_slots(5)));
        assert!(timer.has_expired(now.add_slots(9)));
    }
}
