//! Subscriber registry: cached knowledge that a subscriber is currently
//! reachable, kept alive by periodic keep-alive probes and evicted after a
//! configured number of missed probes.

use std::collections::HashMap;

use cnetz_core::{ChanNr, Futln, SlotTime};

use crate::cc::timer::SlotTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbePhase {
    /// Waiting for the next probe to become due
    Scheduled,
    /// A probe was transmitted; waiting for the quittance
    AwaitingAck,
}

#[derive(Debug)]
pub struct RegEntry {
    pub futln: Futln,
    /// Control channel the subscriber was last heard on
    pub home_chan: ChanNr,
    pub chip_card: bool,
    pub extended_band: bool,
    /// Probing is suppressed entirely while a call is active
    pub busy: bool,
    pub last_seen: SlotTime,
    pub retries: u8,
    phase: ProbePhase,
    timer: SlotTimer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A keep-alive probe should be transmitted for this subscriber.
    /// The caller answers with probe_sent() or probe_assumed().
    ProbeDue(Futln),
    /// Retries exhausted; the entry is gone
    Evicted(Futln),
}

pub struct SubscriberRegistry {
    entries: HashMap<u32, RegEntry>,
    probe_interval: i64,
    /// Shortened interval between retries, capped at a fixed ceiling
    retry_interval: i64,
    /// How long to wait for the quittance to a transmitted probe
    response_window: i64,
    max_retries: u8,
}

impl SubscriberRegistry {
    pub fn new(probe_interval: i64, retry_interval: i64, response_window: i64, max_retries: u8) -> Self {
        assert!(max_retries >= 1);
        Self {
            entries: HashMap::new(),
            probe_interval,
            retry_interval,
            response_window,
            max_retries,
        }
    }

    /// Create or update an entry on any registration, roaming update or
    /// successful probe. Resets the retry counter and restarts the probe
    /// timer.
    pub fn seen(&mut self, futln: Futln, home_chan: ChanNr, chip_card: bool, extended_band: bool, now: SlotTime) {
        let interval = self.probe_interval;
        let entry = self.entries.entry(futln.key()).or_insert_with(|| RegEntry {
            futln,
            home_chan,
            chip_card,
            extended_band,
            busy: false,
            last_seen: now,
            retries: 0,
            phase: ProbePhase::Scheduled,
            timer: SlotTimer::new(),
        });
        entry.home_chan = home_chan;
        entry.chip_card = chip_card;
        entry.extended_band = extended_band;
        entry.last_seen = now;
        entry.retries = 0;
        entry.phase = ProbePhase::Scheduled;
        if !entry.busy {
            entry.timer.start(now, interval);
        }
    }

    pub fn get(&self, futln: Futln) -> Option<&RegEntry> {
        self.entries.get(&futln.key())
    }

    pub fn contains(&self, futln: Futln) -> bool {
        self.entries.contains_key(&futln.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The busy flag suppresses probing while a call is active; probing
    /// resumes when the subscriber returns to idle.
    pub fn set_busy(&mut self, futln: Futln, busy: bool, now: SlotTime) {
        let interval = self.probe_interval;
        if let Some(entry) = self.entries.get_mut(&futln.key()) {
            entry.busy = busy;
            if busy {
                entry.timer.stop();
                entry.phase = ProbePhase::Scheduled;
            } else {
                entry.last_seen = now;
                entry.retries = 0;
                entry.timer.start(now, interval);
            }
        }
    }

    /// The probe was transmitted; start the response window
    pub fn probe_sent(&mut self, futln: Futln, now: SlotTime) {
        let window = self.response_window;
        if let Some(entry) = self.entries.get_mut(&futln.key()) {
            entry.phase = ProbePhase::AwaitingAck;
            entry.timer.start(now, window);
        }
    }

    /// The control channel was busy handling voice: the probe is assumed
    /// successful and the timer simply restarts
    pub fn probe_assumed(&mut self, futln: Futln, now: SlotTime) {
        let interval = self.probe_interval;
        if let Some(entry) = self.entries.get_mut(&futln.key()) {
            entry.phase = ProbePhase::Scheduled;
            entry.timer.start(now, interval);
        }
    }

    /// Quittance received: the subscriber is confirmed reachable
    pub fn probe_confirmed(&mut self, futln: Futln, now: SlotTime) {
        let interval = self.probe_interval;
        if let Some(entry) = self.entries.get_mut(&futln.key()) {
            entry.retries = 0;
            entry.last_seen = now;
            entry.phase = ProbePhase::Scheduled;
            entry.timer.start(now, interval);
        }
    }

    /// Explicit removal (detach or forced flush)
    pub fn remove(&mut self, futln: Futln) -> Option<RegEntry> {
        self.entries.remove(&futln.key())
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    /// One scheduler pass: collect due probes and evict entries whose
    /// retries are exhausted.
    pub fn tick(&mut self, now: SlotTime) -> Vec<RegistryEvent> {
        let mut events = Vec::new();
        let mut evict = Vec::new();

        for entry in self.entries.values_mut() {
            if entry.busy || !entry.timer.has_expired(now) {
                continue;
            }
            match entry.phase {
                ProbePhase::Scheduled => {
                    // stop until the caller reports how the probe went
                    entry.timer.stop();
                    events.push(RegistryEvent::ProbeDue(entry.futln));
                }
                ProbePhase::AwaitingAck => {
                    entry.retries += 1;
                    if entry.retries >= self.max_retries {
                        evict.push(entry.futln);
                    } else {
                        entry.phase = ProbePhase::Scheduled;
                        entry.timer.start(now, self.retry_interval);
                    }
                }
            }
        }

        for futln in evict {
            self.entries.remove(&futln.key());
            events.push(RegistryEvent::Evicted(futln));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: i64 = 100;
    const RETRY: i64 = 20;
    const WINDOW: i64 = 10;

    fn subscriber() -> Futln {
        Futln::new(2, 17, 54321)
    }

    fn registry() -> SubscriberRegistry {
        SubscriberRegistry::new(PROBE, RETRY, WINDOW, 3)
    }

    /// Walk one full probe cycle without a response; returns the events of
    /// the response-window expiry.
    fn fail_one_probe(reg: &mut SubscriberRegistry, mut now: SlotTime, due_in: i64) -> (SlotTime, Vec<RegistryEvent>) {
        now = now.add_slots(due_in);
        let events = reg.tick(now);
        assert_eq!(events, vec![RegistryEvent::ProbeDue(subscriber())]);
        reg.probe_sent(subscriber(), now);
        now = now.add_slots(WINDOW);
        let events = reg.tick(now);
        (now, events)
    }

    #[test]
    fn test_eviction_after_exactly_max_retries() {
        let mut reg = registry();
        let mut now = SlotTime::default();
        reg.seen(subscriber(), 131, false, false, now);

        // first failed probe: retry 1, no eviction
        let (t, events) = fail_one_probe(&mut reg, now, PROBE);
        now = t;
        assert!(events.is_empty());
        assert_eq!(reg.get(subscriber()).unwrap().retries, 1);

        // second failed probe (after the shortened retry interval)
        let (t, events) = fail_one_probe(&mut reg, now, RETRY);
        now = t;
        assert!(events.is_empty());
        assert_eq!(reg.get(subscriber()).unwrap().retries, 2);

        // third failed probe: evicted now, not earlier, not later
        let (_, events) = fail_one_probe(&mut reg, now, RETRY);
        assert_eq!(events, vec![RegistryEvent::Evicted(subscriber())]);
        assert!(!reg.contains(subscriber()));
    }

    #[test]
    fn test_confirm_resets_retries() {
        let mut reg = registry();
        let mut now = SlotTime::default();
        reg.seen(subscriber(), 131, false, false, now);

        let (t, events) = fail_one_probe(&mut reg, now, PROBE);
        now = t;
        assert!(events.is_empty());

        // next probe answered
        now = now.add_slots(RETRY);
        assert_eq!(reg.tick(now), vec![RegistryEvent::ProbeDue(subscriber())]);
        reg.probe_sent(subscriber(), now);
        reg.probe_confirmed(subscriber(), now.add_slots(2));
        assert_eq!(reg.get(subscriber()).unwrap().retries, 0);

        // no event before the full probe interval elapses again
        assert!(reg.tick(now.add_slots(PROBE - 1)).is_empty());
    }

    #[test]
    fn test_busy_suppresses_probing() {
        let mut reg = registry();
        let now = SlotTime::default();
        reg.seen(subscriber(), 131, false, false, now);
        reg.set_busy(subscriber(), true, now);

        assert!(reg.tick(now.add_slots(10 * PROBE)).is_empty());

        // probing resumes when the subscriber returns to idle
        let idle_at = now.add_slots(10 * PROBE);
        reg.set_busy(subscriber(), false, idle_at);
        assert!(reg.tick(idle_at.add_slots(PROBE - 1)).is_empty());
        assert_eq!(
            reg.tick(idle_at.add_slots(PROBE)),
            vec![RegistryEvent::ProbeDue(subscriber())]
        );
    }

    #[test]
    fn test_assumed_probe_restarts_without_retry() {
        let mut reg = registry();
        let now = SlotTime::default();
        reg.seen(subscriber(), 131, false, false, now);

        let due = now.add_slots(PROBE);
        assert_eq!(reg.tick(due), vec![RegistryEvent::ProbeDue(subscriber())]);
        // channel busy with voice: assume success
        reg.probe_assumed(subscriber(), due);
        assert_eq!(reg.get(subscriber()).unwrap().retries, 0);
        assert!(reg.tick(due.add_slots(PROBE - 1)).is_empty());
        assert_eq!(
            reg.tick(due.add_slots(PROBE)),
            vec![RegistryEvent::ProbeDue(subscriber())]
        );
    }
}
