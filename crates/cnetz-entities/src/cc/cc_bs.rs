//! Call-control entity: drives the transaction state machine, allocates
//! traffic channels, feeds the subscriber registry and bridges to the
//! external call-control layer.
//!
//! Three event sources drive it, strictly interleaved by the router:
//! decoded telegrams (rx_prim), the per-slot scheduler (tick_start applies
//! mode switches, promotes queued legs and checks timers; tick_end selects
//! the outbound telegram per channel), and the line primitives.

use cnetz_config::{ChannelRole, SharedConfig};
use cnetz_core::{CallRef, Cause, CnetzEntity, Futln, Sap, SlotTime};
use cnetz_core::timebase::seconds_to_slots;
use cnetz_saps::fs::{FsClockCopyReq, FsModeReq, FsVoiceReq};
use cnetz_saps::ln::*;
use cnetz_saps::mc::McTelegramReq;
use cnetz_saps::{SapMsg, SapMsgInner};
use cnetz_telegrams::pdus::*;
use cnetz_telegrams::{Opcode, Telegram};

use crate::cc::allocator::select_traffic_channel;
use crate::cc::auth;
use crate::cc::channel::{Channel, TxMode};
use crate::cc::registry::{RegistryEvent, SubscriberRegistry};
use crate::cc::system::System;
use crate::cc::transaction::{StateSet, TransId, TransState};
use crate::{CnetzEntityTrait, MessageQueue};

/// Channel-assign transmissions per grant round
const ASSIGN_REPEATS: u8 = 2;
/// DialInvite retransmissions before the leg is dropped
const DIAL_RETRIES: u8 = 2;
/// AuthChallenge retransmissions
const AUTH_RETRIES: u8 = 2;
/// Backoff between assignment retry rounds
const DELAY_SLOTS: i64 = 4;
/// Ring repeated at this interval while the called set is ringing
const RING_TX_INTERVAL: i64 = 8;
/// ReleaseBase repeated at this interval until acknowledged
const RELEASE_TX_INTERVAL: i64 = 4;
/// Response window after a transmitted keep-alive probe, about two seconds
const PROBE_RESPONSE_SLOTS: i64 = 27;

/// Timer settings converted from seconds to slots once at startup
struct DerivedTimers {
    queue_timeout: i64,
    dial_timeout: i64,
    seizure_timeout: i64,
    auth_timeout: i64,
    hold_timeout: i64,
    hold_interval: i64,
    ring_timeout: i64,
    probe_interval: i64,
    probe_retry: i64,
}

impl DerivedTimers {
    fn from_config(config: &SharedConfig) -> Self {
        let t = &config.config().timers;
        Self {
            queue_timeout: seconds_to_slots(t.queue_timeout_s),
            dial_timeout: seconds_to_slots(t.dial_timeout_s),
            seizure_timeout: seconds_to_slots(t.seizure_timeout_s),
            auth_timeout: seconds_to_slots(t.auth_timeout_s),
            hold_timeout: seconds_to_slots(t.hold_timeout_s),
            hold_interval: seconds_to_slots(t.hold_interval_s),
            ring_timeout: seconds_to_slots(t.ring_timeout_s),
            probe_interval: seconds_to_slots(t.probe_interval_s),
            probe_retry: seconds_to_slots(t.probe_retry_s),
        }
    }
}

/// One row of the state table: the uplink opcodes that advance the state,
/// the response timeout, the retry budget and the cause used once it is
/// exhausted. Having every (state, event) pair in one table keeps the
/// machine enumerable.
pub struct StateRow {
    pub expects: &'static [Opcode],
    pub timeout: Option<i64>,
    pub max_retries: u8,
    pub exhaust_cause: Cause,
}

pub struct CcBs {
    config: SharedConfig,
    sys: System,
    timers: DerivedTimers,
    next_call_ref: CallRef,
    /// Telegrams not tied to a live transaction (rejects, probes),
    /// transmitted ahead of transaction telegrams
    oneshot: Vec<(usize, Telegram)>,
}

impl CcBs {
    pub fn new(config: SharedConfig) -> Self {
        let cfg = config.config();
        let timers = DerivedTimers::from_config(&config);
        let mut channels: Vec<Channel> = cfg
            .channels
            .iter()
            .map(|c| Channel::new(c.nr, c.role, cfg.cell.inverted_polarity))
            .collect();
        for chan in &mut channels {
            chan.activate();
        }
        let registry = SubscriberRegistry::new(
            timers.probe_interval,
            timers.probe_retry,
            PROBE_RESPONSE_SLOTS,
            cfg.timers.probe_max_retries,
        );
        Self {
            config,
            sys: System::new(channels, registry),
            timers,
            next_call_ref: 1,
            oneshot: Vec::new(),
        }
    }

    /// Test access to the system context
    pub fn system(&self) -> &System {
        &self.sys
    }

    /// The complete state table
    pub fn state_row(&self, state: TransState) -> StateRow {
        use TransState::*;
        let cfg = self.config.config();
        match state {
            // answered or advanced on the next scheduler pass, no response awaited
            AttachPending | RoamPending | AcceptPending | PageGranted | CallGranted
            | ChallengeSent | ReleaseMobile => StateRow {
                expects: &[],
                timeout: None,
                max_retries: 0,
                exhaust_cause: Cause::NormalRelease,
            },
            PageQueued | CallQueued => StateRow {
                expects: &[],
                timeout: Some(self.timers.queue_timeout),
                max_retries: 0,
                exhaust_cause: Cause::NoChannel,
            },
            PageDelay | CallDelay => StateRow {
                expects: &[],
                timeout: Some(DELAY_SLOTS),
                max_retries: 0,
                exhaust_cause: Cause::NoChannel,
            },
            DialInvited => StateRow {
                expects: &[Opcode::DialDigitsLow],
                timeout: Some(self.timers.dial_timeout),
                max_retries: DIAL_RETRIES,
                exhaust_cause: Cause::Timeout,
            },
            DialReceived => StateRow {
                expects: &[Opcode::DialDigitsHigh],
                timeout: Some(self.timers.dial_timeout),
                max_retries: DIAL_RETRIES,
                exhaust_cause: Cause::Timeout,
            },
            PageAckWait | SeizureWait => StateRow {
                expects: &[Opcode::SeizureConfirm],
                timeout: Some(self.timers.seizure_timeout),
                max_retries: cfg.timers.seizure_max_repeats,
                exhaust_cause: Cause::Timeout,
            },
            ChallengeWait => StateRow {
                expects: &[Opcode::AuthResponse],
                timeout: Some(self.timers.auth_timeout),
                max_retries: AUTH_RETRIES,
                exhaust_cause: Cause::Timeout,
            },
            HoldAckWait => StateRow {
                expects: &[Opcode::ConnectionHoldAck],
                timeout: Some(self.timers.hold_timeout),
                max_retries: cfg.timers.hold_max_retries,
                exhaust_cause: Cause::Timeout,
            },
            Ringing => StateRow {
                expects: &[Opcode::RingAck, Opcode::Answer],
                timeout: Some(self.timers.ring_timeout),
                max_retries: 0,
                exhaust_cause: Cause::NoAnswer,
            },
            ConnectThrough => StateRow {
                expects: &[Opcode::ConnectAck],
                timeout: Some(self.timers.hold_timeout),
                max_retries: cfg.timers.hold_max_retries,
                exhaust_cause: Cause::Timeout,
            },
            Active => StateRow {
                expects: &[Opcode::ConnectionHoldAck],
                timeout: Some(self.timers.hold_interval),
                max_retries: cfg.timers.hold_max_retries,
                exhaust_cause: Cause::Timeout,
            },
            ReleaseBase => StateRow {
                expects: &[Opcode::ReleaseBaseAck],
                timeout: Some(RELEASE_TX_INTERVAL),
                max_retries: cfg.timers.release_repeats,
                exhaust_cause: Cause::NormalRelease,
            },
        }
    }

    /// Enter a state, starting its timer per the state table.
    /// Every state that awaits a response has its timer running.
    fn enter_state(&mut self, id: TransId, state: TransState, now: SlotTime) {
        let row = self.state_row(state);
        let Some(trans) = self.sys.trans_mut(id) else { return };
        tracing::debug!("#{} {:?} -> {:?}", id, trans.state, state);
        trans.state = state;
        match row.timeout {
            Some(slots) => trans.timer.start(now, slots),
            None => trans.timer.stop(),
        }
    }

    fn alloc_call_ref(&mut self) -> CallRef {
        let call_ref = self.next_call_ref;
        self.next_call_ref = self.next_call_ref.wrapping_add(1).max(1);
        call_ref
    }

    fn send_line(&self, queue: &mut MessageQueue, now: SlotTime, msg: SapMsgInner) {
        queue.push_back(SapMsg {
            sap: Sap::LnSap,
            src: CnetzEntity::CallControl,
            dest: CnetzEntity::Line,
            time: now,
            msg,
        });
    }

    /// Release the external call reference, if one is held
    fn release_line(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId, cause: Cause) {
        let Some(trans) = self.sys.trans_mut(id) else { return };
        if trans.call_ref != 0 {
            let call_ref = trans.call_ref;
            trans.call_ref = 0;
            self.send_line(queue, now, SapMsgInner::LnReleaseReq(LnReleaseReq { call_ref, cause }));
        }
    }

    fn send_telegram(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, telegram: Telegram) {
        let chan = &self.sys.channels[chan_idx];
        let distributed = chan.mode == TxMode::TrafficDistributed;
        tracing::debug!("-> {} (chan {})", telegram, chan.nr);
        queue.push_back(SapMsg {
            sap: Sap::McSap,
            src: CnetzEntity::CallControl,
            dest: CnetzEntity::Coder,
            time: now,
            msg: SapMsgInner::McTelegramReq(McTelegramReq {
                chan_nr: chan.nr,
                sdu: telegram.encode(),
                slot: now.add_slots(1),
                distributed,
            }),
        });
    }

    fn cell_code(&self) -> u8 {
        self.config.config().cell.cell_code
    }

    // ------------------------------------------------------------------
    // Channel allocation and hand-off

    fn queued_count(&self) -> usize {
        self.sys
            .ids()
            .iter()
            .filter(|&&id| self.sys.trans(id).is_some_and(|t| t.state.is_queued()))
            .count()
    }

    /// Could a new traffic leg be placed right now (free channel or queue)?
    fn placement_available(&self, extended_ok: bool) -> bool {
        let cfg = self.config.config();
        if select_traffic_channel(&self.sys.channels, extended_ok, cfg.cell.extended_band_start).is_ok() {
            return true;
        }
        cfg.cell.queueing && self.queued_count() < cfg.cell.queue_size
    }

    /// Grant a traffic channel: flush whatever still sits on the target,
    /// relink the transaction, schedule the mode switch two slots ahead and
    /// copy the receive-clock phase over from the control channel.
    fn grant_channel(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId, target_idx: usize) {
        let victims: Vec<TransId> = self.sys.channels[target_idx]
            .linked()
            .iter()
            .copied()
            .filter(|&v| v != id)
            .collect();
        for victim in victims {
            tracing::info!("flushing transaction #{} from granted channel", victim);
            self.flush_transaction(queue, now, victim);
        }

        let Some(trans) = self.sys.trans(id) else { return };
        let terminating = trans.terminating;
        let ctrl_idx = trans.control_chan_idx;

        self.sys.relink(id, target_idx);
        let state = if terminating { TransState::PageGranted } else { TransState::CallGranted };
        self.enter_state(id, state, now);
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.repeat = ASSIGN_REPEATS;
        }

        let target_nr = self.sys.channels[target_idx].nr;
        let ctrl_nr = self.sys.channels[ctrl_idx].nr;
        self.sys.channels[target_idx].reserved = true;
        self.sys.channels[target_idx].schedule_mode(now, TxMode::TrafficConcentrated);

        queue.push_back(SapMsg {
            sap: Sap::FsSap,
            src: CnetzEntity::CallControl,
            dest: CnetzEntity::Phy,
            time: now,
            msg: SapMsgInner::FsClockCopyReq(FsClockCopyReq { from_chan: ctrl_nr, to_chan: target_nr }),
        });
        queue.push_back(SapMsg {
            sap: Sap::FsSap,
            src: CnetzEntity::CallControl,
            dest: CnetzEntity::Phy,
            time: now,
            msg: SapMsgInner::FsModeReq(FsModeReq { chan_nr: target_nr, distributed: false }),
        });
    }

    /// Return a channel that carried (or was reserved for) a traffic leg to
    /// its resting mode. Also overwrites a still-pending traffic switch.
    fn restore_channel_mode(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize) {
        let chan = &mut self.sys.channels[chan_idx];
        chan.reserved = false;
        let mode = if chan.is_control_capable() { TxMode::ControlBroadcast } else { TxMode::Off };
        let nr = chan.nr;
        chan.schedule_mode(now, mode);
        queue.push_back(SapMsg {
            sap: Sap::FsSap,
            src: CnetzEntity::CallControl,
            dest: CnetzEntity::Phy,
            time: now,
            msg: SapMsgInner::FsModeReq(FsModeReq { chan_nr: nr, distributed: false }),
        });
    }

    /// Place a leg on a traffic channel, or queue it.
    /// Returns false if neither is possible.
    fn try_place(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId) -> bool {
        let cfg = self.config.config();
        let Some(trans) = self.sys.trans(id) else { return false };
        let extended_ok = trans.extended_band;
        let terminating = trans.terminating;
        let futln = trans.futln;
        let ctrl_idx = trans.control_chan_idx;

        match select_traffic_channel(&self.sys.channels, extended_ok, cfg.cell.extended_band_start) {
            Ok(target_idx) => {
                self.grant_channel(queue, now, id, target_idx);
                true
            }
            Err(_) => {
                if cfg.cell.queueing && self.queued_count() < cfg.cell.queue_size {
                    let state = if terminating { TransState::PageQueued } else { TransState::CallQueued };
                    self.enter_state(id, state, now);
                    if !terminating {
                        // tell the mobile it has been queued
                        self.oneshot.push((ctrl_idx, Telegram::QueueNotify(QueueNotify { futln })));
                    }
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Queue preemption: a channel freed while legs sit in the queue
    /// promotes the earliest leg directly to channel-grant processing,
    /// bypassing the queue timer.
    fn promote_queued(&mut self, queue: &mut MessageQueue, now: SlotTime) {
        let cfg = self.config.config();
        let queued: Vec<TransId> = self
            .sys
            .ids()
            .into_iter()
            .filter(|&id| self.sys.trans(id).is_some_and(|t| t.state.is_queued()))
            .collect();
        for id in queued {
            let Some(trans) = self.sys.trans(id) else { continue };
            let extended_ok = trans.extended_band;
            if let Ok(target_idx) =
                select_traffic_channel(&self.sys.channels, extended_ok, cfg.cell.extended_band_start)
            {
                tracing::debug!("queued #{} promoted to channel grant", id);
                self.grant_channel(queue, now, id, target_idx);
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown paths

    /// Flush a transaction without further radio signaling (channel grant
    /// steals the channel, shutdown, stale duplicates)
    fn flush_transaction(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId) {
        let Some(trans) = self.sys.trans(id) else { return };
        let futln = trans.futln;
        self.release_line(queue, now, id, Cause::OutOfOrder);
        self.sys.registry.set_busy(futln, false, now);
        self.sys.destroy_transaction(id);
    }

    /// Reject a control-phase leg: release the line side, tell the mobile
    /// (originating legs only) and destroy. Nothing persists.
    fn reject_and_destroy(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId, cause: Cause) {
        let Some(trans) = self.sys.trans(id) else { return };
        let futln = trans.futln;
        let terminating = trans.terminating;
        let ctrl_idx = trans.control_chan_idx;
        let on_traffic = trans.chan_idx != ctrl_idx;

        self.release_line(queue, now, id, cause);
        self.sys.registry.set_busy(futln, false, now);
        if !terminating {
            self.oneshot.push((ctrl_idx, Telegram::Reject(Reject { futln, cause })));
        }
        if on_traffic {
            let chan_idx = self.sys.trans(id).map(|t| t.chan_idx);
            self.sys.destroy_transaction(id);
            if let Some(chan_idx) = chan_idx {
                self.restore_channel_mode(queue, now, chan_idx);
            }
        } else {
            self.sys.destroy_transaction(id);
        }
    }

    /// Release a leg with a cause. On the traffic channel this runs the
    /// ReleaseBase handshake; on the control channel it degenerates to a
    /// reject.
    fn release_with(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId, cause: Cause) {
        let Some(trans) = self.sys.trans(id) else { return };
        let futln = trans.futln;
        let state = trans.state;
        tracing::info!("releasing {} cause {}", trans, cause);

        self.release_line(queue, now, id, cause);
        self.sys.registry.set_busy(futln, false, now);

        let on_traffic_exchange = matches!(
            state,
            TransState::PageAckWait
                | TransState::SeizureWait
                | TransState::ChallengeSent
                | TransState::ChallengeWait
                | TransState::HoldAckWait
                | TransState::Ringing
                | TransState::ConnectThrough
                | TransState::Active
        );
        if on_traffic_exchange {
            self.enter_state(id, TransState::ReleaseBase, now);
            if let Some(trans) = self.sys.trans_mut(id) {
                trans.retry = 0;
                trans.repeat = 1;
                trans.release_cause = Some(cause);
            }
        } else {
            self.reject_and_destroy(queue, now, id, cause);
        }
    }

    /// The ReleaseBase handshake finished (acknowledged or repeats spent)
    fn finish_release(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId) {
        let Some(trans) = self.sys.trans(id) else { return };
        let chan_idx = trans.chan_idx;
        self.sys.destroy_transaction(id);
        self.restore_channel_mode(queue, now, chan_idx);
    }

    // ------------------------------------------------------------------
    // Received telegrams

    fn rx_mc_telegram_ind(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        let now = message.time;
        let SapMsgInner::McTelegramInd(mut prim) = message.msg else { panic!() };

        let telegram = match Telegram::from_bitbuf(&mut prim.sdu) {
            Ok(telegram) => telegram,
            Err(e) => {
                tracing::debug!("chan {}: unparseable telegram: {:?}", prim.chan_nr, e);
                return;
            }
        };

        tracing::debug!(
            "<- {} (chan {} errors {} level {:.2} offset {:+.2} jitter {:.2})",
            telegram,
            prim.chan_nr,
            prim.bit_errors,
            prim.level,
            prim.time_offset,
            prim.jitter
        );

        if !telegram.opcode().is_uplink() {
            tracing::warn!("downlink opcode {} received, discarded", telegram.opcode());
            return;
        }

        // validation before any state change: cell match first
        if let Some(code) = telegram.cell_code() {
            if code != self.cell_code() {
                tracing::debug!("telegram for cell {} ignored (we are {})", code, self.cell_code());
                return;
            }
        }

        let Some(chan_idx) = self.sys.chan_idx_by_nr(prim.chan_nr) else {
            tracing::warn!("telegram on unknown channel {}", prim.chan_nr);
            return;
        };

        // auto-polarity bookkeeping
        if self.sys.channels[chan_idx].rx_inverted != prim.inverted {
            tracing::info!("chan {}: receive polarity now inverted={}", prim.chan_nr, prim.inverted);
            self.sys.channels[chan_idx].rx_inverted = prim.inverted;
        }

        match telegram {
            Telegram::RegisterRequest(pdu) => self.rx_access_request(queue, now, chan_idx, &pdu, false),
            Telegram::RoamRequest(pdu) => {
                let pdu = RegisterRequest {
                    futln: pdu.futln,
                    cell_code: pdu.cell_code,
                    chip_card: pdu.chip_card,
                    extended_band: pdu.extended_band,
                    card_code: pdu.card_code,
                };
                self.rx_access_request(queue, now, chan_idx, &pdu, true)
            }
            Telegram::CallRequest(pdu) => self.rx_call_request(queue, now, chan_idx, pdu),
            Telegram::DialDigits(pdu) => self.rx_dial_digits(queue, now, chan_idx, pdu),
            Telegram::SeizureConfirm(pdu) => self.rx_seizure_confirm(queue, now, chan_idx, pdu.futln),
            Telegram::AuthResponse(pdu) => self.rx_auth_response(queue, now, chan_idx, pdu),
            Telegram::ConnectionHoldAck(pdu) => self.rx_hold_ack(queue, now, chan_idx, pdu.futln),
            Telegram::RingAck(pdu) => self.rx_ring_ack(queue, now, chan_idx, pdu.futln),
            Telegram::Answer(pdu) => self.rx_answer(queue, now, chan_idx, pdu.futln),
            Telegram::ConnectAck(pdu) => self.rx_connect_ack(queue, now, chan_idx, pdu.futln),
            Telegram::ReleaseMobile(pdu) => self.rx_release_mobile(queue, now, chan_idx, pdu),
            Telegram::ReleaseBaseAck(pdu) => self.rx_release_base_ack(queue, now, chan_idx, pdu.futln),
            Telegram::ProbeAck(pdu) => {
                self.sys.registry.probe_confirmed(pdu.futln, now);
            }
            other => {
                tracing::warn!("unhandled uplink telegram {}", other);
            }
        }
    }

    /// Find a leg for a traffic-channel telegram: subscriber identity and
    /// owning channel must both match, otherwise the telegram is discarded
    /// without any state change.
    fn find_leg(&self, chan_idx: usize, futln: Futln, states: StateSet) -> Option<TransId> {
        let id = self.sys.find_by_futln(futln, states)?;
        let trans = self.sys.trans(id)?;
        if trans.chan_idx != chan_idx {
            tracing::debug!("telegram from {} on wrong channel, ignored", futln);
            return None;
        }
        Some(id)
    }

    fn rx_access_request(
        &mut self,
        _queue: &mut MessageQueue,
        now: SlotTime,
        chan_idx: usize,
        pdu: &RegisterRequest,
        roaming: bool,
    ) {
        if !self.sys.channels[chan_idx].in_control_mode() {
            tracing::debug!("access request on non-control channel, ignored");
            return;
        }
        // a repeated random access replaces the previous attempt
        if let Some(old) = self.sys.find_by_futln(
            pdu.futln,
            StateSet::of(&[TransState::AttachPending, TransState::RoamPending]),
        ) {
            self.sys.destroy_transaction(old);
        } else if self.sys.find_by_futln(pdu.futln, StateSet::ANY).is_some() {
            tracing::debug!("registration from {} while another leg is live, ignored", pdu.futln);
            return;
        }

        let chan_nr = self.sys.channels[chan_idx].nr;
        self.sys
            .registry
            .seen(pdu.futln, chan_nr, pdu.chip_card, pdu.extended_band, now);

        let state = if roaming { TransState::RoamPending } else { TransState::AttachPending };
        let id = self.sys.create_transaction(pdu.futln, chan_idx, state, now);
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.chip_card = pdu.chip_card;
            trans.extended_band = pdu.extended_band;
            trans.card_code = pdu.card_code;
        }
    }

    fn rx_call_request(&mut self, _queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, pdu: CallRequest) {
        if !self.sys.channels[chan_idx].in_control_mode() {
            return;
        }
        if let Some(old) = self.sys.find_by_futln(
            pdu.futln,
            StateSet::of(&[TransState::DialInvited, TransState::DialReceived]),
        ) {
            // Aloha retry of the request
            self.sys.destroy_transaction(old);
        } else if self.sys.find_by_futln(pdu.futln, StateSet::ANY).is_some() {
            tracing::debug!("call request from {} while another leg is live, ignored", pdu.futln);
            return;
        }

        let chan_nr = self.sys.channels[chan_idx].nr;
        self.sys
            .registry
            .seen(pdu.futln, chan_nr, pdu.chip_card, pdu.extended_band, now);

        let id = self.sys.create_transaction(pdu.futln, chan_idx, TransState::DialInvited, now);
        self.enter_state(id, TransState::DialInvited, now);
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.chip_card = pdu.chip_card;
            trans.extended_band = pdu.extended_band;
            trans.card_code = pdu.card_code;
            trans.repeat = 1;
        }
    }

    fn rx_dial_digits(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, pdu: DialDigits) {
        let states = StateSet::of(&[TransState::DialInvited, TransState::DialReceived]);
        let Some(id) = self.find_leg(chan_idx, pdu.futln, states) else {
            tracing::debug!("dial digits from {} without a dialing leg, ignored", pdu.futln);
            return;
        };

        let state = self.sys.trans(id).map(|t| t.state);
        match (state, pdu.high) {
            (Some(TransState::DialInvited), false) => {
                let complete = pdu.digits.len() < cnetz_telegrams::digits::DIGITS_PER_BLOCK;
                if let Some(trans) = self.sys.trans_mut(id) {
                    trans.dialed = pdu.digits;
                }
                if complete {
                    self.dial_complete(queue, now, id);
                } else {
                    // a full first block means a second block follows
                    self.enter_state(id, TransState::DialReceived, now);
                }
            }
            (Some(TransState::DialReceived), true) => {
                if let Some(trans) = self.sys.trans_mut(id) {
                    trans.dialed.push_str(&pdu.digits);
                }
                self.dial_complete(queue, now, id);
            }
            (Some(TransState::DialInvited), true) | (Some(TransState::DialReceived), false) => {
                // retransmission or out-of-order block
                tracing::debug!("out-of-order digit block from {}, ignored", pdu.futln);
            }
            _ => {}
        }
    }

    /// All digits collected: consult the network, then allocate or queue
    fn dial_complete(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId) {
        self.enter_state(id, TransState::AcceptPending, now);

        let Some(trans) = self.sys.trans(id) else { return };
        let futln = trans.futln;
        let dialed = trans.dialed.clone();
        let extended_ok = trans.extended_band;
        tracing::info!("{} dials \"{}\"", futln, dialed);

        // capacity is checked before the network is involved: an immediate
        // reject leaves no transaction behind
        if !self.placement_available(extended_ok) {
            tracing::info!("no channel for {}, rejecting", futln);
            self.reject_and_destroy(queue, now, id, Cause::NoChannel);
            return;
        }

        let call_ref = self.alloc_call_ref();
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.call_ref = call_ref;
        }
        self.sys.registry.set_busy(futln, true, now);
        self.send_line(
            queue,
            now,
            SapMsgInner::LnSetupReq(LnSetupReq { call_ref, caller: futln, dialed }),
        );

        let placed = self.try_place(queue, now, id);
        debug_assert!(placed, "placement_available was checked above");
    }

    fn rx_seizure_confirm(&mut self, _queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, futln: Futln) {
        let states = StateSet::of(&[TransState::PageAckWait, TransState::SeizureWait]);
        let Some(id) = self.find_leg(chan_idx, futln, states) else { return };

        let auth = self.config.config().cell.auth;
        let has_card = self.sys.trans(id).is_some_and(|t| t.card_code.is_some());
        if auth && has_card {
            self.enter_state(id, TransState::ChallengeSent, now);
            if let Some(trans) = self.sys.trans_mut(id) {
                trans.challenge = Some(rand::random::<u64>() & 0xFF_FFFF_FFFF);
                trans.retry = 0;
                trans.repeat = 1;
            }
        } else {
            self.enter_hold(id, now);
        }
    }

    fn enter_hold(&mut self, id: TransId, now: SlotTime) {
        self.enter_state(id, TransState::HoldAckWait, now);
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.retry = 0;
            trans.repeat = 1;
        }
    }

    fn rx_auth_response(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, pdu: AuthResponse) {
        let states = StateSet::of(&[TransState::ChallengeWait]);
        let Some(id) = self.find_leg(chan_idx, pdu.futln, states) else { return };

        let Some(trans) = self.sys.trans(id) else { return };
        let challenge = trans.challenge.unwrap_or(0);
        let card_code = trans.card_code.unwrap_or(0);
        let expected = auth::expected_response(challenge, card_code);
        if pdu.response == expected {
            self.enter_hold(id, now);
        } else {
            // always fatal, regardless of retry budget
            tracing::warn!(
                "authentication failure for {}: response {:04X}, expected {:04X}",
                pdu.futln,
                pdu.response,
                expected
            );
            self.release_with(queue, now, id, Cause::AuthFailed);
        }
    }

    fn rx_hold_ack(&mut self, _queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, futln: Futln) {
        let states = StateSet::of(&[TransState::HoldAckWait, TransState::Active]);
        let Some(id) = self.find_leg(chan_idx, futln, states) else { return };

        match self.sys.trans(id).map(|t| t.state) {
            Some(TransState::HoldAckWait) => {
                let terminating = self.sys.trans(id).is_some_and(|t| t.terminating);
                if terminating {
                    self.enter_state(id, TransState::Ringing, now);
                    if let Some(trans) = self.sys.trans_mut(id) {
                        trans.retry = 0;
                    }
                } else {
                    self.enter_state(id, TransState::ConnectThrough, now);
                    if let Some(trans) = self.sys.trans_mut(id) {
                        trans.retry = 0;
                        trans.repeat = 1;
                    }
                }
            }
            Some(TransState::Active) => {
                // contact confirmed; next hold after the full interval
                if let Some(trans) = self.sys.trans_mut(id) {
                    trans.retry = 0;
                    trans.timer.start(now, self.timers.hold_interval);
                }
            }
            _ => {}
        }
    }

    fn rx_ring_ack(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, futln: Futln) {
        let states = StateSet::of(&[TransState::Ringing]);
        let Some(id) = self.find_leg(chan_idx, futln, states) else { return };
        let Some(trans) = self.sys.trans_mut(id) else { return };
        if !trans.alerted {
            trans.alerted = true;
            let call_ref = trans.call_ref;
            self.send_line(queue, now, SapMsgInner::LnAlertingReq(LnAlertingReq { call_ref }));
        }
    }

    fn rx_answer(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, futln: Futln) {
        let states = StateSet::of(&[TransState::Ringing]);
        let Some(id) = self.find_leg(chan_idx, futln, states) else { return };
        let Some(trans) = self.sys.trans(id) else { return };
        let call_ref = trans.call_ref;
        self.send_line(
            queue,
            now,
            SapMsgInner::LnAnswerReq(LnAnswerReq { call_ref, connected: futln }),
        );
        self.enter_state(id, TransState::ConnectThrough, now);
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.retry = 0;
            trans.repeat = 1;
        }
    }

    fn rx_connect_ack(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, futln: Futln) {
        let states = StateSet::of(&[TransState::ConnectThrough]);
        let Some(id) = self.find_leg(chan_idx, futln, states) else { return };

        self.enter_state(id, TransState::Active, now);
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.retry = 0;
            trans.repeat = 0;
        }
        // in-call signaling moves between the voice: distributed mode
        let chan_nr = self.sys.channels[chan_idx].nr;
        self.sys.channels[chan_idx].schedule_mode(now, TxMode::TrafficDistributed);
        queue.push_back(SapMsg {
            sap: Sap::FsSap,
            src: CnetzEntity::CallControl,
            dest: CnetzEntity::Phy,
            time: now,
            msg: SapMsgInner::FsModeReq(FsModeReq { chan_nr, distributed: true }),
        });
    }

    fn rx_release_mobile(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, pdu: ReleaseMobile) {
        let Some(id) = self.find_leg(chan_idx, pdu.futln, StateSet::ANY) else {
            // quittance anyway so the mobile stops repeating; only control
            // channels drain one-shots
            if self.sys.channels[chan_idx].in_control_mode() {
                self.oneshot
                    .push((chan_idx, Telegram::ReleaseMobileAck(ReleaseMobileAck { futln: pdu.futln })));
            }
            return;
        };

        tracing::info!("{} released by subscriber, cause {}", pdu.futln, pdu.cause);
        self.release_line(queue, now, id, pdu.cause);
        self.sys.registry.set_busy(pdu.futln, false, now);
        self.enter_state(id, TransState::ReleaseMobile, now);
    }

    fn rx_release_base_ack(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize, futln: Futln) {
        let states = StateSet::of(&[TransState::ReleaseBase]);
        let Some(id) = self.find_leg(chan_idx, futln, states) else { return };
        self.finish_release(queue, now, id);
    }

    // ------------------------------------------------------------------
    // Line primitives

    fn rx_ln_setup_ind(&mut self, queue: &mut MessageQueue, now: SlotTime, prim: LnSetupInd) {
        let reject = |this: &Self, queue: &mut MessageQueue, cause: Cause| {
            this.send_line(
                queue,
                now,
                SapMsgInner::LnSetupRes(LnSetupRes {
                    dialed: prim.dialed.clone(),
                    accept: None,
                    cause: Some(cause),
                }),
            );
        };

        let Some(futln) = Futln::from_digits(&prim.dialed) else {
            tracing::info!("setup request for invalid number \"{}\"", prim.dialed);
            reject(self, queue, Cause::InvalidNumber);
            return;
        };

        let Some(entry) = self.sys.registry.get(futln) else {
            tracing::info!("setup request for unknown subscriber {}", futln);
            reject(self, queue, Cause::SubscriberGone);
            return;
        };
        let home_chan = entry.home_chan;
        let extended_band = entry.extended_band;
        let chip_card = entry.chip_card;

        if entry.busy || self.sys.find_by_futln(futln, StateSet::ANY).is_some() {
            reject(self, queue, Cause::BusySubscriber);
            return;
        }

        // capacity check first: a no-channel reject leaves nothing behind
        if !self.placement_available(extended_band) {
            tracing::info!("no channel for terminating call to {}", futln);
            reject(self, queue, Cause::NoChannel);
            return;
        }

        let ctrl_idx = self
            .sys
            .chan_idx_by_nr(home_chan)
            .filter(|&idx| self.sys.channels[idx].in_control_mode())
            .or_else(|| self.sys.channels.iter().position(|c| c.in_control_mode()));
        let Some(ctrl_idx) = ctrl_idx else {
            reject(self, queue, Cause::OutOfOrder);
            return;
        };

        let id = self.sys.create_transaction(futln, ctrl_idx, TransState::AcceptPending, now);
        let call_ref = self.alloc_call_ref();
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.terminating = true;
            trans.call_ref = call_ref;
            trans.extended_band = extended_band;
            trans.chip_card = chip_card;
        }
        self.sys.registry.set_busy(futln, true, now);
        self.send_line(
            queue,
            now,
            SapMsgInner::LnSetupRes(LnSetupRes {
                dialed: prim.dialed,
                accept: Some(call_ref),
                cause: None,
            }),
        );

        let placed = self.try_place(queue, now, id);
        debug_assert!(placed, "placement_available was checked above");
    }

    fn find_by_call_ref(&self, call_ref: CallRef) -> Option<TransId> {
        if call_ref == 0 {
            return None;
        }
        self.sys
            .ids()
            .into_iter()
            .find(|&id| self.sys.trans(id).is_some_and(|t| t.call_ref == call_ref))
    }

    fn rx_ln_disconnect_ind(&mut self, queue: &mut MessageQueue, now: SlotTime, prim: LnDisconnectInd) {
        let Some(id) = self.find_by_call_ref(prim.call_ref) else {
            tracing::warn!("disconnect for unknown call reference {}", prim.call_ref);
            return;
        };
        self.release_with(queue, now, id, prim.cause);
    }

    fn rx_ln_release_ind(&mut self, queue: &mut MessageQueue, now: SlotTime, prim: LnReleaseInd) {
        let Some(id) = self.find_by_call_ref(prim.call_ref) else { return };
        // the peer dropped the reference; do not report it back
        if let Some(trans) = self.sys.trans_mut(id) {
            trans.call_ref = 0;
        }
        self.release_with(queue, now, id, prim.cause);
    }

    fn rx_ln_audio_down(&mut self, queue: &mut MessageQueue, now: SlotTime, prim: LnAudioDownInd) {
        let Some(id) = self.find_by_call_ref(prim.call_ref) else { return };
        let Some(trans) = self.sys.trans(id) else { return };
        if trans.state != TransState::Active {
            return;
        }
        let chan_nr = self.sys.channels[trans.chan_idx].nr;
        queue.push_back(SapMsg {
            sap: Sap::FsSap,
            src: CnetzEntity::CallControl,
            dest: CnetzEntity::Phy,
            time: now,
            msg: SapMsgInner::FsVoiceReq(FsVoiceReq { chan_nr, samples: prim.samples }),
        });
    }

    fn rx_fs_voice_ind(&mut self, queue: &mut MessageQueue, now: SlotTime, prim: cnetz_saps::fs::FsVoiceInd) {
        let Some(chan_idx) = self.sys.chan_idx_by_nr(prim.chan_nr) else { return };
        let ids = self.sys.find_on_channel(chan_idx, StateSet::of(&[TransState::Active]));
        let Some(&id) = ids.first() else { return };
        let Some(trans) = self.sys.trans(id) else { return };
        if trans.call_ref != 0 {
            let call_ref = trans.call_ref;
            self.send_line(
                queue,
                now,
                SapMsgInner::LnAudioUpReq(LnAudioUpReq { call_ref, samples: prim.samples }),
            );
        }
    }

    // ------------------------------------------------------------------
    // Timers

    fn timer_pass(&mut self, queue: &mut MessageQueue, now: SlotTime) {
        for id in self.sys.ids() {
            let expired = self.sys.trans(id).is_some_and(|t| t.timer.has_expired(now));
            if expired {
                self.on_timeout(queue, now, id);
            }
        }
    }

    /// Timer expiry. The state is always re-checked here; a race that
    /// already advanced the leg leaves the timer restarted or stopped.
    fn on_timeout(&mut self, queue: &mut MessageQueue, now: SlotTime, id: TransId) {
        let Some(trans) = self.sys.trans(id) else { return };
        let state = trans.state;
        let row = self.state_row(state);
        tracing::debug!("timeout of #{} in {:?}", id, state);

        match state {
            TransState::PageQueued | TransState::CallQueued => {
                self.reject_and_destroy(queue, now, id, row.exhaust_cause);
            }
            TransState::PageDelay | TransState::CallDelay => {
                if !self.try_place(queue, now, id) {
                    self.reject_and_destroy(queue, now, id, row.exhaust_cause);
                }
            }
            TransState::DialInvited | TransState::DialReceived => {
                let Some(trans) = self.sys.trans_mut(id) else { return };
                if trans.retry < row.max_retries {
                    trans.retry += 1;
                    trans.repeat = 1;
                    trans.timer.start(now, row.timeout.unwrap_or(DELAY_SLOTS));
                } else {
                    // the mobile fell silent before the network was involved
                    let futln = trans.futln;
                    self.sys.registry.set_busy(futln, false, now);
                    self.sys.destroy_transaction(id);
                }
            }
            TransState::PageAckWait | TransState::SeizureWait => {
                let retry = trans.retry;
                let terminating = trans.terminating;
                if retry < row.max_retries {
                    // back to the control channel for another assignment round
                    let traffic_idx = trans.chan_idx;
                    let ctrl_idx = trans.control_chan_idx;
                    self.sys.relink(id, ctrl_idx);
                    self.restore_channel_mode(queue, now, traffic_idx);
                    let next = if terminating { TransState::PageDelay } else { TransState::CallDelay };
                    self.enter_state(id, next, now);
                    if let Some(trans) = self.sys.trans_mut(id) {
                        trans.retry = retry + 1;
                    }
                } else {
                    self.release_with(queue, now, id, row.exhaust_cause);
                }
            }
            TransState::ChallengeWait => {
                if trans.retry < row.max_retries {
                    let retry = trans.retry;
                    self.enter_state(id, TransState::ChallengeSent, now);
                    if let Some(trans) = self.sys.trans_mut(id) {
                        trans.retry = retry + 1;
                        trans.repeat = 1;
                    }
                } else {
                    self.release_with(queue, now, id, row.exhaust_cause);
                }
            }
            TransState::HoldAckWait | TransState::ConnectThrough => {
                let Some(trans) = self.sys.trans_mut(id) else { return };
                if trans.retry < row.max_retries {
                    trans.retry += 1;
                    trans.repeat = 1;
                    trans.timer.start(now, row.timeout.unwrap_or(DELAY_SLOTS));
                } else {
                    self.release_with(queue, now, id, row.exhaust_cause);
                }
            }
            TransState::Ringing => {
                self.release_with(queue, now, id, row.exhaust_cause);
            }
            TransState::Active => {
                let Some(trans) = self.sys.trans_mut(id) else { return };
                trans.retry += 1;
                if trans.retry > row.max_retries {
                    // the subscriber stopped answering holds
                    self.release_with(queue, now, id, row.exhaust_cause);
                } else {
                    trans.repeat = 1;
                    trans.timer.start(now, row.timeout.unwrap_or(DELAY_SLOTS));
                }
            }
            TransState::ReleaseBase => {
                let Some(trans) = self.sys.trans_mut(id) else { return };
                if trans.retry < row.max_retries {
                    trans.retry += 1;
                    trans.repeat = 1;
                    trans.timer.start(now, RELEASE_TX_INTERVAL);
                } else {
                    // quittance never came; give up
                    self.finish_release(queue, now, id);
                }
            }
            TransState::ReleaseMobile => {
                // the quittance should have gone out by now
                self.sys.destroy_transaction(id);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Registry probing

    fn registry_pass(&mut self, now: SlotTime) {
        for event in self.sys.registry.tick(now) {
            match event {
                RegistryEvent::ProbeDue(futln) => {
                    let home = self.sys.registry.get(futln).map(|e| e.home_chan);
                    let ctrl_idx = home
                        .and_then(|nr| self.sys.chan_idx_by_nr(nr))
                        .filter(|&idx| self.sys.channels[idx].is_control_capable());
                    match ctrl_idx {
                        Some(idx) if self.sys.channels[idx].in_control_mode() => {
                            self.oneshot.push((idx, Telegram::Probe(Probe { futln })));
                            self.sys.registry.probe_sent(futln, now);
                        }
                        _ => {
                            // the control channel is busy handling voice:
                            // assume the probe succeeded
                            self.sys.registry.probe_assumed(futln, now);
                        }
                    }
                }
                RegistryEvent::Evicted(futln) => {
                    tracing::info!("subscriber {} gone after failed probes", futln);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-slot transmit scheduling

    fn schedule_control_tx(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize) {
        // one-shots first
        if let Some(pos) = self.oneshot.iter().position(|(idx, _)| *idx == chan_idx) {
            let (_, telegram) = self.oneshot.remove(pos);
            self.send_telegram(queue, now, chan_idx, telegram);
            return;
        }

        // channel assignments of legs granted away from this control channel
        for id in self.sys.ids() {
            let Some(trans) = self.sys.trans(id) else { continue };
            let granted = matches!(trans.state, TransState::PageGranted | TransState::CallGranted);
            if !granted || trans.control_chan_idx != chan_idx || trans.repeat == 0 {
                continue;
            }
            let target = &self.sys.channels[trans.chan_idx];
            let telegram = Telegram::ChannelAssign(ChannelAssign {
                futln: trans.futln,
                chan: target.nr,
                combined: target.role == ChannelRole::Combined,
                terminating: trans.terminating,
            });
            let terminating = trans.terminating;
            self.send_telegram(queue, now, chan_idx, telegram);
            let Some(trans) = self.sys.trans_mut(id) else { return };
            trans.repeat -= 1;
            trans.last_tx = Some(now);
            if trans.repeat == 0 {
                // assignment out; await the quittance on the traffic channel
                let next = if terminating { TransState::PageAckWait } else { TransState::SeizureWait };
                self.enter_state(id, next, now);
            }
            return;
        }

        // per-transaction control telegrams
        let cell_code = self.cell_code();
        for id in self.sys.find_on_channel(chan_idx, StateSet::ANY) {
            let Some(trans) = self.sys.trans(id) else { continue };
            let futln = trans.futln;
            match trans.state {
                TransState::AttachPending => {
                    let telegram = Telegram::RegisterAck(RegisterAck { futln, cell_code });
                    self.send_telegram(queue, now, chan_idx, telegram);
                    self.sys.destroy_transaction(id);
                    return;
                }
                TransState::RoamPending => {
                    let telegram = Telegram::RoamAck(RoamAck { futln, cell_code });
                    self.send_telegram(queue, now, chan_idx, telegram);
                    self.sys.destroy_transaction(id);
                    return;
                }
                TransState::DialInvited if trans.repeat > 0 => {
                    let telegram = Telegram::DialInvite(DialInvite { futln });
                    self.send_telegram(queue, now, chan_idx, telegram);
                    if let Some(trans) = self.sys.trans_mut(id) {
                        trans.repeat -= 1;
                        trans.last_tx = Some(now);
                    }
                    return;
                }
                TransState::ReleaseMobile => {
                    let telegram = Telegram::ReleaseMobileAck(ReleaseMobileAck { futln });
                    self.send_telegram(queue, now, chan_idx, telegram);
                    self.sys.destroy_transaction(id);
                    return;
                }
                _ => {}
            }
        }

        // nothing pending: the control channel never goes silent
        let tx_slot = now.add_slots(1);
        let cfg = self.config.config();
        let telegram = Telegram::IdleSignal(IdleSignal {
            cell_code,
            slot_nr: tx_slot.slot,
            queueing: cfg.cell.queueing,
            auth: cfg.cell.auth,
            extended_band: cfg.channels.iter().any(|c| c.nr >= cfg.cell.extended_band_start),
        });
        self.send_telegram(queue, now, chan_idx, telegram);
    }

    fn schedule_traffic_tx(&mut self, queue: &mut MessageQueue, now: SlotTime, chan_idx: usize) {
        let ids = self.sys.find_on_channel(chan_idx, StateSet::ANY);
        let Some(&id) = ids.first() else { return };
        let Some(trans) = self.sys.trans(id) else { return };
        let futln = trans.futln;

        match trans.state {
            TransState::PageAckWait | TransState::SeizureWait => {
                // transmitted every slot until the mobile confirms seizure
                let telegram = Telegram::SeizureAck(SeizureAck { futln });
                self.send_telegram(queue, now, chan_idx, telegram);
            }
            TransState::ChallengeSent if trans.repeat > 0 => {
                let challenge = trans.challenge.unwrap_or(0);
                let telegram = Telegram::AuthChallenge(AuthChallenge { futln, challenge });
                self.send_telegram(queue, now, chan_idx, telegram);
                // transmission-only state: advance once sent
                self.enter_state(id, TransState::ChallengeWait, now);
            }
            TransState::HoldAckWait if trans.repeat > 0 => {
                let telegram = Telegram::ConnectionHold(ConnectionHold { futln });
                self.send_telegram(queue, now, chan_idx, telegram);
                if let Some(trans) = self.sys.trans_mut(id) {
                    trans.repeat -= 1;
                    trans.last_tx = Some(now);
                }
            }
            TransState::Ringing => {
                let due = trans.last_tx.map_or(true, |t| now.diff(t) >= RING_TX_INTERVAL);
                if due {
                    let telegram = Telegram::Ring(Ring { futln });
                    self.send_telegram(queue, now, chan_idx, telegram);
                    if let Some(trans) = self.sys.trans_mut(id) {
                        trans.last_tx = Some(now);
                    }
                }
            }
            TransState::ConnectThrough if trans.repeat > 0 => {
                let telegram = Telegram::Connect(Connect { futln });
                self.send_telegram(queue, now, chan_idx, telegram);
                if let Some(trans) = self.sys.trans_mut(id) {
                    trans.repeat -= 1;
                    trans.last_tx = Some(now);
                }
            }
            TransState::Active if trans.repeat > 0 => {
                let telegram = Telegram::ConnectionHold(ConnectionHold { futln });
                self.send_telegram(queue, now, chan_idx, telegram);
                if let Some(trans) = self.sys.trans_mut(id) {
                    trans.repeat -= 1;
                    trans.last_tx = Some(now);
                }
            }
            TransState::ReleaseBase if trans.repeat > 0 => {
                let cause = trans.release_cause.unwrap_or(Cause::NormalRelease);
                let telegram = Telegram::ReleaseBase(ReleaseBase { futln, cause });
                self.send_telegram(queue, now, chan_idx, telegram);
                if let Some(trans) = self.sys.trans_mut(id) {
                    trans.repeat -= 1;
                    trans.last_tx = Some(now);
                }
            }
            TransState::ReleaseMobile => {
                let telegram = Telegram::ReleaseMobileAck(ReleaseMobileAck { futln });
                self.send_telegram(queue, now, chan_idx, telegram);
                self.sys.destroy_transaction(id);
                self.restore_channel_mode(queue, now, chan_idx);
            }
            _ => {}
        }
    }
}

impl CnetzEntityTrait for CcBs {
    fn entity(&self) -> CnetzEntity {
        CnetzEntity::CallControl
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }

    fn rx_prim(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        let now = message.time;
        match message.msg {
            SapMsgInner::McTelegramInd(_) => self.rx_mc_telegram_ind(queue, message),
            SapMsgInner::LnSetupInd(prim) => self.rx_ln_setup_ind(queue, now, prim),
            SapMsgInner::LnDisconnectInd(prim) => self.rx_ln_disconnect_ind(queue, now, prim),
            SapMsgInner::LnReleaseInd(prim) => self.rx_ln_release_ind(queue, now, prim),
            SapMsgInner::LnAudioDownInd(prim) => self.rx_ln_audio_down(queue, now, prim),
            SapMsgInner::FsVoiceInd(prim) => self.rx_fs_voice_ind(queue, now, prim),
            other => panic!("unexpected primitive for CallControl: {:?}", other),
        }
    }

    fn tick_start(&mut self, queue: &mut MessageQueue, ts: SlotTime) {
        let now = ts;
        for chan in &mut self.sys.channels {
            chan.tick(now);
        }
        self.registry_pass(now);
        // promotions run before the timer pass: a channel freed in this
        // slot beats a queue timer firing in this slot
        self.promote_queued(queue, now);
        self.timer_pass(queue, now);

        let queued = self.queued_count();
        let attached = self.sys.registry.len();
        let mut state = self.config.state_write();
        state.queue_len = queued;
        state.attached = attached;
    }

    fn tick_end(&mut self, queue: &mut MessageQueue, ts: SlotTime) -> bool {
        for chan_idx in 0..self.sys.channels.len() {
            match self.sys.channels[chan_idx].mode {
                TxMode::Off => {}
                TxMode::ControlBroadcast => self.schedule_control_tx(queue, ts, chan_idx),
                TxMode::TrafficConcentrated | TxMode::TrafficDistributed => {
                    self.schedule_traffic_tx(queue, ts, chan_idx)
                }
            }
        }
        false
    }

    fn shutdown(&mut self, queue: &mut MessageQueue, ts: SlotTime) {
        // forcibly release every owned transaction before the channels go
        for id in self.sys.ids() {
            self.release_line(queue, ts, id, Cause::NormalRelease);
            self.sys.destroy_transaction(id);
        }
        for chan in &mut self.sys.channels {
            chan.state = crate::cc::channel::ChannelState::Null;
            chan.mode = TxMode::Off;
        }
        self.sys.registry.flush();
    }
}

#[cfg(test)]
mod tests {
    use cnetz_config::{CfgChannel, ChannelRole, StackConfig};
    use cnetz_saps::mc::McTelegramInd;

    use super::*;

    const ALL_STATES: [TransState; 21] = [
        TransState::AttachPending,
        TransState::RoamPending,
        TransState::PageQueued,
        TransState::PageDelay,
        TransState::PageGranted,
        TransState::PageAckWait,
        TransState::DialInvited,
        TransState::DialReceived,
        TransState::AcceptPending,
        TransState::CallQueued,
        TransState::CallDelay,
        TransState::CallGranted,
        TransState::SeizureWait,
        TransState::ChallengeSent,
        TransState::ChallengeWait,
        TransState::HoldAckWait,
        TransState::Ringing,
        TransState::ConnectThrough,
        TransState::Active,
        TransState::ReleaseBase,
        TransState::ReleaseMobile,
    ];

    fn futln_a() -> Futln {
        Futln::new(2, 17, 54321)
    }

    fn futln_b() -> Futln {
        Futln::new(1, 3, 42)
    }

    fn shared_config(channels: Vec<CfgChannel>, queueing: bool, auth: bool) -> SharedConfig {
        let mut cfg = StackConfig::new(7, channels);
        cfg.cell.queueing = queueing;
        cfg.cell.auth = auth;
        SharedConfig::from_config(cfg)
    }

    fn two_channel_cell(queueing: bool, auth: bool) -> SharedConfig {
        shared_config(
            vec![
                CfgChannel { nr: 131, role: ChannelRole::Control },
                CfgChannel { nr: 287, role: ChannelRole::Traffic },
            ],
            queueing,
            auth,
        )
    }

    struct Harness {
        cc: CcBs,
        now: SlotTime,
    }

    impl Harness {
        fn new(config: SharedConfig) -> Self {
            Self { cc: CcBs::new(config), now: SlotTime::default() }
        }

        /// One full slot: scheduler pass plus transmit selection
        fn step(&mut self) -> Vec<SapMsgInner> {
            let mut queue = MessageQueue::new();
            self.cc.tick_start(&mut queue, self.now);
            self.cc.tick_end(&mut queue, self.now);
            self.now = self.now.add_slots(1);
            drain(queue)
        }

        /// Deliver a decoded uplink telegram
        fn rx(&mut self, chan_nr: u16, telegram: Telegram) -> Vec<SapMsgInner> {
            let mut queue = MessageQueue::new();
            self.cc.rx_prim(
                &mut queue,
                SapMsg {
                    sap: Sap::McSap,
                    src: CnetzEntity::Coder,
                    dest: CnetzEntity::CallControl,
                    time: self.now,
                    msg: SapMsgInner::McTelegramInd(McTelegramInd {
                        chan_nr,
                        sdu: telegram.encode(),
                        bit_errors: 0,
                        level: 2.0,
                        time_offset: 0.0,
                        jitter: 0.1,
                        inverted: false,
                    }),
                },
            );
            drain(queue)
        }

        /// Deliver a line primitive
        fn rx_line(&mut self, msg: SapMsgInner) -> Vec<SapMsgInner> {
            let mut queue = MessageQueue::new();
            self.cc.rx_prim(
                &mut queue,
                SapMsg {
                    sap: Sap::LnSap,
                    src: CnetzEntity::Line,
                    dest: CnetzEntity::CallControl,
                    time: self.now,
                    msg,
                },
            );
            drain(queue)
        }

        fn state_of(&self, futln: Futln) -> Option<TransState> {
            let id = self.cc.system().find_by_futln(futln, StateSet::ANY)?;
            self.cc.system().trans(id).map(|t| t.state)
        }

        fn register(&mut self, futln: Futln, card_code: Option<u16>) {
            self.rx(
                131,
                Telegram::RegisterRequest(RegisterRequest {
                    futln,
                    cell_code: 7,
                    chip_card: card_code.is_some(),
                    extended_band: false,
                    card_code,
                }),
            );
            self.step();
        }
    }

    fn drain(mut queue: MessageQueue) -> Vec<SapMsgInner> {
        let mut out = Vec::new();
        while let Some(msg) = queue.pop_front() {
            out.push(msg.msg);
        }
        out
    }

    /// Telegrams scheduled for transmission, decoded back for inspection
    fn sent(msgs: Vec<SapMsgInner>) -> Vec<(u16, Telegram)> {
        msgs.into_iter()
            .filter_map(|msg| match msg {
                SapMsgInner::McTelegramReq(mut req) => {
                    let telegram = Telegram::from_bitbuf(&mut req.sdu).expect("undecodable tx");
                    Some((req.chan_nr, telegram))
                }
                _ => None,
            })
            .collect()
    }

    fn find_tx(msgs: Vec<SapMsgInner>, chan_nr: u16, opcode: Opcode) -> Option<Telegram> {
        sent(msgs)
            .into_iter()
            .find(|(chan, telegram)| *chan == chan_nr && telegram.opcode() == opcode)
            .map(|(_, telegram)| telegram)
    }

    #[test]
    fn test_state_table_discipline() {
        let cc = CcBs::new(two_channel_cell(true, true));
        for state in ALL_STATES {
            let row = cc.state_row(state);
            // a state that awaits a response always has a timeout defined
            if !row.expects.is_empty() {
                assert!(row.timeout.is_some(), "{:?} awaits a response without a timer", state);
            }
        }
    }

    #[test]
    fn test_registration_flow() {
        let mut h = Harness::new(two_channel_cell(true, false));
        h.rx(
            131,
            Telegram::RegisterRequest(RegisterRequest {
                futln: futln_a(),
                cell_code: 7,
                chip_card: false,
                extended_band: false,
                card_code: None,
            }),
        );
        assert_eq!(h.state_of(futln_a()), Some(TransState::AttachPending));

        let msgs = h.step();
        let ack = find_tx(msgs, 131, Opcode::RegisterAck).expect("no RegisterAck");
        assert_eq!(ack.futln(), Some(futln_a()));
        // single request/acknowledge: nothing remains
        assert_eq!(h.cc.system().count(), 0);
        assert!(h.cc.system().registry.contains(futln_a()));
    }

    #[test]
    fn test_cell_mismatch_discarded() {
        let mut h = Harness::new(two_channel_cell(true, false));
        h.rx(
            131,
            Telegram::RegisterRequest(RegisterRequest {
                futln: futln_a(),
                cell_code: 9, // not our cell
                chip_card: false,
                extended_band: false,
                card_code: None,
            }),
        );
        assert_eq!(h.cc.system().count(), 0);
        assert!(!h.cc.system().registry.contains(futln_a()));
    }

    #[test]
    fn test_idle_broadcast_when_nothing_pending() {
        let mut h = Harness::new(two_channel_cell(true, false));
        let msgs = h.step();
        let idle = find_tx(msgs, 131, Opcode::IdleSignal).expect("control channel silent");
        let Telegram::IdleSignal(pdu) = idle else { panic!() };
        assert_eq!(pdu.cell_code, 7);
        assert!(pdu.queueing);
    }

    #[test]
    fn test_no_channel_reject_leaves_nothing() {
        let mut h = Harness::new(two_channel_cell(false, false));
        h.register(futln_a(), None);

        // terminating call to A occupies the only traffic channel
        let msgs = h.rx_line(SapMsgInner::LnSetupInd(LnSetupInd { dialed: "21754321".into() }));
        let accepted = msgs.iter().any(|m| {
            matches!(m, SapMsgInner::LnSetupRes(p) if p.accept.is_some())
        });
        assert!(accepted);
        assert_eq!(h.state_of(futln_a()), Some(TransState::PageGranted));

        // originating call from B now finds no channel
        h.rx(
            131,
            Telegram::CallRequest(CallRequest {
                futln: futln_b(),
                cell_code: 7,
                chip_card: false,
                extended_band: false,
                card_code: None,
            }),
        );
        let msgs = h.rx(
            131,
            Telegram::DialDigits(DialDigits { futln: futln_b(), high: false, digits: "0815".into() }),
        );
        // rejected immediately, network side never contacted
        assert!(!msgs.iter().any(|m| matches!(m, SapMsgInner::LnSetupReq(_))));
        assert_eq!(h.state_of(futln_b()), None);

        let msgs = h.step();
        let reject = find_tx(msgs, 131, Opcode::Reject).expect("no Reject transmitted");
        let Telegram::Reject(pdu) = reject else { panic!() };
        assert_eq!(pdu.cause, Cause::NoChannel);
        assert_eq!(pdu.futln, futln_b());
    }

    #[test]
    fn test_mt_setup_unknown_subscriber_rejected() {
        let mut h = Harness::new(two_channel_cell(true, false));
        let msgs = h.rx_line(SapMsgInner::LnSetupInd(LnSetupInd { dialed: "21754321".into() }));
        assert!(msgs.iter().any(|m| {
            matches!(m, SapMsgInner::LnSetupRes(p)
                if p.accept.is_none() && p.cause == Some(Cause::SubscriberGone))
        }));
        assert_eq!(h.cc.system().count(), 0);
    }

    #[test]
    fn test_queue_preemption_on_channel_free() {
        let mut h = Harness::new(two_channel_cell(true, false));
        h.register(futln_a(), None);

        // A's terminating call takes the traffic channel
        let msgs = h.rx_line(SapMsgInner::LnSetupInd(LnSetupInd { dialed: "21754321".into() }));
        let ref_a = msgs
            .iter()
            .find_map(|m| match m {
                SapMsgInner::LnSetupRes(p) => p.accept,
                _ => None,
            })
            .expect("MT setup not accepted");

        // B's originating call has to queue
        h.rx(
            131,
            Telegram::CallRequest(CallRequest {
                futln: futln_b(),
                cell_code: 7,
                chip_card: false,
                extended_band: false,
                card_code: None,
            }),
        );
        h.rx(
            131,
            Telegram::DialDigits(DialDigits { futln: futln_b(), high: false, digits: "0815".into() }),
        );
        assert_eq!(h.state_of(futln_b()), Some(TransState::CallQueued));

        // the network abandons A's call: the channel frees up
        h.rx_line(SapMsgInner::LnDisconnectInd(LnDisconnectInd {
            call_ref: ref_a,
            cause: Cause::NormalRelease,
        }));
        assert_eq!(h.state_of(futln_a()), None);

        // the promotion happens on the next pass, ahead of any queue timer
        h.step();
        assert_eq!(h.state_of(futln_b()), Some(TransState::CallGranted));
    }

    #[test]
    fn test_mo_call_full_flow_with_auth() {
        let mut h = Harness::new(two_channel_cell(true, true));
        h.register(futln_a(), Some(0xBEEF));

        // random access with dial request
        h.rx(
            131,
            Telegram::CallRequest(CallRequest {
                futln: futln_a(),
                cell_code: 7,
                chip_card: true,
                extended_band: false,
                card_code: Some(0xBEEF),
            }),
        );
        assert_eq!(h.state_of(futln_a()), Some(TransState::DialInvited));
        let msgs = h.step();
        assert!(find_tx(msgs, 131, Opcode::DialInvite).is_some());

        // digits arrive; the network is consulted and the channel granted
        let msgs = h.rx(
            131,
            Telegram::DialDigits(DialDigits { futln: futln_a(), high: false, digits: "0815".into() }),
        );
        assert!(msgs.iter().any(|m| {
            matches!(m, SapMsgInner::LnSetupReq(p) if p.dialed == "0815" && p.caller == futln_a())
        }));
        assert!(msgs.iter().any(|m| matches!(m, SapMsgInner::FsClockCopyReq(_))));
        assert_eq!(h.state_of(futln_a()), Some(TransState::CallGranted));

        // two channel assignments on the control channel
        let msgs = h.step();
        let assign = find_tx(msgs, 131, Opcode::ChannelAssign).expect("no assignment");
        let Telegram::ChannelAssign(pdu) = assign else { panic!() };
        assert_eq!(pdu.chan, 287);
        assert!(!pdu.terminating);
        let msgs = h.step();
        assert!(find_tx(msgs, 131, Opcode::ChannelAssign).is_some());
        assert_eq!(h.state_of(futln_a()), Some(TransState::SeizureWait));

        // mode switch has been applied; seizure quittances repeat on traffic
        let msgs = h.step();
        assert!(find_tx(msgs, 287, Opcode::SeizureAck).is_some());

        // the mobile arrives on the traffic channel
        h.rx(287, Telegram::SeizureConfirm(SeizureConfirm { futln: futln_a() }));
        assert_eq!(h.state_of(futln_a()), Some(TransState::ChallengeSent));

        let msgs = h.step();
        let challenge_tx = find_tx(msgs, 287, Opcode::AuthChallenge).expect("no challenge");
        let Telegram::AuthChallenge(pdu) = challenge_tx else { panic!() };
        assert_eq!(h.state_of(futln_a()), Some(TransState::ChallengeWait));

        // correct response moves on to the hold exchange
        let response = auth::expected_response(pdu.challenge, 0xBEEF);
        h.rx(287, Telegram::AuthResponse(AuthResponse { futln: futln_a(), response }));
        assert_eq!(h.state_of(futln_a()), Some(TransState::HoldAckWait));

        let msgs = h.step();
        assert!(find_tx(msgs, 287, Opcode::ConnectionHold).is_some());
        h.rx(287, Telegram::ConnectionHoldAck(ConnectionHoldAck { futln: futln_a() }));
        assert_eq!(h.state_of(futln_a()), Some(TransState::ConnectThrough));

        let msgs = h.step();
        assert!(find_tx(msgs, 287, Opcode::Connect).is_some());
        let msgs = h.rx(287, Telegram::ConnectAck(ConnectAck { futln: futln_a() }));
        assert_eq!(h.state_of(futln_a()), Some(TransState::Active));
        // in-call signaling switches to distributed
        assert!(msgs.iter().any(|m| {
            matches!(m, SapMsgInner::FsModeReq(p) if p.chan_nr == 287 && p.distributed)
        }));

        // the timer of the active leg is running (hold interval)
        let id = h.cc.system().find_by_futln(futln_a(), StateSet::ANY).unwrap();
        assert!(h.cc.system().trans(id).unwrap().timer.is_running());

        // network-side teardown runs the ReleaseBase handshake
        let ref_a = h.cc.system().trans(id).unwrap().call_ref;
        h.rx_line(SapMsgInner::LnDisconnectInd(LnDisconnectInd {
            call_ref: ref_a,
            cause: Cause::NormalRelease,
        }));
        assert_eq!(h.state_of(futln_a()), Some(TransState::ReleaseBase));
        let msgs = h.step();
        assert!(find_tx(msgs, 287, Opcode::ReleaseBase).is_some());
        h.rx(287, Telegram::ReleaseBaseAck(ReleaseBaseAck { futln: futln_a() }));
        assert_eq!(h.cc.system().count(), 0);
    }

    #[test]
    fn test_auth_failure_is_fatal() {
        let mut h = Harness::new(two_channel_cell(true, true));
        h.register(futln_a(), Some(0xBEEF));
        h.rx(
            131,
            Telegram::CallRequest(CallRequest {
                futln: futln_a(),
                cell_code: 7,
                chip_card: true,
                extended_band: false,
                card_code: Some(0xBEEF),
            }),
        );
        h.rx(
            131,
            Telegram::DialDigits(DialDigits { futln: futln_a(), high: false, digits: "0815".into() }),
        );
        h.step();
        h.step();
        h.step();
        h.rx(287, Telegram::SeizureConfirm(SeizureConfirm { futln: futln_a() }));
        let msgs = h.step();
        let Some(Telegram::AuthChallenge(_)) = find_tx(msgs, 287, Opcode::AuthChallenge) else {
            panic!("no challenge transmitted")
        };

        // a wrong response releases with AuthFailed, retry budget or not
        let msgs = h.rx(
            287,
            Telegram::AuthResponse(AuthResponse { futln: futln_a(), response: 0x1234 }),
        );
        assert_eq!(h.state_of(futln_a()), Some(TransState::ReleaseBase));
        assert!(msgs.iter().any(|m| {
            matches!(m, SapMsgInner::LnReleaseReq(p) if p.cause == Cause::AuthFailed)
        }));
        let msgs = h.step();
        let release = find_tx(msgs, 287, Opcode::ReleaseBase).expect("no ReleaseBase");
        let Telegram::ReleaseBase(pdu) = release else { panic!() };
        assert_eq!(pdu.cause, Cause::AuthFailed);
    }

    #[test]
    fn test_mt_call_rings_and_answers() {
        let mut h = Harness::new(two_channel_cell(true, false));
        h.register(futln_a(), None);

        let msgs = h.rx_line(SapMsgInner::LnSetupInd(LnSetupInd { dialed: "21754321".into() }));
        assert!(msgs.iter().any(|m| matches!(m, SapMsgInner::LnSetupRes(p) if p.accept.is_some())));

        // assignments, then seizure on the traffic channel
        let msgs = h.step();
        let assign = find_tx(msgs, 131, Opcode::ChannelAssign).unwrap();
        let Telegram::ChannelAssign(pdu) = assign else { panic!() };
        assert!(pdu.terminating);
        h.step();
        assert_eq!(h.state_of(futln_a()), Some(TransState::PageAckWait));
        h.step();
        h.rx(287, Telegram::SeizureConfirm(SeizureConfirm { futln: futln_a() }));
        // no auth configured: straight to the hold exchange
        assert_eq!(h.state_of(futln_a()), Some(TransState::HoldAckWait));

        h.step();
        h.rx(287, Telegram::ConnectionHoldAck(ConnectionHoldAck { futln: futln_a() }));
        // terminating legs ring
        assert_eq!(h.state_of(futln_a()), Some(TransState::Ringing));

        let msgs = h.step();
        assert!(find_tx(msgs, 287, Opcode::Ring).is_some());
        let msgs = h.rx(287, Telegram::RingAck(RingAck { futln: futln_a() }));
        assert!(msgs.iter().any(|m| matches!(m, SapMsgInner::LnAlertingReq(_))));

        let msgs = h.rx(287, Telegram::Answer(Answer { futln: futln_a() }));
        assert!(msgs.iter().any(|m| matches!(m, SapMsgInner::LnAnswerReq(_))));
        assert_eq!(h.state_of(futln_a()), Some(TransState::ConnectThrough));
    }

    #[test]
    fn test_release_by_subscriber() {
        let mut h = Harness::new(two_channel_cell(true, false));
        h.register(futln_a(), None);
        h.rx(
            131,
            Telegram::CallRequest(CallRequest {
                futln: futln_a(),
                cell_code: 7,
                chip_card: false,
                extended_band: false,
                card_code: None,
            }),
        );
        h.rx(
            131,
            Telegram::DialDigits(DialDigits { futln: futln_a(), high: false, digits: "0815".into() }),
        );
        h.step();
        h.step();
        h.step();
        h.rx(287, Telegram::SeizureConfirm(SeizureConfirm { futln: futln_a() }));

        // subscriber hangs up mid-setup
        let msgs = h.rx(
            287,
            Telegram::ReleaseMobile(ReleaseMobile { futln: futln_a(), cause: Cause::NormalRelease }),
        );
        assert!(msgs.iter().any(|m| matches!(m, SapMsgInner::LnReleaseReq(_))));
        assert_eq!(h.state_of(futln_a()), Some(TransState::ReleaseMobile));

        let msgs = h.step();
        assert!(find_tx(msgs, 287, Opcode::ReleaseMobileAck).is_some());
        assert_eq!(h.cc.system().count(), 0);
        // probing may resume, the subscriber is idle again
        assert!(!h.cc.system().registry.get(futln_a()).unwrap().busy);
    }

    #[test]
    fn test_seizure_timeout_retries_then_releases() {
        let mut h = Harness::new(two_channel_cell(true, false));
        h.register(futln_a(), None);
        h.rx_line(SapMsgInner::LnSetupInd(LnSetupInd { dialed: "21754321".into() }));
        h.step();
        h.step();
        assert_eq!(h.state_of(futln_a()), Some(TransState::PageAckWait));

        // never confirm seizure; walk the clock past the timeout
        let seizure_timeout = h.cc.state_row(TransState::PageAckWait).timeout.unwrap();
        let max_retries = h.cc.state_row(TransState::PageAckWait).max_retries;
        for _ in 0..seizure_timeout {
            h.step();
        }
        // first expiry: back off for another assignment round
        assert_eq!(h.state_of(futln_a()), Some(TransState::PageDelay));

        // exhaust every retry round
        let mut rounds = 0;
        for _ in 0..(max_retries as i64 + 2) * (seizure_timeout + DELAY_SLOTS + 4) {
            h.step();
            if h.state_of(futln_a()).is_none() {
                break;
            }
            rounds += 1;
        }
        assert_eq!(h.state_of(futln_a()), None, "leg survived all retries ({} steps)", rounds);
        // the traffic channel returned to idle
        let idx = h.cc.system().chan_idx_by_nr(287).unwrap();
        assert_eq!(
            h.cc.system().channels[idx].state,
            crate::cc::channel::ChannelState::Idle
        );
    }
}
