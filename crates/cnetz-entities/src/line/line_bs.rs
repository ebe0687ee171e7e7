//! Bridge to the external call-control (fixed network) layer.
//!
//! The collaborator holds a `LineHandle` and exchanges events and commands
//! over a pair of channels; this entity translates between those and the
//! LN-SAP primitives of the stack. It is the only place where another
//! thread may touch the engine, which is why the boundary is a channel
//! pair and not a call interface.

use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};

use cnetz_config::SharedConfig;
use cnetz_core::{CallRef, Cause, CnetzEntity, Futln, Sap, SlotTime};
use cnetz_saps::ln::*;
use cnetz_saps::{SapMsg, SapMsgInner};

use crate::{CnetzEntityTrait, MessageQueue};

/// Events flowing from the engine to the network side
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// A mobile-originated call enters the network
    Setup { call_ref: CallRef, caller: Futln, dialed: String },
    /// The called mobile is ringing
    Alerting { call_ref: CallRef },
    /// The called mobile answered
    Answer { call_ref: CallRef, connected: Futln },
    /// The engine released its side
    Release { call_ref: CallRef, cause: Cause },
    /// Answer to SetupRequest: accepted under this reference
    SetupAccept { call_ref: CallRef, dialed: String },
    /// Answer to SetupRequest: rejected
    SetupReject { dialed: String, cause: Cause },
    /// Uplink voice of an active call
    AudioUp { call_ref: CallRef, samples: Vec<i16> },
}

/// Commands flowing from the network side into the engine
#[derive(Debug, Clone, PartialEq)]
pub enum LineCommand {
    /// Request a call toward a mobile subscriber (dialed national number)
    SetupRequest { dialed: String },
    /// Start teardown of a call
    Disconnect { call_ref: CallRef, cause: Cause },
    /// Finally release a call reference
    Release { call_ref: CallRef, cause: Cause },
    /// Downlink voice of an active call
    AudioDown { call_ref: CallRef, samples: Vec<i16> },
}

/// The network side's end of the bridge
pub struct LineHandle {
    pub events: Receiver<LineEvent>,
    pub commands: Sender<LineCommand>,
}

pub struct LineBs {
    config: SharedConfig,
    event_tx: Sender<LineEvent>,
    command_rx: Receiver<LineCommand>,
}

impl LineBs {
    pub fn new(config: SharedConfig) -> (Self, LineHandle) {
        let (event_tx, event_rx) = unbounded();
        let (command_tx, command_rx) = unbounded();
        (
            Self { config, event_tx, command_rx },
            LineHandle { events: event_rx, commands: command_tx },
        )
    }

    fn emit(&self, event: LineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(e)) | Err(TrySendError::Disconnected(e)) => {
                tracing::warn!("line side not listening, dropping {:?}", e);
            }
        }
    }
}

impl CnetzEntityTrait for LineBs {
    fn entity(&self) -> CnetzEntity {
        CnetzEntity::Line
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }

    /// Drain pending commands from the network side into the stack
    fn tick_start(&mut self, queue: &mut MessageQueue, ts: SlotTime) {
        while let Ok(command) = self.command_rx.try_recv() {
            let msg = match command {
                LineCommand::SetupRequest { dialed } => {
                    SapMsgInner::LnSetupInd(LnSetupInd { dialed })
                }
                LineCommand::Disconnect { call_ref, cause } => {
                    SapMsgInner::LnDisconnectInd(LnDisconnectInd { call_ref, cause })
                }
                LineCommand::Release { call_ref, cause } => {
                    SapMsgInner::LnReleaseInd(LnReleaseInd { call_ref, cause })
                }
                LineCommand::AudioDown { call_ref, samples } => {
                    SapMsgInner::LnAudioDownInd(LnAudioDownInd { call_ref, samples })
                }
            };
            queue.push_back(SapMsg {
                sap: Sap::LnSap,
                src: CnetzEntity::Line,
                dest: CnetzEntity::CallControl,
                time: ts,
                msg,
            });
        }
    }

    fn rx_prim(&mut self, _queue: &mut MessageQueue, message: SapMsg) {
        match message.msg {
            SapMsgInner::LnSetupReq(prim) => {
                tracing::info!("call from {} to \"{}\"", prim.caller, prim.dialed);
                self.emit(LineEvent::Setup {
                    call_ref: prim.call_ref,
                    caller: prim.caller,
                    dialed: prim.dialed,
                });
            }
            SapMsgInner::LnAlertingReq(prim) => {
                self.emit(LineEvent::Alerting { call_ref: prim.call_ref });
            }
            SapMsgInner::LnAnswerReq(prim) => {
                self.emit(LineEvent::Answer { call_ref: prim.call_ref, connected: prim.connected });
            }
            SapMsgInner::LnReleaseReq(prim) => {
                self.emit(LineEvent::Release { call_ref: prim.call_ref, cause: prim.cause });
            }
            SapMsgInner::LnSetupRes(prim) => match prim.accept {
                Some(call_ref) => {
                    self.emit(LineEvent::SetupAccept { call_ref, dialed: prim.dialed })
                }
                None => self.emit(LineEvent::SetupReject {
                    dialed: prim.dialed,
                    cause: prim.cause.unwrap_or(Cause::Unspecified),
                }),
            },
            SapMsgInner::LnAudioUpReq(prim) => {
                self.emit(LineEvent::AudioUp { call_ref: prim.call_ref, samples: prim.samples });
            }
            other => panic!("unexpected primitive for Line: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use cnetz_config::{CfgChannel, ChannelRole, StackConfig};

    use super::*;

    fn shared_config() -> SharedConfig {
        SharedConfig::from_config(StackConfig::new(
            7,
            vec![
                CfgChannel { nr: 131, role: ChannelRole::Control },
                CfgChannel { nr: 287, role: ChannelRole::Traffic },
            ],
        ))
    }

    #[test]
    fn test_commands_become_primitives() {
        let (mut line, handle) = LineBs::new(shared_config());
        handle
            .commands
            .send(LineCommand::SetupRequest { dialed: "21754321".into() })
            .unwrap();
        handle
            .commands
            .send(LineCommand::Disconnect { call_ref: 5, cause: Cause::NormalRelease })
            .unwrap();

        let mut queue = MessageQueue::new();
        line.tick_start(&mut queue, SlotTime::default());
        assert_eq!(queue.len(), 2);

        let first = queue.pop_front().unwrap();
        assert!(matches!(first.msg, SapMsgInner::LnSetupInd(ref p) if p.dialed == "21754321"));
        let second = queue.pop_front().unwrap();
        assert!(matches!(second.msg, SapMsgInner::LnDisconnectInd(ref p) if p.call_ref == 5));
    }

    #[test]
    fn test_primitives_become_events() {
        let (mut line, handle) = LineBs::new(shared_config());
        let mut queue = MessageQueue::new();
        line.rx_prim(
            &mut queue,
            SapMsg {
                sap: Sap::LnSap,
                src: CnetzEntity::CallControl,
                dest: CnetzEntity::Line,
                time: SlotTime::default(),
                msg: SapMsgInner::LnSetupReq(LnSetupReq {
                    call_ref: 42,
                    caller: Futln::new(2, 17, 54321),
                    dialed: "0815".into(),
                }),
            },
        );
        assert_eq!(
            handle.events.try_recv().unwrap(),
            LineEvent::Setup {
                call_ref: 42,
                caller: Futln::new(2, 17, 54321),
                dialed: "0815".into()
            }
        );
    }
}
