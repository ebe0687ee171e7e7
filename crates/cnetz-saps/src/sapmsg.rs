use cnetz_core::{CnetzEntity, Sap, SlotTime};

use crate::fs::*;
use crate::ln::*;
use crate::mc::*;

/// Exhaustive list of primitive structs for use in the SapMsg struct
#[derive(Debug)]
pub enum SapMsgInner {
    // FS-SAP (Phy <-> Coder)
    FsFrameInd(FsFrameInd),
    FsFrameReq(FsFrameReq),
    FsClockCopyReq(FsClockCopyReq),
    FsModeReq(FsModeReq),
    FsVoiceInd(FsVoiceInd),
    FsVoiceReq(FsVoiceReq),

    // MC-SAP (Coder <-> CallControl)
    McTelegramInd(McTelegramInd),
    McTelegramReq(McTelegramReq),

    // LN-SAP (CallControl <-> Line)
    LnSetupReq(LnSetupReq),
    LnAlertingReq(LnAlertingReq),
    LnAnswerReq(LnAnswerReq),
    LnReleaseReq(LnReleaseReq),
    LnSetupRes(LnSetupRes),
    LnAudioUpReq(LnAudioUpReq),
    LnSetupInd(LnSetupInd),
    LnDisconnectInd(LnDisconnectInd),
    LnReleaseInd(LnReleaseInd),
    LnAudioDownInd(LnAudioDownInd),
}

#[derive(Debug)]
pub struct SapMsg {
    pub sap: Sap,
    pub src: CnetzEntity,
    pub dest: CnetzEntity,
    /// Slot time at which the primitive was generated
    pub time: SlotTime,
    pub msg: SapMsgInner,
}

impl SapMsg {
    pub fn get_sap(&self) -> Sap {
        self.sap
    }

    pub fn get_source(&self) -> CnetzEntity {
        self.src
    }

    pub fn get_dest(&self) -> &CnetzEntity {
        &self.dest
    }
}
