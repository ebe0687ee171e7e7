use cnetz_core::{CallRef, Cause, Futln};

// Primitives between call control and the line entity, i.e. the interface
// to the external call-control (fixed network) layer.
//
// *Req flow from call control toward the network, *Ind flow from the
// network toward call control.

/// A mobile-originated call enters the network. The call reference is
/// allocated on our side and reported to the collaborator.
#[derive(Debug)]
pub struct LnSetupReq {
    pub call_ref: CallRef,
    pub caller: Futln,
    pub dialed: String,
}

/// The called mobile is ringing (mobile-terminated call)
#[derive(Debug)]
pub struct LnAlertingReq {
    pub call_ref: CallRef,
}

/// The called mobile answered
#[derive(Debug)]
pub struct LnAnswerReq {
    pub call_ref: CallRef,
    pub connected: Futln,
}

/// Call control releases its side of the call
#[derive(Debug)]
pub struct LnReleaseReq {
    pub call_ref: CallRef,
    pub cause: Cause,
}

/// Answer to an LnSetupInd: accept with a freshly allocated call reference,
/// or reject with a cause
#[derive(Debug)]
pub struct LnSetupRes {
    pub dialed: String,
    pub accept: Option<CallRef>,
    pub cause: Option<Cause>,
}

/// Uplink voice toward the network for an active call
#[derive(Debug)]
pub struct LnAudioUpReq {
    pub call_ref: CallRef,
    pub samples: Vec<i16>,
}

/// The network requests a call toward a mobile subscriber
#[derive(Debug)]
pub struct LnSetupInd {
    pub dialed: String,
}

/// The network starts teardown; call control is expected to release the
/// radio leg and answer with LnReleaseReq
#[derive(Debug)]
pub struct LnDisconnectInd {
    pub call_ref: CallRef,
    pub cause: Cause,
}

/// The network finally releases the call reference
#[derive(Debug)]
pub struct LnReleaseInd {
    pub call_ref: CallRef,
    pub cause: Cause,
}

/// Downlink voice from the network for an active call
#[derive(Debug)]
pub struct LnAudioDownInd {
    pub call_ref: CallRef,
    pub samples: Vec<i16>,
}
