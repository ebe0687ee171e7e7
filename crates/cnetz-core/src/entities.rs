/// Identifiers of the stack entities served by the message router
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CnetzEntity {
    /// Bit synchronizer / radio side
    Phy,
    /// Telegram codec between Phy and call control
    Coder,
    /// Transaction state machine, channels, registry
    CallControl,
    /// Bridge to the external call-control (fixed network) layer
    Line,
}

/// Service access points between entities
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Sap {
    /// Phy <-> Coder: raw 150-bit frames plus reception metrics
    FsSap,
    /// Coder <-> CallControl: telegram info words
    McSap,
    /// CallControl <-> Line: call-control primitives of the fixed network
    LnSap,
    /// Inter-entity control messages
    Control,
}
