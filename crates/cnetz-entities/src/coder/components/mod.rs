pub mod blockcode;
pub mod framing;
pub mod interleave;
