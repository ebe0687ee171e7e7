pub mod bitsync;
pub mod clock;
pub mod framesync;
pub mod phy_bs;

pub use phy_bs::PhyBs;
