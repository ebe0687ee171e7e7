#![allow(dead_code)]

pub mod fs;
pub mod ln;
pub mod mc;
pub mod sapmsg;

pub use sapmsg::*;
