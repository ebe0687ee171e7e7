pub mod line_bs;

pub use line_bs::{LineBs, LineCommand, LineEvent, LineHandle};
