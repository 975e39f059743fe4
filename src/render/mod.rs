//! Text preview of the published dashboard state.

mod core;

pub use core::{FramePreview, PreviewFrame};
