//! Error orchestrator; the taxonomy itself lives in `types`.

mod types;

pub use types::{KioskError, Result};
