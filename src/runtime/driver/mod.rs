pub mod cli;

pub use cli::{DriverResult, PreviewDriver, PreviewDriverError};
