use thiserror::Error;

/// Unified result type for the kiosk orchestration crate.
pub type Result<T> = std::result::Result<T, KioskError>;

/// Errors surfaced by the orchestration core.
#[derive(Debug, Error)]
pub enum KioskError {
    #[error("no resolver entry for path `{0}`")]
    UnknownPath(String),
    #[error("widget `{name}` failed to resolve from `{path}`: {reason}")]
    Resolution {
        name: String,
        path: String,
        reason: String,
    },
    #[error("widget `{0}` not found")]
    WidgetNotFound(String),
    #[error("solar data incomplete: {0}")]
    IncompleteSolarData(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unparseable timestamp `{0}`")]
    TimeParse(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
