use std::io::{self, Write};
use std::time::Duration;

use crossterm::cursor::{Hide, Show};
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::KioskError;
use crate::logging::{LogLevel, Logger, TARGET_RUNTIME, json_kv};
use crate::render::{FramePreview, PreviewFrame};
use crate::runtime::shared_state::StateHub;

pub type DriverResult<T> = std::result::Result<T, PreviewDriverError>;

#[derive(Debug, Error)]
pub enum PreviewDriverError {
    #[error("render error: {0}")]
    Render(#[from] KioskError),
    #[error("terminal error: {0}")]
    Terminal(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal driver that redraws the hub's state on a tick inside the
/// alternate screen. Frames identical to the last one drawn are skipped.
pub struct PreviewDriver {
    hub: StateHub,
    preview: FramePreview,
    interval: Duration,
    logger: Logger,
    last_frame: Option<blake3::Hash>,
}

impl PreviewDriver {
    pub fn new(hub: StateHub) -> Self {
        Self {
            hub,
            preview: FramePreview::default(),
            interval: Duration::from_millis(500),
            logger: Logger::null(),
            last_frame: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Size the preview to the terminal, falling back to the default width.
    pub fn fit_terminal(mut self) -> Self {
        if let Ok((width, _)) = terminal::size() {
            self.preview = FramePreview::new(width as usize);
        }
        self
    }

    /// Draw the current state. Returns `false` when the frame was unchanged.
    pub fn draw(&mut self, writer: &mut impl Write) -> DriverResult<bool> {
        let frame = PreviewFrame::capture(&self.hub);
        let lines = self.preview.lines(&frame);
        let hash = blake3::hash(lines.join("\n").as_bytes());
        if self.last_frame == Some(hash) {
            return Ok(false);
        }
        self.last_frame = Some(hash);
        self.preview.render(writer, &frame)?;
        self.logger.emit(
            LogLevel::Trace,
            TARGET_RUNTIME,
            "preview_drawn",
            [json_kv("lines", json!(lines.len()))],
        );
        Ok(true)
    }

    /// Print one frame as plain lines, without terminal control sequences.
    pub fn print_once(&self, writer: &mut impl Write) -> DriverResult<()> {
        let frame = PreviewFrame::capture(&self.hub);
        for line in self.preview.lines(&frame) {
            writeln!(writer, "{}", line.trim_end())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Redraw until Ctrl-C or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> DriverResult<()> {
        let mut stdout = io::stdout();
        self.enter(&mut stdout)?;
        let result = self.run_inner(&mut stdout, cancel).await;
        self.exit(&mut stdout);
        result
    }

    async fn run_inner(
        &mut self,
        stdout: &mut impl Write,
        cancel: CancellationToken,
    ) -> DriverResult<()> {
        loop {
            self.draw(stdout)?;
            tokio::select! {
                _ = cancel.cancelled() => break,
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    self.logger.emit(
                        LogLevel::Info,
                        TARGET_RUNTIME,
                        "exit_requested",
                        std::iter::empty(),
                    );
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        Ok(())
    }

    fn enter(&self, stdout: &mut impl Write) -> DriverResult<()> {
        execute!(stdout, EnterAlternateScreen, Hide, Clear(ClearType::All))
            .map_err(|err| PreviewDriverError::Terminal(err.to_string()))?;
        Ok(())
    }

    fn exit(&self, stdout: &mut impl Write) {
        execute!(stdout, Show, LeaveAlternateScreen).ok();
    }
}
