use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::logging::{LogLevel, Logger, TARGET_SOLAR, json_str};

use super::times::SolarTimes;

/// Channel the weather side publishes solar times on. Starts empty.
pub fn solar_channel() -> (watch::Sender<SolarTimes>, watch::Receiver<SolarTimes>) {
    watch::channel(SolarTimes::default())
}

/// Re-reads a weather JSON file and forwards changed solar times.
#[derive(Debug, Clone)]
pub struct SolarFilePoller {
    path: PathBuf,
    interval: Duration,
    logger: Logger,
}

impl SolarFilePoller {
    pub fn new(path: impl AsRef<Path>, interval: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interval,
            logger: Logger::null(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn poll_once(&self) -> Result<SolarTimes> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let payload: Value = serde_json::from_str(&raw)?;
        SolarTimes::from_payload(&payload)
    }

    /// Poll until cancelled. Read failures keep the last published value.
    pub fn spawn(self, tx: watch::Sender<SolarTimes>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_error: Option<String> = None;
            loop {
                match self.poll_once().await {
                    Ok(times) => {
                        last_error = None;
                        tx.send_if_modified(|current| {
                            if *current == times {
                                return false;
                            }
                            *current = times;
                            true
                        });
                    }
                    Err(err) => {
                        let reason = err.to_string();
                        if last_error.as_deref() != Some(reason.as_str()) {
                            self.logger.emit(
                                LogLevel::Warn,
                                TARGET_SOLAR,
                                "solar_feed_unavailable",
                                [
                                    json_str("path", self.path.display().to_string()),
                                    json_str("error", reason.as_str()),
                                ],
                            );
                            last_error = Some(reason);
                        }
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KioskError;
    use crate::logging::MemorySink;
    use std::io::Write;

    fn weather_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn reads_solar_times_from_weather_file() {
        let file = weather_file(
            r#"{"temperature": 4.5, "sunrise": "2024-10-19T07:12:00+02:00", "sunset": "2024-10-19T18:01:00+02:00"}"#,
        );
        let times = SolarFilePoller::new(file.path(), Duration::from_secs(60))
            .poll_once()
            .await
            .unwrap();
        assert!(times.ready());
    }

    #[tokio::test]
    async fn unreadable_file_is_an_error() {
        let poller = SolarFilePoller::new("/nonexistent/weather.json", Duration::from_secs(60));
        assert!(matches!(poller.poll_once().await, Err(KioskError::Io(_))));

        let file = weather_file("not json");
        let poller = SolarFilePoller::new(file.path(), Duration::from_secs(60));
        assert!(matches!(poller.poll_once().await, Err(KioskError::Json(_))));
    }

    #[tokio::test]
    async fn spawned_poller_publishes_and_logs_failures_once() {
        let sink = MemorySink::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.json");
        let (tx, mut rx) = solar_channel();
        let cancel = CancellationToken::new();
        let task = SolarFilePoller::new(&path, Duration::from_millis(10))
            .with_logger(Logger::new(sink.clone()))
            .spawn(tx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.count("solar_feed_unavailable"), 1);
        assert!(!rx.borrow().ready());

        std::fs::write(
            &path,
            r#"{"sunrise": "2024-10-19T07:12:00Z", "sunset": "2024-10-19T18:01:00Z"}"#,
        )
        .unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(rx.borrow_and_update().ready());

        cancel.cancel();
        task.await.unwrap();
    }
}
