//! Per-box log files
//!
//! Each message is appended JSON-encoded, with no delimiter, to
//! `<base_dir>/<box>/<box>_log`.

use async_trait::async_trait;
use berth_common::{path_segment, OutputSink};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct FileLogNotifier {
    base_dir: PathBuf,
}

impl FileLogNotifier {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn log_path(&self, box_name: &str) -> PathBuf {
        self.base_dir
            .join(box_name)
            .join(format!("{}_log", box_name))
    }

    /// Append messages to the box's log file
    ///
    /// A message that fails to encode is skipped; a failed write stops the
    /// batch.
    /// A box name that is not a single path segment is refused.
    pub async fn notify<T: Serialize>(&self, box_name: &str, messages: &[T]) -> std::io::Result<()> {
        path_segment(box_name)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

        let dir = self.base_dir.join(box_name);
        if !tokio::fs::try_exists(&dir).await? {
            debug!(dir = %dir.display(), "Creating log directory");
            tokio::fs::create_dir_all(&dir).await?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);

        let path = self.log_path(box_name);
        let mut file = options.open(&path).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Error opening box log");
            e
        })?;

        for message in messages {
            let bytes = match serde_json::to_vec(message) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(box_name = %box_name, error = %e, "Error encoding log message");
                    continue;
                }
            };
            file.write_all(&bytes).await?;
        }
        file.flush().await
    }

    /// Sink that records deploy output for one box
    pub fn sink(self: &Arc<Self>, box_name: impl Into<String>) -> BoxLogSink {
        BoxLogSink {
            notifier: self.clone(),
            box_name: box_name.into(),
        }
    }
}

/// One line of deploy output
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "box")]
    pub box_name: String,
    pub message: String,
}

pub struct BoxLogSink {
    notifier: Arc<FileLogNotifier>,
    box_name: String,
}

#[async_trait]
impl OutputSink for BoxLogSink {
    async fn write_line(&self, line: &str) {
        let record = LogRecord {
            timestamp: Utc::now(),
            box_name: self.box_name.clone(),
            message: line.to_string(),
        };
        if let Err(e) = self.notifier.notify(&self.box_name, &[record]).await {
            warn!(box_name = %self.box_name, error = %e, "Dropping deploy output line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_notify_appends_without_delimiter() {
        let dir = TempDir::new().unwrap();
        let notifier = FileLogNotifier::new(dir.path());

        notifier.notify("web", &["first"]).await.unwrap();
        notifier.notify("web", &["second", "third"]).await.unwrap();

        let path = dir.path().join("web").join("web_log");
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            r#""first""second""third""#
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let notifier = FileLogNotifier::new(dir.path());
        notifier.notify("db", &["up"]).await.unwrap();

        let mode = std::fs::metadata(notifier.log_path("db"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_sink_writes_records() {
        let dir = TempDir::new().unwrap();
        let notifier = Arc::new(FileLogNotifier::new(dir.path()));
        let sink = notifier.sink("web.example.com");

        sink.write_line("Starting Chef Client").await;

        let raw = std::fs::read_to_string(notifier.log_path("web.example.com")).unwrap();
        let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(record["box"], "web.example.com");
        assert_eq!(record["message"], "Starting Chef Client");
        assert!(record["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_notify_refuses_names_outside_base_dir() {
        let dir = TempDir::new().unwrap();
        let notifier = FileLogNotifier::new(dir.path().join("logs"));

        for name in ["../escaped", "", ".."] {
            let err = notifier.notify(name, &["x"]).await.unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        }
        assert!(!dir.path().join("escaped").exists());
        assert!(!dir.path().join("logs").exists());
    }

    #[tokio::test]
    async fn test_sink_swallows_write_failures() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let notifier = Arc::new(FileLogNotifier::new(&blocker));
        notifier.sink("web").write_line("lost").await;

        assert!(notifier.notify("web", &["x"]).await.is_err());
    }
}
