//! Output sinks for deploy output
//!
//! A deploy streams the configuration tool's output line by line into a
//! sink. Sinks swallow their own write failures; losing a log line never
//! fails a deploy.

use async_trait::async_trait;
use std::sync::Mutex;

#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write_line(&self, line: &str);
}

/// Discards everything
#[derive(Debug, Default, Clone)]
pub struct NullSink;

#[async_trait]
impl OutputSink for NullSink {
    async fn write_line(&self, _line: &str) {}
}

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OutputSink for CollectingSink {
    async fn write_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
