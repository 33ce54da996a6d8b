//! Advisory JSON-lines signal journal.
//! Write-only, never read back by the running process; a write failure is
//! logged and otherwise ignored. Disabled unless `SIGNAL_JOURNAL_PATH` is set.

use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::engine::{SignalEngine, SignalEvent};

pub struct JournalWriter {
    path: PathBuf,
}

impl JournalWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn append(&self, line: &str) {
        let result = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await;
        let mut file = match result {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "journal open failed");
                return;
            }
        };
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!(path = %self.path.display(), error = %e, "journal write failed");
        }
    }

    async fn record(&self, event: &SignalEvent) {
        let line = serde_json::json!({
            "type": "signal",
            "token": event.token,
            "chain": event.chain,
            "venue": event.venue,
            "signal_time": event.signal_time,
        });
        self.append(&format!("{line}\n")).await;
    }

    /// Drains the engine's signal broadcast for the journal's lifetime.
    pub async fn run(self, engine: std::sync::Arc<SignalEngine>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut signals = engine.subscribe();
        loop {
            tokio::select! {
                signal = signals.recv() => {
                    match signal {
                        Ok(event) => self.record(&event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "journal writer lagged on signal broadcast");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_json_line_per_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let writer = JournalWriter::new(&path);
        writer
            .record(&SignalEvent { token: "0xabc".into(), chain: "base", venue: "evmA", signal_time: 123.0 })
            .await;
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"token\":\"0xabc\""));
    }
}
