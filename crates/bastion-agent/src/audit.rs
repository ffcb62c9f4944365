//! Append-only line-delimited JSON audit log.
//!
//! Every tool-dispatch attempt and outcome is recorded here, independent
//! of the ephemeral `tracing` diagnostics the rest of the crate emits —
//! this is the durable security record.

use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::error::BastionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Append-only audit log writer.
///
/// String fields inside `result`/`input` bodies are truncated to
/// `max_field_len` so one verbose tool output cannot blow up the log
/// file; truncation is marked explicitly rather than done silently.
pub struct AuditLog {
    writer: Mutex<Option<BufWriter<File>>>,
    max_field_len: usize,
}

impl AuditLog {
    pub async fn open(path: &Path, max_field_len: usize) -> Result<Self, BastionError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        Ok(Self {
            writer: Mutex::new(Some(BufWriter::new(file))),
            max_field_len,
        })
    }

    fn truncate_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) if s.len() > self.max_field_len => {
                let total = s.len();
                let head: String = s.chars().take(self.max_field_len).collect();
                Value::String(format!("{head}... (truncated, {total} total)"))
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.truncate_value(v)))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.truncate_value(v)).collect())
            }
            other => other.clone(),
        }
    }

    async fn write_record(&self, mut record: Value) -> Result<(), BastionError> {
        if let Some(obj) = record.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                json!(OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default()),
            );
        }
        let line = serde_json::to_string(&record)?;
        let mut guard = self.writer.lock().await;
        if let Some(writer) = guard.as_mut() {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok(())
    }

    pub async fn tool_attempt(&self, tool: &str, input: &Value) -> Result<(), BastionError> {
        self.write_record(json!({
            "event": "tool_attempt",
            "level": Level::Info,
            "tool": tool,
            "input": self.truncate_value(input),
        }))
        .await
    }

    pub async fn tool_success(&self, tool: &str, input: &Value, result: &Value) -> Result<(), BastionError> {
        self.write_record(json!({
            "event": "tool_success",
            "level": Level::Info,
            "tool": tool,
            "input": self.truncate_value(input),
            "result": self.truncate_value(result),
        }))
        .await
    }

    pub async fn tool_denied(&self, tool: &str, input: &Value, reason: &str) -> Result<(), BastionError> {
        self.write_record(json!({
            "event": "tool_denied",
            "level": Level::Warn,
            "tool": tool,
            "input": self.truncate_value(input),
            "reason": reason,
        }))
        .await
    }

    pub async fn tool_error(&self, tool: &str, input: &Value, error: &str) -> Result<(), BastionError> {
        self.write_record(json!({
            "event": "tool_error",
            "level": Level::Error,
            "tool": tool,
            "input": self.truncate_value(input),
            "error": error,
        }))
        .await
    }

    pub async fn tool_timeout(&self, tool: &str, input: &Value, secs: u64) -> Result<(), BastionError> {
        self.write_record(json!({
            "event": "tool_timeout",
            "level": Level::Warn,
            "tool": tool,
            "input": self.truncate_value(input),
            "reason": format!("timed out after {secs}s"),
        }))
        .await
    }

    pub async fn session_start(&self, session_id: &str) -> Result<(), BastionError> {
        self.write_record(json!({
            "event": "session_start",
            "level": Level::Info,
            "session_id": session_id,
        }))
        .await
    }

    pub async fn session_end(&self, session_id: &str) -> Result<(), BastionError> {
        self.write_record(json!({
            "event": "session_end",
            "level": Level::Info,
            "session_id": session_id,
        }))
        .await
    }

    /// Idempotent close: flushes and drops the underlying file handle.
    /// Safe to call more than once (e.g. from both a scoped guard and an
    /// explicit shutdown path).
    pub async fn close(&self) -> Result<(), BastionError> {
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            writer.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn read_lines(path: &Path) -> Vec<Value> {
        let text = tokio::fs::read_to_string(path).await.unwrap();
        text.lines()
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn appends_one_json_line_per_event() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path, 2000).await.unwrap();

        log.tool_attempt("run_local_command", &json!({"command": "uptime"}))
            .await
            .unwrap();
        log.tool_success(
            "run_local_command",
            &json!({"command": "uptime"}),
            &json!({"output": "up 3 days", "exit_code": 0}),
        )
        .await
        .unwrap();
        log.close().await.unwrap();

        let records = read_lines(&path).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["event"], "tool_attempt");
        assert_eq!(records[1]["event"], "tool_success");
    }

    #[tokio::test]
    async fn truncates_long_string_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path, 10).await.unwrap();

        let long = "x".repeat(100);
        log.tool_success(
            "t",
            &json!({}),
            &json!({"output": long}),
        )
        .await
        .unwrap();
        log.close().await.unwrap();

        let records = read_lines(&path).await;
        let output = records[0]["result"]["output"].as_str().unwrap();
        assert!(output.contains("truncated, 100 total"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path, 2000).await.unwrap();
        log.close().await.unwrap();
        log.close().await.unwrap();
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("audit.jsonl");
        let log = AuditLog::open(&path, 2000).await.unwrap();
        log.session_start("abc123").await.unwrap();
        log.close().await.unwrap();
        assert!(path.exists());
    }
}
