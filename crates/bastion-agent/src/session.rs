//! Persisted conversation sessions.
//!
//! A session is one conversation loop's message history plus a little
//! bookkeeping, saved atomically as one JSON file per session under the
//! daemon's sessions directory. Saves go through a temp-file-then-rename
//! so a crash mid-write never leaves a half-written session on disk.

use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use bastion_core::{ChatRole, Message};

use crate::error::BastionError;

/// A saved conversation, identified by a 12-hex-character random id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub turns: usize,
    pub history: Vec<Message>,
}

/// Lightweight listing row — `list` never deserializes the full history
/// of every session just to print a summary.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub turns: usize,
    pub preview: String,
}

impl Session {
    pub fn new() -> Self {
        let now = now_rfc3339();
        Self {
            session_id: generate_session_id(),
            created_at: now.clone(),
            updated_at: now,
            turns: 0,
            history: Vec::new(),
        }
    }

    /// First 80 characters of the first user message, used as the
    /// one-line summary in `sessions` listings.
    pub fn preview(&self) -> String {
        let Some(first_user) = self.history.iter().find(|m| m.role == ChatRole::User) else {
            return String::new();
        };
        let text = match &first_user.content {
            bastion_core::MessageContent::Text(s) => s.clone(),
            bastion_core::MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.as_text())
                .collect::<Vec<_>>()
                .join(" "),
        };
        truncate_chars(&text, 80)
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            turns: self.turns,
            preview: self.preview(),
        }
    }

    /// Sync the session's history from a live conversation loop and bump
    /// `updated_at` and the turn counter. `created_at` is never touched.
    pub fn sync(&mut self, history: Vec<Message>) {
        self.turns = history.iter().filter(|m| m.role == ChatRole::User).count();
        self.history = history;
        self.updated_at = now_rfc3339();
    }

    fn path(dir: &Path, session_id: &str) -> PathBuf {
        dir.join(format!("{session_id}.json"))
    }

    /// Write the session to `dir` atomically: serialize to a sibling temp
    /// file, then rename over the final path.
    pub async fn save(&self, dir: &Path) -> Result<(), BastionError> {
        tokio::fs::create_dir_all(dir).await?;
        let final_path = Self::path(dir, &self.session_id);
        let tmp_path = dir.join(format!(".{}.tmp", self.session_id));
        let body = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    pub async fn load(dir: &Path, session_id: &str) -> Result<Self, BastionError> {
        let path = Self::path(dir, session_id);
        let body = tokio::fs::read(&path).await.map_err(|_| BastionError::SessionNotFound {
            session_id: session_id.to_string(),
        })?;
        serde_json::from_slice(&body).map_err(|e| BastionError::Serialization(e.to_string()))
    }

    pub async fn delete(dir: &Path, session_id: &str) -> Result<(), BastionError> {
        let path = Self::path(dir, session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List sessions under `dir`, newest `updated_at` first, skipping any
    /// file that fails to parse rather than failing the whole listing —
    /// one corrupt session must not hide every other one.
    pub async fn list(dir: &Path, limit: usize) -> Result<Vec<SessionSummary>, BastionError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(body) = tokio::fs::read(&path).await else {
                continue;
            };
            let Ok(session) = serde_json::from_slice::<Session>(&body) else {
                continue;
            };
            summaries.push(session.summary());
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{truncated}\u{2026}")
}
