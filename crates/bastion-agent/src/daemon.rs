//! Unix-domain-socket transport: one persistent agent process, any number
//! of short-lived `send`/`run --daemon` clients talking to it over
//! newline-delimited JSON.
//!
//! Only one conversation may be in flight at a time. A second client
//! connecting while the first is still attached gets a `busy` error and
//! the connection is closed; a client that died without cleanly
//! disconnecting is detected with a blank-line probe write before the new
//! connection is rejected, so a crashed client never wedges the daemon.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use bastion_core::LLMProvider;

use crate::config::ExecutionConfig;
use crate::conversation::ConversationLoop;
use crate::dispatch::DispatchKernel;
use crate::error::BastionError;
use crate::events::{EventSink, LoopEvent};
use crate::session::Session;

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    resume: Option<String>,
    #[serde(default, rename = "type")]
    frame_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Banner { session_id: String },
    Response { text: String },
    ToolCall { tool: String, input: Value },
    ToolResult { tool: String, result: Value },
    Error { text: String },
    Info { text: String },
    Cancelled { text: String },
    Done,
    Goodbye,
}

/// What the reader task hands back to the turn-driving loop. Only the
/// very first line on a connection may carry `resume`.
enum Inbound {
    First { message: Option<String>, resume: Option<String> },
    Message(String),
}

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Writes [`LoopEvent`]s as JSON lines over the connection's write half.
struct SocketSink {
    tx: mpsc::UnboundedSender<ServerFrame>,
}

impl EventSink for SocketSink {
    fn emit(&self, event: LoopEvent) {
        let frame = match event {
            LoopEvent::Response(text) => ServerFrame::Response { text },
            LoopEvent::ToolCall { tool, input } => ServerFrame::ToolCall { tool, input },
            LoopEvent::ToolResult { tool, result } => ServerFrame::ToolResult { tool, result },
            LoopEvent::Error(text) => ServerFrame::Error { text },
            LoopEvent::Info(text) => ServerFrame::Info { text },
        };
        let _ = self.tx.send(frame);
    }
}

pub struct Daemon {
    socket_path: PathBuf,
    sessions_dir: PathBuf,
    provider: Arc<dyn LLMProvider>,
    kernel: Arc<DispatchKernel>,
    execution: ExecutionConfig,
    active: Arc<Mutex<Option<SharedWriter>>>,
}

impl Daemon {
    pub fn new(
        socket_path: PathBuf,
        sessions_dir: PathBuf,
        provider: Arc<dyn LLMProvider>,
        kernel: Arc<DispatchKernel>,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            socket_path,
            sessions_dir,
            provider,
            kernel,
            execution,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Bind the socket (removing a stale one from a previous run) and
    /// serve connections until the process is killed.
    pub async fn serve(self: Arc<Self>) -> Result<(), BastionError> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        set_socket_permissions(&self.socket_path)?;
        tracing::info!(socket = %self.socket_path.display(), "daemon_listening");

        loop {
            let (stream, _addr) = listener.accept().await?;
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = this.handle_connection(stream).await {
                    tracing::warn!(error = %e, "daemon_connection_error");
                }
            });
        }
    }

    /// Try to become the single active session. On success, installs
    /// `writer` as the new liveness handle. On failure (an existing
    /// session answers the probe write), leaves the slot untouched.
    async fn try_acquire(&self, writer: SharedWriter) -> bool {
        let mut guard = self.active.lock().await;
        if let Some(existing) = guard.as_ref() {
            let probe = existing.lock().await.write_all(b"\n").await;
            if probe.is_ok() {
                return false;
            }
            tracing::info!("stale_session_reclaimed");
        }
        *guard = Some(writer);
        true
    }

    async fn release(&self, writer: &SharedWriter) {
        let mut guard = self.active.lock().await;
        if let Some(existing) = guard.as_ref() {
            if Arc::ptr_eq(existing, writer) {
                *guard = None;
            }
        }
    }

    async fn handle_connection(&self, stream: UnixStream) -> Result<(), BastionError> {
        let (read_half, write_half) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(write_half));

        if !self.try_acquire(Arc::clone(&writer)).await {
            let mut guard = writer.lock().await;
            let _ = send_frame(
                &mut *guard,
                &ServerFrame::Error {
                    text: BastionError::SessionBusy.to_string(),
                },
            )
            .await;
            let _ = send_frame(&mut *guard, &ServerFrame::Done).await;
            return Ok(());
        }

        let result = self.drive_session(read_half, Arc::clone(&writer)).await;
        self.release(&writer).await;
        result
    }

    async fn drive_session(
        &self,
        read_half: tokio::net::unix::OwnedReadHalf,
        writer: SharedWriter,
    ) -> Result<(), BastionError> {
        // One channel to ship outbound ServerFrames to a task that owns the
        // write half, one to ship parsed inbound lines the other way — the
        // reader task runs for the whole connection so a `cancel` frame can
        // reach us while a turn is mid-flight.
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
        let (tx_in, mut rx_in) = mpsc::unbounded_channel::<Inbound>();
        let current_cancel = Arc::new(Mutex::new(CancellationToken::new()));

        let writer_task = {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    if send_frame(&mut *writer.lock().await, &frame).await.is_err() {
                        break;
                    }
                }
            })
        };

        let reader_task = {
            let current_cancel = Arc::clone(&current_cancel);
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(read_half).lines();
                let mut first = true;
                loop {
                    let line = match lines.next_line().await {
                        Ok(Some(line)) => line,
                        Ok(None) | Err(_) => break,
                    };
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let frame: ClientFrame = match serde_json::from_str(trimmed) {
                        Ok(f) => f,
                        Err(e) => {
                            let _ = tx.send(ServerFrame::Error {
                                text: format!("malformed request: {e}"),
                            });
                            continue;
                        }
                    };

                    if first {
                        first = false;
                        let _ = tx_in.send(Inbound::First {
                            message: frame.message,
                            resume: frame.resume,
                        });
                        continue;
                    }

                    if frame.frame_type.as_deref() == Some("cancel") {
                        current_cancel.lock().await.cancel();
                        continue;
                    }
                    if let Some(text) = frame.message {
                        if tx_in.send(Inbound::Message(text)).is_err() {
                            break;
                        }
                    }
                }
                current_cancel.lock().await.cancel();
            })
        };

        let Some(Inbound::First { message, resume }) = rx_in.recv().await else {
            let _ = tx.send(ServerFrame::Goodbye);
            drop(tx);
            reader_task.abort();
            let _ = writer_task.await;
            return Ok(());
        };

        let mut session = match &resume {
            Some(id) => match Session::load(&self.sessions_dir, id).await {
                Ok(s) => s,
                Err(BastionError::SessionNotFound { session_id }) => {
                    let _ = tx.send(ServerFrame::Error {
                        text: format!("no such session: {session_id}"),
                    });
                    let _ = tx.send(ServerFrame::Goodbye);
                    drop(tx);
                    reader_task.abort();
                    let _ = writer_task.await;
                    return Ok(());
                }
                Err(e) => {
                    drop(tx);
                    reader_task.abort();
                    let _ = writer_task.await;
                    return Err(e);
                }
            },
            None => Session::new(),
        };

        let sink = Arc::new(SocketSink { tx: tx.clone() });
        let mut conversation = ConversationLoop::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.kernel),
            sink,
            &self.execution,
        );
        conversation.restore_messages(session.history.clone());

        let _ = self.kernel.audit().session_start(&session.session_id).await;
        let _ = tx.send(ServerFrame::Banner {
            session_id: session.session_id.clone(),
        });
        if resume.is_some() {
            let _ = tx.send(ServerFrame::Info {
                text: format!(
                    "Resumed session {} ({} messages)",
                    session.session_id,
                    session.history.len()
                ),
            });
        }

        if let Some(message) = message {
            self.run_turn(&mut conversation, &mut session, &message, &current_cancel, &tx)
                .await?;
        }

        while let Some(inbound) = rx_in.recv().await {
            let Inbound::Message(text) = inbound else { continue };
            if text.trim() == "/quit" || text.trim() == "/exit" {
                break;
            }
            self.run_turn(&mut conversation, &mut session, &text, &current_cancel, &tx)
                .await?;
        }

        let _ = self.kernel.audit().session_end(&session.session_id).await;
        let _ = tx.send(ServerFrame::Goodbye);
        drop(tx);
        reader_task.abort();
        let _ = writer_task.await;
        Ok(())
    }

    async fn run_turn(
        &self,
        conversation: &mut ConversationLoop,
        session: &mut Session,
        text: &str,
        current_cancel: &Arc<Mutex<CancellationToken>>,
        tx: &mpsc::UnboundedSender<ServerFrame>,
    ) -> Result<(), BastionError> {
        let fresh_cancel = CancellationToken::new();
        *current_cancel.lock().await = fresh_cancel.clone();
        conversation.set_cancel_event(fresh_cancel);

        match conversation.process_message(text).await {
            Ok(()) => {
                session.sync(conversation.get_messages().to_vec());
                session.save(&self.sessions_dir).await?;
                let _ = tx.send(ServerFrame::Done);
            }
            Err(BastionError::CancelledByUser) => {
                session.sync(conversation.get_messages().to_vec());
                session.save(&self.sessions_dir).await?;
                let _ = tx.send(ServerFrame::Cancelled {
                    text: "Operation cancelled by user.".to_string(),
                });
            }
            Err(e) => {
                let _ = tx.send(ServerFrame::Error { text: e.to_string() });
            }
        }
        Ok(())
    }
}

async fn send_frame(
    writer: &mut OwnedWriteHalf,
    frame: &ServerFrame,
) -> Result<(), BastionError> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), BastionError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o660);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), BastionError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::ApprovalMode;
    use crate::inventory::Inventory;
    use async_trait::async_trait;
    use bastion_core::{AssistantTurn, ContentBlock, LLMError, Message, StopReason, Tool};

    struct EchoProvider;

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn chat(&self, _messages: &[Message], _tools: &[Tool]) -> Result<AssistantTurn, LLMError> {
            Ok(AssistantTurn {
                content: vec![ContentBlock::text("ack")],
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    async fn spawn_daemon(base: &Path) -> Arc<Daemon> {
        let audit = Arc::new(AuditLog::open(&base.join("audit.jsonl"), 2000).await.unwrap());
        let kernel = Arc::new(DispatchKernel::new(
            Arc::new(Inventory::default()),
            audit,
            ExecutionConfig::default(),
            ApprovalMode::AutoDeny,
        ));
        let daemon = Arc::new(Daemon::new(
            base.join("agent.sock"),
            base.join("sessions"),
            Arc::new(EchoProvider),
            kernel,
            ExecutionConfig::default(),
        ));
        let serve_daemon = Arc::clone(&daemon);
        tokio::spawn(async move {
            let _ = serve_daemon.serve().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        daemon
    }

    #[tokio::test]
    async fn single_turn_round_trip_over_socket() {
        let dir = tempfile::TempDir::new().unwrap();
        let daemon = spawn_daemon(dir.path()).await;

        let stream = UnixStream::connect(&daemon.socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"message\": \"hello\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let banner = lines.next_line().await.unwrap().unwrap();
        assert!(banner.contains("\"banner\""));
        let response = lines.next_line().await.unwrap().unwrap();
        assert!(response.contains("\"response\""));
        let done = lines.next_line().await.unwrap().unwrap();
        assert!(done.contains("\"done\""));
    }

    #[tokio::test]
    async fn second_client_is_rejected_while_first_is_attached() {
        let dir = tempfile::TempDir::new().unwrap();
        let daemon = spawn_daemon(dir.path()).await;

        let first = UnixStream::connect(&daemon.socket_path).await.unwrap();
        let (first_read, mut first_write) = first.into_split();
        first_write.write_all(b"{}\n").await.unwrap();
        let mut first_lines = BufReader::new(first_read).lines();
        let _banner = first_lines.next_line().await.unwrap().unwrap();

        let second = UnixStream::connect(&daemon.socket_path).await.unwrap();
        let (second_read, mut second_write) = second.into_split();
        second_write.write_all(b"{}\n").await.unwrap();
        let mut second_lines = BufReader::new(second_read).lines();
        let reply = second_lines.next_line().await.unwrap().unwrap();
        assert!(reply.contains("session is active"));
        let done = second_lines.next_line().await.unwrap().unwrap();
        assert!(done.contains("\"done\""));
    }
}
