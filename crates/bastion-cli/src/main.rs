//! Command-line front end: wires a concrete [`AnthropicProvider`] onto the
//! provider-agnostic `bastion-agent` core and exposes the `run`/`daemon`/
//! `send`/`check-config`/`sessions` surface described in the agent's
//! external interfaces.

mod anthropic;
mod cli_args;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use bastion_agent::{
    audit::AuditLog, register_builtin_tools, BastionConfig, ConversationLoop, Daemon,
    DispatchKernel, Inventory, StdoutSink,
};

use cli_args::{CliArgs, Commands};

const STARTUP_ERROR: u8 = 1;
const INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logging::setup_logging(args.log_level.as_deref(), args.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };

    runtime.block_on(run(args))
}

fn resolve_config_dir(args: &CliArgs) -> PathBuf {
    if let Some(dir) = &args.config_dir {
        return dir.clone();
    }
    if let Ok(dir) = std::env::var("BASTION_AGENT_CONFIG") {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bastion-agent")
}

async fn run(args: CliArgs) -> ExitCode {
    let config_dir = resolve_config_dir(&args);

    match &args.command {
        Commands::CheckConfig => run_check_config(&config_dir),
        Commands::Run => run_interactive(&args, &config_dir).await,
        Commands::Daemon => run_daemon(&args, &config_dir).await,
        Commands::Send {
            message,
            interactive,
            resume,
        } => run_send(&args, &config_dir, message.as_deref(), *interactive, resume.as_deref()).await,
        Commands::Sessions { limit } => run_sessions(&config_dir, *limit).await,
    }
}

/// Load config + inventory, print what would be used, exit non-zero on
/// any failure. Never touches the network or the daemon socket.
fn run_check_config(config_dir: &Path) -> ExitCode {
    let config = match BastionConfig::load(config_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };
    match Inventory::load(&config.inventory_path) {
        Ok(inventory) => {
            println!("configuration OK ({})", config_dir.display());
            println!("model: {}", config.model);
            println!("inventory: {}", config.inventory_path.display());
            println!("servers: {}", inventory.server_names().join(", "));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("inventory error: {e}");
            ExitCode::from(STARTUP_ERROR)
        }
    }
}

struct Loaded {
    config: BastionConfig,
    kernel: Arc<DispatchKernel>,
}

async fn load_agent(args: &CliArgs, config_dir: &Path) -> Result<Loaded, String> {
    let mut config = BastionConfig::load(config_dir).map_err(|e| e.to_string())?;
    if let Some(socket) = &args.socket {
        config.daemon.socket_path = socket.clone();
    }

    let inventory = Inventory::load(&config.inventory_path).map_err(|e| e.to_string())?;
    let audit = AuditLog::open(&config.audit.path, config.audit.max_field_len)
        .await
        .map_err(|e| e.to_string())?;

    let mut kernel = DispatchKernel::new(
        Arc::new(inventory),
        Arc::new(audit),
        config.execution.clone(),
        config.approval_mode,
    );
    register_builtin_tools(&mut kernel).map_err(|e| e.to_string())?;

    Ok(Loaded {
        config,
        kernel: Arc::new(kernel),
    })
}

fn anthropic_provider(model: &str) -> Result<anthropic::AnthropicProvider, String> {
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| "ANTHROPIC_API_KEY is required for this command".to_string())?;
    Ok(anthropic::AnthropicProvider::new(api_key, model.to_string()))
}

async fn run_interactive(args: &CliArgs, config_dir: &Path) -> ExitCode {
    let loaded = match load_agent(args, config_dir).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("startup error: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };
    let provider = match anthropic_provider(&loaded.config.model) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("startup error: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };

    let sink = Arc::new(StdoutSink);
    let mut conversation = ConversationLoop::new(
        Arc::new(provider),
        Arc::clone(&loaded.kernel),
        sink,
        &loaded.config.execution,
    );

    let session_id = bastion_agent::Session::new().session_id;
    let _ = loaded.kernel.audit().session_start(&session_id).await;

    let cancel = conversation.cancel_token();
    let outcome = tokio::select! {
        result = conversation.run() => {
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::from(STARTUP_ERROR)
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            ExitCode::from(INTERRUPTED)
        }
    };
    let _ = loaded.kernel.audit().session_end(&session_id).await;
    outcome
}

async fn run_daemon(args: &CliArgs, config_dir: &Path) -> ExitCode {
    let loaded = match load_agent(args, config_dir).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("startup error: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };
    let provider = match anthropic_provider(&loaded.config.model) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("startup error: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };

    let daemon = Arc::new(Daemon::new(
        loaded.config.daemon.socket_path.clone(),
        loaded.config.daemon.sessions_dir.clone(),
        Arc::new(provider),
        Arc::clone(&loaded.kernel),
        loaded.config.execution.clone(),
    ));

    let socket_path = loaded.config.daemon.socket_path.clone();
    tokio::select! {
        result = daemon.serve() => {
            if let Err(e) = result {
                eprintln!("daemon error: {e}");
                return ExitCode::from(STARTUP_ERROR);
            }
            ExitCode::SUCCESS
        }
        _ = tokio::signal::ctrl_c() => {
            let _ = tokio::fs::remove_file(&socket_path).await;
            ExitCode::from(INTERRUPTED)
        }
    }
}

async fn run_sessions(config_dir: &Path, limit: usize) -> ExitCode {
    let config = match BastionConfig::load(config_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };
    match bastion_agent::Session::list(&config.daemon.sessions_dir, limit).await {
        Ok(sessions) if sessions.is_empty() => {
            println!("no saved sessions");
            ExitCode::SUCCESS
        }
        Ok(sessions) => {
            for s in sessions {
                println!("{}  {} turns  updated {}  {}", s.session_id, s.turns, s.updated_at, s.preview);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error listing sessions: {e}");
            ExitCode::from(STARTUP_ERROR)
        }
    }
}

/// Client side of the daemon wire protocol: connect, send one message (or
/// drive an interactive REPL), render each server event, forward terminal
/// interrupts as cancel frames.
async fn run_send(
    args: &CliArgs,
    config_dir: &Path,
    message: Option<&str>,
    interactive: bool,
    resume: Option<&str>,
) -> ExitCode {
    let config = match BastionConfig::load(config_dir) {
        Ok(mut c) => {
            if let Some(socket) = &args.socket {
                c.daemon.socket_path = socket.clone();
            }
            c
        }
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(STARTUP_ERROR);
        }
    };

    let stream = match UnixStream::connect(&config.daemon.socket_path).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "failed to connect to daemon socket {}: {e}",
                config.daemon.socket_path.display()
            );
            return ExitCode::from(STARTUP_ERROR);
        }
    };
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let first_frame = serde_json::json!({
        "message": message,
        "resume": resume,
    });
    if write_half
        .write_all(format!("{}\n", first_frame).as_bytes())
        .await
        .is_err()
    {
        eprintln!("failed to write to daemon socket");
        return ExitCode::from(STARTUP_ERROR);
    }

    let mut sigint_count = 0u32;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        let done = render_server_line(&text);
                        if done && !interactive {
                            return ExitCode::SUCCESS;
                        }
                        if text.contains("\"goodbye\"") {
                            return ExitCode::SUCCESS;
                        }
                        if done && interactive {
                            if !prompt_and_send(&mut write_half).await {
                                return ExitCode::SUCCESS;
                            }
                        }
                    }
                    Ok(None) => return ExitCode::SUCCESS,
                    Err(_) => return ExitCode::from(STARTUP_ERROR),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                sigint_count += 1;
                if sigint_count == 1 {
                    let cancel_frame = serde_json::json!({"type": "cancel"});
                    let _ = write_half.write_all(format!("{}\n", cancel_frame).as_bytes()).await;
                } else {
                    return ExitCode::from(INTERRUPTED);
                }
            }
        }
    }
}

/// Print one server event line, return whether it was `done` (the
/// natural point to either exit or prompt for the next message).
fn render_server_line(line: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        println!("{line}");
        return false;
    };
    match value.get("type").and_then(serde_json::Value::as_str) {
        Some("banner") => {
            if let Some(id) = value.get("session_id").and_then(serde_json::Value::as_str) {
                println!("[session {id}]");
            }
            false
        }
        Some("response") => {
            if let Some(text) = value.get("text").and_then(serde_json::Value::as_str) {
                println!("{text}");
            }
            false
        }
        Some("tool_call") => {
            println!(
                "-> {}({})",
                value.get("tool").and_then(serde_json::Value::as_str).unwrap_or(""),
                value.get("input").cloned().unwrap_or_default()
            );
            false
        }
        Some("tool_result") => {
            println!(
                "<- {}: {}",
                value.get("tool").and_then(serde_json::Value::as_str).unwrap_or(""),
                value.get("result").cloned().unwrap_or_default()
            );
            false
        }
        Some("error") => {
            eprintln!("error: {}", value.get("text").and_then(serde_json::Value::as_str).unwrap_or(""));
            false
        }
        Some("info") => {
            println!("[info] {}", value.get("text").and_then(serde_json::Value::as_str).unwrap_or(""));
            false
        }
        Some("cancelled") => {
            println!("[cancelled] {}", value.get("text").and_then(serde_json::Value::as_str).unwrap_or(""));
            true
        }
        Some("done") => true,
        Some("goodbye") => true,
        _ => false,
    }
}

async fn prompt_and_send(write_half: &mut tokio::net::unix::OwnedWriteHalf) -> bool {
    print!("> ");
    use std::io::Write;
    let _ = std::io::stdout().flush();

    let line = tokio::task::spawn_blocking(|| {
        use std::io::BufRead;
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(_) => None,
        }
    })
    .await
    .unwrap_or(None);

    let Some(text) = line else {
        return false;
    };
    if text.is_empty() {
        return true;
    }
    let frame = serde_json::json!({"message": text});
    write_half
        .write_all(format!("{}\n", frame).as_bytes())
        .await
        .is_ok()
}
