//! Shared subprocess and SSH execution primitives used by every
//! command-shaped built-in tool.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use russh::client;
use russh::keys::PrivateKeyWithHashAlg;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::inventory::ServerEntry;
use crate::tools::ansi::strip_ansi;
use crate::tools::context::ToolResult;

/// Tokenize with POSIX shell-quoting rules and launch exec-style (no
/// shell interposed) so chaining/substitution syntax is inert even if it
/// somehow reached this point.
pub async fn run_local(command: &str, timeout: Duration, cwd: Option<&Path>) -> ToolResult {
    let argv = match shell_words::split(command) {
        Ok(argv) if !argv.is_empty() => argv,
        Ok(_) => return ToolResult::failed("Empty command", 1),
        Err(e) => return ToolResult::failed(format!("Could not parse command: {e}"), 1),
    };

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ToolResult::failed(format!("Command not found: {}", argv[0]), 127);
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return ToolResult::failed(format!("Permission denied: {}", argv[0]), 126);
        }
        Err(e) => return ToolResult::failed(format!("Failed to launch command: {e}"), 1),
    };

    let mut stdout_pipe = child.stdout.take().expect("piped stdout");
    let mut stderr_pipe = child.stderr.take().expect("piped stderr");
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout = strip_ansi(&String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()));
            let stderr = strip_ansi(&String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()));
            let exit_code = status.code().unwrap_or(-1);
            if exit_code == 0 {
                ToolResult {
                    output: stdout,
                    error: String::new(),
                    exit_code: 0,
                }
            } else {
                ToolResult {
                    output: stdout,
                    error: if stderr.is_empty() {
                        format!("Command exited with status {exit_code}")
                    } else {
                        stderr
                    },
                    exit_code,
                }
            }
        }
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            ToolResult::failed(format!("Execution failed: {e}"), 1)
        }
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            ToolResult::failed(format!("Operation timed out ({}s)", timeout.as_secs()), 124)
        }
    }
}

struct NoHostKeyCheck;
struct StrictHostKeyCheck {
    known_hosts_path: std::path::PathBuf,
}

#[async_trait::async_trait]
impl client::Handler for NoHostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

#[async_trait::async_trait]
impl client::Handler for StrictHostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let known_hosts = match russh::keys::known_hosts::check_known_hosts_path(
            "",
            22,
            server_public_key,
            &self.known_hosts_path,
        ) {
            Ok(known) => known,
            Err(_) => false,
        };
        Ok(known_hosts)
    }
}

/// Run `command` over SSH on `server`, with a distinct, remediation-naming
/// error message for every connection-failure class.
///
/// Host-key verification defaults to strict: a server with neither
/// `known_hosts_path` nor `insecure_accept_unknown_hosts = true` refuses
/// to connect rather than silently trusting whatever key it sees.
pub async fn run_remote(
    server_name: &str,
    server: &ServerEntry,
    command: &str,
    connect_timeout: Duration,
    command_timeout: Duration,
) -> ToolResult {
    if server.known_hosts_path.is_none() && !server.insecure_accept_unknown_hosts {
        return ToolResult::failed(
            format!(
                "Refusing to connect to '{server_name}': no known_hosts_path configured and \
                 insecure_accept_unknown_hosts is not set. Add a known_hosts_path to the \
                 inventory entry, or explicitly opt in to unverified host keys."
            ),
            1,
        );
    }

    let config = std::sync::Arc::new(client::Config::default());
    let addr = (server.host.as_str(), 22);

    let connect_result = if let Some(known_hosts_path) = &server.known_hosts_path {
        tokio::time::timeout(
            connect_timeout,
            client::connect(
                config,
                addr,
                StrictHostKeyCheck {
                    known_hosts_path: known_hosts_path.into(),
                },
            ),
        )
        .await
    } else {
        tokio::time::timeout(connect_timeout, client::connect(config, addr, NoHostKeyCheck)).await
    };

    let mut session = match connect_result {
        Err(_) => {
            return ToolResult::failed(
                format!(
                    "Connection to '{server_name}' ({}) timed out after {}s. Check that the \
                     host is reachable and SSH is listening on port 22.",
                    server.host,
                    connect_timeout.as_secs()
                ),
                1,
            );
        }
        Ok(Err(e)) => {
            return ToolResult::failed(
                format!("Failed to connect to '{server_name}' ({}): {e}", server.host),
                1,
            );
        }
        Ok(Ok(session)) => session,
    };

    let key_path = match &server.key_path {
        Some(path) => path,
        None => {
            return ToolResult::failed(
                format!("No key_path configured for server '{server_name}'"),
                1,
            );
        }
    };

    let key_pair = match russh::keys::load_secret_key(key_path, None) {
        Ok(key) => key,
        Err(e) => {
            return ToolResult::failed(
                format!("Invalid SSH key file for '{server_name}' ({key_path}): {e}"),
                1,
            );
        }
    };

    let auth_result = session
        .authenticate_publickey(
            &server.user,
            PrivateKeyWithHashAlg::new(std::sync::Arc::new(key_pair), None),
        )
        .await;

    match auth_result {
        Ok(result) if result.success() => {}
        Ok(_) => {
            return ToolResult::failed(
                format!(
                    "Permission denied connecting to '{server_name}' as '{}': the server \
                     rejected the configured key.",
                    server.user
                ),
                1,
            );
        }
        Err(e) => {
            return ToolResult::failed(
                format!("Authentication error for '{server_name}': {e}"),
                1,
            );
        }
    }

    let channel = match session.channel_open_session().await {
        Ok(channel) => channel,
        Err(e) => {
            return ToolResult::failed(format!("Failed to open channel to '{server_name}': {e}"), 1)
        }
    };

    let run_result = tokio::time::timeout(command_timeout, async {
        let mut channel = channel;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code: Option<u32> = None;

        loop {
            let Some(msg) = channel.wait().await else {
                break;
            };
            match msg {
                russh::ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                russh::ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    stderr.extend_from_slice(data)
                }
                russh::ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                russh::ChannelMsg::Eof | russh::ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok::<_, russh::Error>((stdout, stderr, exit_code))
    })
    .await;

    let _ = session.disconnect(russh::Disconnect::ByApplication, "", "").await;

    match run_result {
        Err(_) => ToolResult::failed(
            format!("Operation timed out ({}s)", command_timeout.as_secs()),
            124,
        ),
        Ok(Err(e)) => ToolResult::failed(format!("Remote execution failed: {e}"), 1),
        Ok(Ok((stdout, stderr, exit_code))) => {
            let exit_code = exit_code.unwrap_or(0) as i32;
            let stdout = strip_ansi(&String::from_utf8_lossy(&stdout));
            let stderr = strip_ansi(&String::from_utf8_lossy(&stderr));
            if exit_code == 0 {
                ToolResult {
                    output: stdout,
                    error: String::new(),
                    exit_code: 0,
                }
            } else {
                ToolResult {
                    output: stdout,
                    error: if stderr.is_empty() {
                        format!("Command exited with status {exit_code}")
                    } else {
                        stderr
                    },
                    exit_code,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_echo_and_captures_stdout() {
        let result = run_local("echo hello world", Duration::from_secs(5), None).await;
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("hello world"));
    }

    #[tokio::test]
    async fn nonexistent_binary_yields_127() {
        let result = run_local("this-binary-does-not-exist-xyz", Duration::from_secs(5), None).await;
        assert_eq!(result.exit_code, 127);
    }

    #[tokio::test]
    async fn timeout_yields_124() {
        let result = run_local("sleep 5", Duration::from_millis(50), None).await;
        assert_eq!(result.exit_code, 124);
    }

    #[tokio::test]
    async fn nonzero_exit_is_captured_as_error() {
        let result = run_local("sh -c 'exit 3'", Duration::from_secs(5), None).await;
        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
    }
}
