use std::{
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::Mutex,
    task::JoinHandle,
};
use tracing::{info, warn};

use lirc_thermostat_common::LircConfig;

const CONFIG_BLOB_FILE: &str = "lirc-thermostat.json";

/// Outbound side of the dispatcher. Fire-and-forget: an error is only
/// reported back for logging.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, command: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub enum LircBackend {
    Daemon(LircTransport),
    Disabled(Counters),
}

impl LircBackend {
    pub fn disabled() -> Self {
        Self::Disabled(Counters::default())
    }

    pub async fn diagnostics(&self) -> TransportDiagnostics {
        match self {
            Self::Daemon(transport) => {
                transport
                    .counters
                    .snapshot(true, Some(transport.config.remote.clone()))
                    .await
            }
            Self::Disabled(counters) => counters.snapshot(false, None).await,
        }
    }
}

impl Transport for LircBackend {
    async fn send(&self, command: &str) -> anyhow::Result<()> {
        match self {
            Self::Daemon(transport) => transport.send(command).await,
            Self::Disabled(counters) => {
                warn!("LIRC disabled, dropping command {command}");
                counters.record_dropped(command).await;
                Ok(())
            }
        }
    }
}

#[derive(Default)]
pub struct Counters {
    sent_commands: AtomicU64,
    failed_commands: AtomicU64,
    dropped_commands: AtomicU64,
    last: Mutex<LastSend>,
}

#[derive(Default)]
struct LastSend {
    command: Option<String>,
    error: Option<String>,
}

impl Counters {
    async fn record(&self, command: &str, result: &anyhow::Result<()>) {
        let mut last = self.last.lock().await;
        last.command = Some(command.to_string());
        match result {
            Ok(()) => {
                self.sent_commands.fetch_add(1, Ordering::Relaxed);
                last.error = None;
            }
            Err(err) => {
                self.failed_commands.fetch_add(1, Ordering::Relaxed);
                last.error = Some(format!("{err:#}"));
            }
        }
    }

    async fn record_dropped(&self, command: &str) {
        let mut last = self.last.lock().await;
        last.command = Some(command.to_string());
        self.dropped_commands.fetch_add(1, Ordering::Relaxed);
    }

    async fn snapshot(&self, enabled: bool, remote: Option<String>) -> TransportDiagnostics {
        let last = self.last.lock().await;
        TransportDiagnostics {
            enabled,
            remote,
            sent_commands: self.sent_commands.load(Ordering::Relaxed),
            failed_commands: self.failed_commands.load(Ordering::Relaxed),
            dropped_commands: self.dropped_commands.load(Ordering::Relaxed),
            last_command: last.command.clone(),
            last_error: last.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportDiagnostics {
    pub enabled: bool,
    pub remote: Option<String>,
    #[serde(rename = "sentCommands")]
    pub sent_commands: u64,
    #[serde(rename = "failedCommands")]
    pub failed_commands: u64,
    #[serde(rename = "droppedCommands")]
    pub dropped_commands: u64,
    #[serde(rename = "lastCommand")]
    pub last_command: Option<String>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

pub struct LircTransport {
    config: LircConfig,
    counters: Counters,
}

impl LircTransport {
    /// Persists the device config and launches `lircd`. Daemon output and its
    /// exit code go to the log only.
    pub async fn start(config: LircConfig) -> anyhow::Result<Self> {
        let blob_path = PathBuf::from(&config.tmp_dir).join(CONFIG_BLOB_FILE);
        persist_config(&blob_path, &config).await?;
        info!("lirc config written to {}", blob_path.display());

        if let Err(err) = spawn_daemon(&config) {
            warn!("failed to start lircd, relying on a running daemon: {err:#}");
        }

        Ok(Self {
            config,
            counters: Counters::default(),
        })
    }

    pub async fn send(&self, command: &str) -> anyhow::Result<()> {
        let result = self.irsend(command).await;
        self.counters.record(command, &result).await;
        result
    }

    async fn irsend(&self, command: &str) -> anyhow::Result<()> {
        let args = send_once_args(&self.config.remote, command)?;
        let output = Command::new(&self.config.commands.irsend)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.commands.irsend))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "irsend exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }
        Ok(())
    }
}

/// Arguments for `irsend`. Without a configured remote the command is
/// expected to carry both the remote and the key, e.g. `aircon KEY_POWER`.
fn send_once_args(remote: &str, command: &str) -> anyhow::Result<Vec<String>> {
    let mut args = vec!["SEND_ONCE".to_string()];
    if !remote.is_empty() {
        args.push(remote.to_string());
    }
    args.extend(command.split_whitespace().map(str::to_string));

    if args.len() < 3 {
        bail!("command {command:?} does not name a remote and a key");
    }
    Ok(args)
}

async fn persist_config(path: &Path, config: &LircConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(config)?;
    tokio::fs::write(path, payload)
        .await
        .with_context(|| format!("failed to write lirc config to {}", path.display()))?;
    Ok(())
}

fn daemon_args(config: &LircConfig) -> Vec<String> {
    vec![
        "--nodaemon".to_string(),
        format!("--driver={}", config.lirc_driver),
        format!("--device={}", config.device),
        format!("--pidfile={}", config.lirc_pid),
        config.lirc_conf.clone(),
    ]
}

fn spawn_daemon(config: &LircConfig) -> anyhow::Result<JoinHandle<DaemonExit>> {
    let mut command = Command::new(&config.commands.lircd);
    command.args(daemon_args(config));
    supervise(command, "lircd")
        .with_context(|| format!("failed to spawn {}", config.commands.lircd))
}

/// What a supervised daemon left behind once it exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DaemonExit {
    code: Option<i32>,
    stdout_lines: usize,
    stderr_lines: usize,
}

/// Spawns the daemon with its stdout and stderr forwarded to the log line by
/// line, and logs its exit code.
fn supervise(mut command: Command, name: &'static str) -> anyhow::Result<JoinHandle<DaemonExit>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(forward_lines(stdout, name, "stdout")));
    let stderr = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(forward_lines(stderr, name, "stderr")));

    Ok(tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => {
                match status.code() {
                    Some(code) => info!("{name} exited with code {code}"),
                    None => info!("{name} exited with code (unknown)"),
                }
                status.code()
            }
            Err(err) => {
                warn!("failed to wait for {name}: {err}");
                None
            }
        };

        DaemonExit {
            code,
            stdout_lines: forwarded(stdout).await,
            stderr_lines: forwarded(stderr).await,
        }
    }))
}

async fn forwarded(handle: Option<JoinHandle<usize>>) -> usize {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => 0,
    }
}

async fn forward_lines<R>(reader: R, name: &'static str, stream: &'static str) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                info!("{name} {stream}: {line}");
            }
            Ok(None) => break,
            Err(err) => {
                warn!("{name} {stream} read error: {err}");
                break;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_once_args_with_remote() {
        let args = send_once_args("aircon", "KEY_POWER").unwrap();
        assert_eq!(args, vec!["SEND_ONCE", "aircon", "KEY_POWER"]);
    }

    #[test]
    fn send_once_args_without_remote_needs_two_tokens() {
        let args = send_once_args("", "aircon KEY_COOL").unwrap();
        assert_eq!(args, vec!["SEND_ONCE", "aircon", "KEY_COOL"]);
        assert!(send_once_args("", "KEY_COOL").is_err());
    }

    #[test]
    fn daemon_args_follow_config() {
        let config = LircConfig {
            device: "/dev/lirc1".to_string(),
            ..LircConfig::default()
        };

        let args = daemon_args(&config);
        assert_eq!(args[0], "--nodaemon");
        assert!(args.contains(&"--device=/dev/lirc1".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/etc/lirc/lircd.conf"));
    }

    #[tokio::test]
    async fn disabled_backend_counts_dropped_commands() {
        let backend = LircBackend::disabled();
        backend.send("KEY_POWER").await.unwrap();

        let diagnostics = backend.diagnostics().await;
        assert!(!diagnostics.enabled);
        assert_eq!(diagnostics.sent_commands, 0);
        assert_eq!(diagnostics.failed_commands, 0);
        assert_eq!(diagnostics.dropped_commands, 1);
        assert_eq!(diagnostics.last_command.as_deref(), Some("KEY_POWER"));
    }

    #[tokio::test]
    async fn supervised_daemon_forwards_output_and_exit_code() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo hi; echo err >&2; exit 3"]);

        let exit = supervise(command, "lircd").unwrap().await.unwrap();
        assert_eq!(
            exit,
            DaemonExit {
                code: Some(3),
                stdout_lines: 1,
                stderr_lines: 1,
            }
        );
    }

    #[tokio::test]
    async fn missing_daemon_binary_fails_to_spawn() {
        let config = LircConfig {
            commands: lirc_thermostat_common::config::LircCommands {
                lircd: "/nonexistent/lircd".to_string(),
                ..Default::default()
            },
            ..LircConfig::default()
        };
        assert!(spawn_daemon(&config).is_err());
    }

    #[tokio::test]
    async fn start_persists_config_blob() {
        let dir = std::env::temp_dir().join(format!("lirc-thermostat-test-{}", std::process::id()));
        let config = LircConfig {
            tmp_dir: dir.display().to_string(),
            commands: lirc_thermostat_common::config::LircCommands {
                lircd: "/nonexistent/lircd".to_string(),
                ..Default::default()
            },
            ..LircConfig::default()
        };

        let transport = LircTransport::start(config.clone()).await.unwrap();
        let raw = tokio::fs::read(dir.join(CONFIG_BLOB_FILE)).await.unwrap();
        let persisted: LircConfig = serde_json::from_slice(&raw).unwrap();
        assert_eq!(persisted, config);
        assert_eq!(transport.config.device, "/dev/lirc0");

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
