//! Podman sandbox driver.
//!
//! Session-reuse lifecycle: the first run launches one hardened detached
//! container kept alive by a long sleep, subsequent runs exec into it, and
//! cleanup stops and removes it. The per-card lifecycle launches a fresh
//! `--rm` container for every command instead.

use async_trait::async_trait;
use chrono::Utc;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shellcard_core::error::{ShellcardError, ShellcardResult};
use shellcard_core::traits::{ContainerLifecycle, ExecutionConfig, ExecutionResult, Sandbox};

const KEEP_ALIVE_SECONDS: &str = "3600";
const ASSETS_DIR: &str = "/tmp/assets";

#[derive(Default)]
struct ContainerState {
    container_id: Option<String>,
    container_name: Option<String>,
    assets_materialized: bool,
}

/// Sandbox driver backed by rootless Podman.
pub struct PodmanDriver {
    podman_path: PathBuf,
    lifecycle: ContainerLifecycle,
    state: Mutex<ContainerState>,
}

impl PodmanDriver {
    /// Create a driver, failing fast when podman is not on PATH.
    pub fn new() -> ShellcardResult<Self> {
        let podman_path = find_in_path("podman").ok_or_else(|| {
            ShellcardError::sandbox("podman not found in PATH; install podman to run sandboxed cards")
        })?;
        Ok(Self::with_binary(podman_path))
    }

    fn with_binary(podman_path: PathBuf) -> Self {
        Self {
            podman_path,
            lifecycle: ContainerLifecycle::SessionReuse,
            state: Mutex::new(ContainerState::default()),
        }
    }

    /// Switch the container lifecycle model.
    pub fn with_lifecycle(mut self, lifecycle: ContainerLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Probe whether podman exists and answers a version query promptly.
    pub async fn is_available() -> ShellcardResult<()> {
        let podman = find_in_path("podman")
            .ok_or_else(|| ShellcardError::sandbox("podman not found in PATH"))?;

        let probe = Command::new(&podman)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match tokio::time::timeout(Duration::from_secs(10), probe).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ShellcardError::sandbox(format!(
                "podman is not functional (version query exited with {status})"
            ))),
            Ok(Err(e)) => Err(ShellcardError::sandbox_with_source("podman is not functional", e)),
            Err(_) => Err(ShellcardError::sandbox("podman did not answer a version query within 10s")),
        }
    }

    async fn run_session_reuse(&self, config: &ExecutionConfig) -> ShellcardResult<ExecutionResult> {
        self.ensure_container(config).await?;
        if !config.assets.is_empty() {
            self.materialize_assets(config).await?;
        }
        self.exec_in_container(config).await
    }

    /// Start the session container unless a healthy one is already held.
    async fn ensure_container(&self, config: &ExecutionConfig) -> ShellcardResult<()> {
        let mut state = self.state.lock().await;

        if let Some(container_id) = state.container_id.clone() {
            // Verify the container is actually running, not merely existing.
            if self.container_running(&container_id).await {
                debug!(container_id = %container_id, "reusing running session container");
                return Ok(());
            }
            debug!(old_container_id = %container_id, "session container not running, starting a new one");
            *state = ContainerState::default();
        }

        let container_name = format!("shellcard-session-{}", Uuid::new_v4().simple());
        let args = build_run_args(config, &container_name);
        debug!(correlation_id = %config.correlation_id, ?args, "starting session container");

        let output = Command::new(&self.podman_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| ShellcardError::sandbox_with_source("failed to launch podman", e))?;

        // Stdout alone carries the container id; stderr may hold pull noise.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ShellcardError::sandbox(format!(
                "failed to start container from {}: {}",
                config.image,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            warn!(driver = "podman", image = %config.image, stderr = %stderr.trim(), "container start produced stderr output");
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(ShellcardError::sandbox("podman did not report a container id on stdout"));
        }

        info!(
            driver = "podman",
            correlation_id = %config.correlation_id,
            image = %config.image,
            container_id = %container_id,
            name = %container_name,
            "started session container"
        );
        state.container_id = Some(container_id);
        state.container_name = Some(container_name);
        state.assets_materialized = false;
        Ok(())
    }

    async fn container_running(&self, container_id: &str) -> bool {
        let output = Command::new(&self.podman_path)
            .args([
                "container",
                "inspect",
                container_id,
                "--format",
                "{{.State.Running}}",
            ])
            .output()
            .await;
        matches!(output, Ok(output) if output.status.success()
            && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    /// Copy the config's deck assets into the container's writable tmpfs.
    /// Runs once per container; a restarted container is repopulated.
    async fn materialize_assets(&self, config: &ExecutionConfig) -> ShellcardResult<()> {
        let mut state = self.state.lock().await;
        if state.assets_materialized {
            return Ok(());
        }
        let container_id = state
            .container_id
            .clone()
            .ok_or_else(|| ShellcardError::sandbox("no session container to receive assets"))?;

        for (filename, content) in &config.assets {
            let target = format!("{ASSETS_DIR}/{filename}");
            let parent = Path::new(&target)
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ASSETS_DIR.to_string());

            self.run_podman(&["exec", &container_id, "mkdir", "-p", &parent])
                .await?;

            let mut staging = tempfile::NamedTempFile::new()?;
            staging.write_all(content)?;
            staging.flush()?;
            let staging_path = staging.path().display().to_string();
            let destination = format!("{container_id}:{target}");
            self.run_podman(&["cp", &staging_path, &destination]).await?;
            debug!(file = %filename, bytes = content.len(), "asset materialized");
        }

        state.assets_materialized = true;
        Ok(())
    }

    async fn run_podman(&self, args: &[&str]) -> ShellcardResult<()> {
        let output = Command::new(&self.podman_path)
            .args(args)
            .output()
            .await
            .map_err(|e| ShellcardError::sandbox_with_source("failed to launch podman", e))?;
        if !output.status.success() {
            return Err(ShellcardError::sandbox(format!(
                "podman {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn exec_in_container(&self, config: &ExecutionConfig) -> ShellcardResult<ExecutionResult> {
        let container_id = {
            let state = self.state.lock().await;
            state
                .container_id
                .clone()
                .ok_or_else(|| ShellcardError::sandbox("no session container available"))?
        };

        let args = build_exec_args(config, &container_id);
        debug!(correlation_id = %config.correlation_id, workdir = %config.working_dir, "executing command in container");

        self.run_bounded(config, args, container_id).await
    }

    async fn run_per_card(&self, config: &ExecutionConfig) -> ShellcardResult<ExecutionResult> {
        if !config.assets.is_empty() {
            return Err(ShellcardError::validation(
                "per-card lifecycle does not support deck assets; use session-reuse",
            ));
        }
        let args = build_per_card_args(config);
        self.run_bounded(config, args, String::new()).await
    }

    /// Launch podman with the per-command deadline from the exec config.
    /// A deadline hit kills the child and reports exit −1 with `timed_out`.
    async fn run_bounded(
        &self,
        config: &ExecutionConfig,
        args: Vec<String>,
        container_id: String,
    ) -> ShellcardResult<ExecutionResult> {
        let started_at = Utc::now();
        let stopwatch = Instant::now();

        let child = Command::new(&self.podman_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShellcardError::sandbox_with_source("failed to launch podman", e))?;

        let output = match tokio::time::timeout(config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ShellcardError::sandbox_with_source("command execution failed", e));
            }
            Err(_elapsed) => {
                warn!(
                    driver = "podman",
                    correlation_id = %config.correlation_id,
                    timeout_secs = config.timeout.as_secs(),
                    "command exceeded its deadline and was terminated"
                );
                return Ok(ExecutionResult {
                    exit_code: -1,
                    success: false,
                    timed_out: true,
                    stdout: String::new(),
                    stderr: String::new(),
                    started_at,
                    duration: stopwatch.elapsed(),
                    container_id,
                    image_used: config.image.clone(),
                    correlation_id: config.correlation_id.clone(),
                });
            }
        };

        let duration = stopwatch.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        let result = ExecutionResult {
            exit_code,
            success: output.status.success(),
            timed_out: false,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            started_at,
            duration,
            container_id,
            image_used: config.image.clone(),
            correlation_id: config.correlation_id.clone(),
        };

        info!(
            driver = "podman",
            correlation_id = %config.correlation_id,
            image = %config.image,
            container_id = %result.container_id,
            exit_code,
            success = result.success,
            duration_ms = duration.as_millis() as u64,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "command execution completed"
        );
        Ok(result)
    }
}

#[async_trait]
impl Sandbox for PodmanDriver {
    async fn run(&self, config: ExecutionConfig) -> ShellcardResult<ExecutionResult> {
        config.validate()?;

        match self.lifecycle {
            ContainerLifecycle::SessionReuse => self.run_session_reuse(&config).await,
            ContainerLifecycle::PerCard => self.run_per_card(&config).await,
            ContainerLifecycle::DeckPersistent => Err(ShellcardError::validation(
                "deck-persistent lifecycle is not supported by the podman driver",
            )),
        }
    }

    async fn cleanup(&self) -> ShellcardResult<()> {
        let (container_id, container_name) = {
            let mut state = self.state.lock().await;
            (state.container_id.take(), state.container_name.take())
        };

        let Some(container_id) = container_id else {
            return Ok(()); // nothing to clean up
        };

        debug!(container_id = %container_id, "cleaning up session container");
        if let Err(e) = self.run_podman(&["container", "stop", &container_id]).await {
            warn!(container_id = %container_id, error = %e, "failed to stop container");
        }
        self.run_podman(&["container", "rm", &container_id]).await?;

        info!(
            driver = "podman",
            container_id = %container_id,
            container_name = container_name.as_deref().unwrap_or(""),
            "session container cleaned up"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "podman"
    }
}

/// Arguments for the detached keep-alive session container, hardened beyond
/// whatever the exec config specifies.
fn build_run_args(config: &ExecutionConfig, container_name: &str) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        container_name.to_string(),
    ];
    args.extend(hardening_args(config));
    args.extend(placement_args(config));
    args.push(config.image.clone());
    args.push("sleep".to_string());
    args.push(KEEP_ALIVE_SECONDS.to_string());
    args
}

/// Arguments for a one-shot per-card container.
fn build_per_card_args(config: &ExecutionConfig) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string()];
    args.extend(hardening_args(config));
    args.extend(placement_args(config));
    args.push(config.image.clone());
    args.extend(config.command.iter().cloned());
    args
}

fn hardening_args(config: &ExecutionConfig) -> Vec<String> {
    let mut args = vec![
        "--cap-drop=ALL".to_string(),
        "--security-opt=no-new-privileges".to_string(),
        "--read-only".to_string(),
    ];
    for (path, options) in &config.tmpfs_mounts {
        args.push("--tmpfs".to_string());
        args.push(format!("{path}:{options}"));
    }
    if !config.network_enabled {
        args.push("--network=none".to_string());
    }
    args
}

fn placement_args(config: &ExecutionConfig) -> Vec<String> {
    let mut args = Vec::new();
    if !config.working_dir.is_empty() {
        args.push("--workdir".to_string());
        args.push(config.working_dir.clone());
    }
    for (key, value) in &config.environment {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    if let Some(memory) = &config.memory_limit {
        args.push("--memory".to_string());
        args.push(memory.clone());
    }
    if let Some(cpus) = &config.cpu_limit {
        args.push("--cpus".to_string());
        args.push(cpus.clone());
    }
    args
}

/// Arguments to exec inside the running session container with per-command
/// working directory and environment overrides.
fn build_exec_args(config: &ExecutionConfig, container_id: &str) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if !config.working_dir.is_empty() {
        args.push("--workdir".to_string());
        args.push(config.working_dir.clone());
    }
    for (key, value) in &config.environment {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(container_id.to_string());
    args.extend(config.command.iter().cloned());
    args
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
