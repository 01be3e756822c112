// ABOUTME: Docker implementation of the isolation runtime via bollard
// ABOUTME: Creates resource-confined containers, waits on exit, captures logs, removes

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tracing::{debug, error, info, warn};

use super::{CapturedOutput, InstanceSpec, IsolationRuntime, Result, RuntimeError};
use crate::types::InstanceExit;

/// Label applied to all Runbox containers for tracking
const RUNBOX_LABEL: &str = "runbox.managed";

/// Docker-backed isolation runtime.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker daemon and verify it responds.
    ///
    /// On Unix: /var/run/docker.sock
    /// On Windows: npipe:////./pipe/docker_engine
    pub async fn connect() -> Result<Self> {
        #[cfg(unix)]
        let client = Docker::connect_with_socket_defaults()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;

        #[cfg(windows)]
        let client = Docker::connect_with_named_pipe_defaults()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;

        client.ping().await.map_err(|e| {
            error!("Failed to connect to Docker daemon: {}", e);
            RuntimeError::NotAvailable(e.to_string())
        })?;

        info!("Successfully connected to Docker daemon");
        Ok(Self { client })
    }

    /// Create with a specific Docker connection (tests, custom endpoints).
    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }

    /// Translate an instance spec into a bollard container config.
    ///
    /// Every ceiling is applied here, at creation time: memory with swap
    /// pinned to the same value, CPU quota, pids limit, network mode,
    /// read-only rootfs, all capabilities dropped, no restarts.
    fn to_container_config(&self, spec: &InstanceSpec) -> Config<String> {
        let mut labels = spec.labels.clone();
        labels.insert(RUNBOX_LABEL.to_string(), "true".to_string());

        let memory = spec.memory_limit_bytes;
        let code_bind = format!(
            "{}:{}:ro",
            spec.code_mount.host_path.display(),
            spec.code_mount.container_path
        );

        let mut host_config = HostConfig {
            binds: Some(vec![code_bind]),
            memory: Some(memory),
            // Pin swap to the memory limit so it cannot be bypassed
            memory_swap: Some(memory),
            // CPU quota (100000 = 1 core)
            cpu_quota: Some((spec.cpu_cores * 100_000.0) as i64),
            cpu_period: Some(100_000),
            pids_limit: Some(spec.pid_limit),
            network_mode: Some(if spec.network_enabled {
                "bridge".to_string()
            } else {
                "none".to_string()
            }),
            readonly_rootfs: Some(spec.readonly_rootfs),
            cap_drop: Some(vec!["ALL".to_string()]),
            privileged: Some(false),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                maximum_retry_count: Some(0),
            }),
            ..Default::default()
        };

        if let Some(scratch) = &spec.scratch {
            host_config.tmpfs = Some(HashMap::from([(
                scratch.container_path.clone(),
                format!("rw,size={}m", scratch.size_mb),
            )]));
        }

        Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(spec.env.clone()),
            working_dir: Some(spec.code_mount.container_path.clone()),
            labels: Some(labels),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl IsolationRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::NotAvailable(e.to_string()))
    }

    async fn create(&self, spec: &InstanceSpec) -> Result<String> {
        debug!("Creating container {} with image {}", spec.name, spec.image);

        let config = self.to_container_config(spec);
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .client
            .create_container(Some(options), config)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => RuntimeError::Image(format!(
                    "image {} not found locally; pull it first",
                    spec.image
                )),
                _ => RuntimeError::Instance(e.to_string()),
            })?;

        info!("Created container {} ({})", spec.name, response.id);
        Ok(response.id)
    }

    async fn start(&self, instance_id: &str) -> Result<()> {
        debug!("Starting container {}", instance_id);

        self.client
            .start_container(instance_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::Instance(e.to_string()))?;

        info!("Started container {}", instance_id);
        Ok(())
    }

    async fn wait(&self, instance_id: &str) -> Result<InstanceExit> {
        let mut wait_stream = self
            .client
            .wait_container(instance_id, None::<WaitContainerOptions<String>>);

        // bollard reports a non-zero exit as DockerContainerWaitError
        let status_code = match wait_stream.next().await {
            Some(Ok(response)) => response.status_code,
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(RuntimeError::Instance(e.to_string())),
            None => {
                return Err(RuntimeError::Instance(format!(
                    "wait stream for {} ended without a status",
                    instance_id
                )))
            }
        };

        // The daemon's own memory-kill flag, when exposed
        let oom_killed = self
            .client
            .inspect_container(instance_id, None)
            .await
            .ok()
            .and_then(|inspect| inspect.state)
            .and_then(|state| state.oom_killed)
            .unwrap_or(false);

        debug!(
            "Container {} exited with status {} (oom_killed={})",
            instance_id, status_code, oom_killed
        );

        Ok(InstanceExit {
            status_code,
            oom_killed,
        })
    }

    async fn kill(&self, instance_id: &str) -> Result<()> {
        debug!("Killing container {}", instance_id);

        match self
            .client
            .kill_container(instance_id, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match e {
                // Already stopped or already gone is not a failure to kill
                BollardError::DockerResponseServerError {
                    status_code: 404 | 409,
                    ..
                } => {
                    debug!("Container {} already stopped", instance_id);
                    Ok(())
                }
                _ => {
                    error!("Failed to kill container {}: {}", instance_id, e);
                    Err(RuntimeError::Instance(e.to_string()))
                }
            },
        }
    }

    async fn collect_output(&self, instance_id: &str, cap_bytes: usize) -> Result<CapturedOutput> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut log_stream = self.client.logs(instance_id, Some(options));
        let mut output = CapturedOutput::default();

        while let Some(item) = log_stream.next().await {
            match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    append_capped(
                        &mut output.stdout,
                        &mut output.stdout_truncated,
                        &message,
                        cap_bytes,
                    );
                }
                Ok(LogOutput::StdErr { message }) => {
                    append_capped(
                        &mut output.stderr,
                        &mut output.stderr_truncated,
                        &message,
                        cap_bytes,
                    );
                }
                Ok(_) => {}
                Err(e) => return Err(RuntimeError::Instance(e.to_string())),
            }
        }

        if output.stdout_truncated || output.stderr_truncated {
            warn!(
                "Output of container {} truncated at {} bytes per stream",
                instance_id, cap_bytes
            );
        }

        Ok(output)
    }

    async fn remove(&self, instance_id: &str) -> Result<()> {
        debug!("Removing container {}", instance_id);

        let options = RemoveContainerOptions {
            force: true,
            v: true, // Remove volumes
            ..Default::default()
        };

        match self
            .client
            .remove_container(instance_id, Some(options))
            .await
        {
            Ok(_) => {
                info!("Removed container {}", instance_id);
                Ok(())
            }
            Err(e) => match e {
                // Container already removed is not an error
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => {
                    debug!("Container {} already removed", instance_id);
                    Ok(())
                }
                _ => {
                    error!("Failed to remove container {}: {}", instance_id, e);
                    Err(RuntimeError::Instance(e.to_string()))
                }
            },
        }
    }
}

/// Append a chunk to a capture buffer, enforcing the per-stream cap.
fn append_capped(buf: &mut Vec<u8>, truncated: &mut bool, chunk: &[u8], cap: usize) {
    if buf.len() >= cap {
        *truncated = true;
        return;
    }
    let remaining = cap - buf.len();
    if chunk.len() > remaining {
        buf.extend_from_slice(&chunk[..remaining]);
        *truncated = true;
    } else {
        buf.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CodeMount, ScratchMount};
    use std::path::PathBuf;

    fn spec() -> InstanceSpec {
        InstanceSpec {
            name: "runbox-abc123def456".to_string(),
            image: "python:3.11-slim".to_string(),
            command: vec![
                "python".to_string(),
                "/sandbox/main.py".to_string(),
            ],
            code_mount: CodeMount {
                host_path: PathBuf::from("/tmp/runbox-arena"),
                container_path: "/sandbox".to_string(),
            },
            scratch: None,
            memory_limit_bytes: 128 * 1024 * 1024,
            cpu_cores: 1.0,
            pid_limit: 64,
            network_enabled: false,
            readonly_rootfs: true,
            env: vec!["PYTHONUNBUFFERED=1".to_string()],
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires Docker daemon
    async fn connect_to_daemon() {
        let runtime = DockerRuntime::connect().await;
        assert!(runtime.is_ok(), "Failed to connect to Docker: {:?}", runtime.err());
    }

    #[test]
    fn config_applies_every_ceiling_at_creation() {
        let runtime = DockerRuntime::with_client(
            Docker::connect_with_socket_defaults().expect("client handle"),
        );
        let config = runtime.to_container_config(&spec());

        let host = config.host_config.expect("host config");
        assert_eq!(host.memory, Some(128 * 1024 * 1024));
        assert_eq!(host.memory_swap, Some(128 * 1024 * 1024));
        assert_eq!(host.cpu_quota, Some(100_000));
        assert_eq!(host.cpu_period, Some(100_000));
        assert_eq!(host.pids_limit, Some(64));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.readonly_rootfs, Some(true));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
        assert_eq!(host.privileged, Some(false));
        assert_eq!(
            host.binds,
            Some(vec!["/tmp/runbox-arena:/sandbox:ro".to_string()])
        );
        assert!(host.tmpfs.is_none());

        assert_eq!(config.image.as_deref(), Some("python:3.11-slim"));
        assert_eq!(
            config.labels.unwrap().get(RUNBOX_LABEL).map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn scratch_mount_becomes_tmpfs() {
        let runtime = DockerRuntime::with_client(
            Docker::connect_with_socket_defaults().expect("client handle"),
        );
        let mut spec = spec();
        spec.scratch = Some(ScratchMount {
            container_path: "/scratch".to_string(),
            size_mb: 64,
        });

        let config = runtime.to_container_config(&spec);
        let tmpfs = config.host_config.unwrap().tmpfs.unwrap();
        assert_eq!(tmpfs.get("/scratch").map(String::as_str), Some("rw,size=64m"));
    }

    #[test]
    fn bridged_network_when_enabled() {
        let runtime = DockerRuntime::with_client(
            Docker::connect_with_socket_defaults().expect("client handle"),
        );
        let mut spec = spec();
        spec.network_enabled = true;

        let config = runtime.to_container_config(&spec);
        assert_eq!(
            config.host_config.unwrap().network_mode.as_deref(),
            Some("bridge")
        );
    }

    #[test]
    fn append_capped_truncates_at_the_cap() {
        let mut buf = Vec::new();
        let mut truncated = false;

        append_capped(&mut buf, &mut truncated, b"hello", 8);
        assert_eq!(buf, b"hello");
        assert!(!truncated);

        append_capped(&mut buf, &mut truncated, b"world", 8);
        assert_eq!(buf, b"hellowor");
        assert!(truncated);

        // Further appends stay capped
        append_capped(&mut buf, &mut truncated, b"more", 8);
        assert_eq!(buf.len(), 8);
    }
}
