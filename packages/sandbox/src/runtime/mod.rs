// ABOUTME: Isolation runtime trait and shared types for execution backends
// ABOUTME: Defines the create/start/wait/kill/collect/remove seam the orchestrator depends on

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::types::InstanceExit;

pub mod docker;

pub use docker::DockerRuntime;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("instance error: {0}")]
    Instance(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("runtime not available: {0}")]
    NotAvailable(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Read-only mount of the staged submission code.
#[derive(Debug, Clone)]
pub struct CodeMount {
    pub host_path: PathBuf,
    pub container_path: String,
}

/// Writable tmpfs scratch area.
#[derive(Debug, Clone)]
pub struct ScratchMount {
    pub container_path: String,
    pub size_mb: u64,
}

/// Everything a runtime needs to materialize one isolated instance.
///
/// Built by the launcher from a submission and its resource profile; the
/// runtime applies every constraint at creation time, never retrofitted.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    /// Unique instance name; must not collide across concurrent launches
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub code_mount: CodeMount,
    pub scratch: Option<ScratchMount>,
    pub memory_limit_bytes: i64,
    pub cpu_cores: f64,
    pub pid_limit: i64,
    pub network_enabled: bool,
    pub readonly_rootfs: bool,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
}

/// Output streams captured from an instance, bounded per stream.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

/// The isolation-capable execution runtime the launcher talks to.
///
/// Any backend exposing create/start/wait/kill/collect/remove semantics
/// satisfies the contract; the orchestrator holds it as a trait object and
/// never sees backend-specific types.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IsolationRuntime: Send + Sync {
    /// Verify the runtime is reachable.
    async fn ping(&self) -> Result<()>;

    /// Create a fresh instance configured with the spec's constraints.
    /// Returns the runtime's identifier for it. Nothing is running yet.
    async fn create(&self, spec: &InstanceSpec) -> Result<String>;

    /// Start a created instance without waiting for completion.
    async fn start(&self, instance_id: &str) -> Result<()>;

    /// Suspend until the instance's program exits on its own.
    async fn wait(&self, instance_id: &str) -> Result<InstanceExit>;

    /// Forcibly terminate a running instance. Must succeed even when the
    /// program ignores cooperative termination requests.
    async fn kill(&self, instance_id: &str) -> Result<()>;

    /// Collect buffered stdout/stderr, capped at `cap_bytes` per stream.
    async fn collect_output(&self, instance_id: &str, cap_bytes: usize) -> Result<CapturedOutput>;

    /// Destroy the instance and its ephemeral resources. Removing an
    /// already-gone instance is not an error.
    async fn remove(&self, instance_id: &str) -> Result<()>;
}
