// ABOUTME: Core type definitions for sandboxed execution
// ABOUTME: Submissions, resource profiles, instance states, and typed outcomes

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use runbox_config::{constants, env_parsed, env_string};
use serde::{Deserialize, Serialize};

/// Default runtime image used to execute submissions.
pub const DEFAULT_IMAGE: &str = "python:3.11-slim";

/// Default cap on captured bytes per output stream (1 MiB).
pub const DEFAULT_OUTPUT_CAP_BYTES: usize = 1024 * 1024;

/// One unit of code text to execute.
///
/// Created per incoming request and owned by the orchestrator for the
/// duration of a single run. The staged form of the code on disk belongs to
/// the instance's arena and is removed with it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub code: String,
}

impl Submission {
    pub fn new(code: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            // 12 hex chars is plenty for uniqueness and keeps instance names short
            id: id[..12].to_string(),
            code: code.into(),
        }
    }
}

/// Network access granted to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// No network interface at all
    None,
    /// Default bridged networking
    Enabled,
}

impl FromStr for NetworkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(NetworkMode::None),
            "enabled" => Ok(NetworkMode::Enabled),
            other => Err(format!("unknown network mode: {}", other)),
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::None => write!(f, "none"),
            NetworkMode::Enabled => write!(f, "enabled"),
        }
    }
}

/// Filesystem presented to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilesystemMode {
    /// Read-only root, no writable paths
    ReadOnly,
    /// Read-only root plus a writable tmpfs scratch area
    ReadWriteScratch,
}

impl FromStr for FilesystemMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read-only" | "readonly" => Ok(FilesystemMode::ReadOnly),
            "scratch" | "read-write-scratch" => Ok(FilesystemMode::ReadWriteScratch),
            other => Err(format!("unknown filesystem mode: {}", other)),
        }
    }
}

impl fmt::Display for FilesystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilesystemMode::ReadOnly => write!(f, "read-only"),
            FilesystemMode::ReadWriteScratch => write!(f, "scratch"),
        }
    }
}

/// The declarative constraint set applied to one execution.
///
/// Fixed at instance creation; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Memory ceiling in megabytes (swap pinned to the same value)
    pub memory_limit_mb: u64,
    /// CPU share in cores (fractional allowed, e.g. 0.5)
    pub cpu_cores: f64,
    /// Maximum number of processes/threads inside the instance
    pub pid_limit: i64,
    pub network_mode: NetworkMode,
    pub filesystem_mode: FilesystemMode,
    /// Wall-clock deadline measured from the moment the instance is running
    pub deadline: Duration,
    /// Runtime image the submission executes in
    pub image: String,
    /// Cap on captured bytes per output stream
    pub output_cap_bytes: usize,
    /// Size of the writable scratch area in megabytes, when enabled
    pub scratch_size_mb: u64,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            memory_limit_mb: 128,
            cpu_cores: 1.0,
            pid_limit: 64,
            network_mode: NetworkMode::None,
            filesystem_mode: FilesystemMode::ReadOnly,
            deadline: Duration::from_secs(10),
            image: DEFAULT_IMAGE.to_string(),
            output_cap_bytes: DEFAULT_OUTPUT_CAP_BYTES,
            scratch_size_mb: 64,
        }
    }
}

impl ResourceProfile {
    /// Build a profile from the environment, falling back to defaults for
    /// anything unset or invalid.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_limit_mb: env_parsed(constants::RUNBOX_MEMORY_LIMIT_MB, 128, |v| *v >= 4),
            cpu_cores: env_parsed(constants::RUNBOX_CPU_CORES, 1.0, |v| *v > 0.0 && *v <= 64.0),
            pid_limit: env_parsed(constants::RUNBOX_PID_LIMIT, 64, |v| *v > 0),
            network_mode: env_parsed(constants::RUNBOX_NETWORK_MODE, NetworkMode::None, |_| true),
            filesystem_mode: env_parsed(
                constants::RUNBOX_FILESYSTEM_MODE,
                FilesystemMode::ReadOnly,
                |_| true,
            ),
            deadline: Duration::from_secs(env_parsed(
                constants::RUNBOX_TIMEOUT_SECS,
                10,
                |v| *v > 0,
            )),
            image: env_string(constants::RUNBOX_IMAGE, DEFAULT_IMAGE),
            output_cap_bytes: env_parsed(
                constants::RUNBOX_OUTPUT_CAP_BYTES,
                DEFAULT_OUTPUT_CAP_BYTES,
                |v| *v >= 1024,
            ),
            scratch_size_mb: env_parsed(constants::RUNBOX_SCRATCH_SIZE_MB, defaults.scratch_size_mb, |v| {
                *v > 0
            }),
        }
    }
}

/// Lifecycle states of a sandbox instance.
///
/// `Removed` is terminal, reachable from every other state, and always the
/// last transition taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Created,
    Running,
    Completed,
    TimedOut,
    ResourceKilled,
    LaunchFailed,
    Removed,
}

impl InstanceState {
    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition(self, next: InstanceState) -> bool {
        use InstanceState::*;
        match (self, next) {
            (Removed, _) => false,
            (_, Removed) => true,
            (Created, Running) | (Created, LaunchFailed) => true,
            (Running, Completed) | (Running, TimedOut) | (Running, ResourceKilled) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Removed)
    }
}

/// Which resource ceiling killed an execution, when determinable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    Memory,
    Pids,
    Cpu,
    /// Kill-by-limit observed but the specific ceiling could not be attributed
    Generic,
}

/// Typed outcome category of a completed or aborted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "limit")]
pub enum Classification {
    Success,
    Timeout,
    ResourceLimitExceeded(LimitKind),
    RuntimeError,
}

/// Exit information reported by the isolation runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceExit {
    pub status_code: i64,
    /// The runtime's own memory-kill flag, when it exposes one
    pub oom_killed: bool,
}

/// Raw product of the execution monitor, input to the classifier.
#[derive(Debug, Clone)]
pub struct RawOutcome {
    /// Present when the program exited on its own; absent on timeout
    pub exit: Option<InstanceExit>,
    /// Set when the deadline elapsed before natural completion
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Time from the instance entering `Running` to termination
    pub duration: Duration,
}

/// Final result delivered to the caller. Derived, immutable, not persisted.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub classification: Classification,
    pub duration: Duration,
    /// Collaborator-facing error message derived from the classification;
    /// empty on success
    pub error: String,
}

impl ExecutionResult {
    pub fn from_outcome(
        outcome: RawOutcome,
        classification: Classification,
        profile: &ResourceProfile,
    ) -> Self {
        let stdout = String::from_utf8_lossy(&outcome.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&outcome.stderr).into_owned();

        let error = match classification {
            Classification::Success => String::new(),
            Classification::Timeout => format!(
                "Execution timed out after {} seconds",
                profile.deadline.as_secs()
            ),
            Classification::ResourceLimitExceeded(kind) => match kind {
                LimitKind::Memory => "Memory limit exceeded (execution killed)".to_string(),
                LimitKind::Pids => "Process limit exceeded (execution killed)".to_string(),
                LimitKind::Cpu => "CPU limit exceeded (execution killed)".to_string(),
                LimitKind::Generic => "Resource limit exceeded (execution killed)".to_string(),
            },
            Classification::RuntimeError => stderr.trim().to_string(),
        };

        Self {
            stdout,
            stderr,
            classification,
            duration: outcome.duration,
            error,
        }
    }

    /// Program output with the trailing newline trimmed.
    pub fn output(&self) -> &str {
        self.stdout.trim_end_matches('\n')
    }

    pub fn is_success(&self) -> bool {
        self.classification == Classification::Success
    }

    /// The payload shape the request-handling collaborator returns to its
    /// callers: output plus an error message that is empty on success.
    pub fn response_body(&self) -> serde_json::Value {
        serde_json::json!({
            "output": self.output(),
            "error": self.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn submission_ids_are_unique_and_short() {
        let a = Submission::new("print(1)");
        let b = Submission::new("print(1)");
        assert_eq!(a.id.len(), 12);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn profile_defaults_match_contract() {
        let profile = ResourceProfile::default();
        assert_eq!(profile.memory_limit_mb, 128);
        assert_eq!(profile.cpu_cores, 1.0);
        assert_eq!(profile.pid_limit, 64);
        assert_eq!(profile.network_mode, NetworkMode::None);
        assert_eq!(profile.filesystem_mode, FilesystemMode::ReadOnly);
        assert_eq!(profile.deadline, Duration::from_secs(10));
    }

    #[test]
    fn mode_parsing_accepts_known_values() {
        assert_eq!("none".parse::<NetworkMode>().unwrap(), NetworkMode::None);
        assert_eq!(
            "enabled".parse::<NetworkMode>().unwrap(),
            NetworkMode::Enabled
        );
        assert_eq!(
            "read-only".parse::<FilesystemMode>().unwrap(),
            FilesystemMode::ReadOnly
        );
        assert_eq!(
            "scratch".parse::<FilesystemMode>().unwrap(),
            FilesystemMode::ReadWriteScratch
        );
        assert!("bridge".parse::<NetworkMode>().is_err());
    }

    #[test]
    fn removed_is_reachable_from_every_state_and_terminal() {
        use InstanceState::*;
        for state in [Created, Running, Completed, TimedOut, ResourceKilled, LaunchFailed] {
            assert!(state.can_transition(Removed), "{:?} -> Removed", state);
        }
        for state in [Created, Running, Completed, Removed] {
            assert!(!Removed.can_transition(state), "Removed -> {:?}", state);
        }
        assert!(Removed.is_terminal());
        assert!(!TimedOut.is_terminal());
    }

    #[test]
    fn running_only_reachable_from_created() {
        use InstanceState::*;
        assert!(Created.can_transition(Running));
        assert!(!Completed.can_transition(Running));
        assert!(!TimedOut.can_transition(Running));
    }

    #[test]
    fn result_output_trims_trailing_newline() {
        let outcome = RawOutcome {
            exit: Some(InstanceExit {
                status_code: 0,
                oom_killed: false,
            }),
            timed_out: false,
            stdout: b"4\n".to_vec(),
            stderr: Vec::new(),
            duration: Duration::from_millis(120),
        };
        let result = ExecutionResult::from_outcome(
            outcome,
            Classification::Success,
            &ResourceProfile::default(),
        );
        assert_eq!(result.output(), "4");
        assert_eq!(result.error, "");
        assert!(result.is_success());
    }

    #[test]
    fn timeout_error_message_names_the_deadline() {
        let outcome = RawOutcome {
            exit: None,
            timed_out: true,
            stdout: Vec::new(),
            stderr: Vec::new(),
            duration: Duration::from_secs(10),
        };
        let result = ExecutionResult::from_outcome(
            outcome,
            Classification::Timeout,
            &ResourceProfile::default(),
        );
        assert_eq!(result.error, "Execution timed out after 10 seconds");
    }

    #[test]
    fn response_body_carries_output_and_error() {
        let outcome = RawOutcome {
            exit: Some(InstanceExit {
                status_code: 0,
                oom_killed: false,
            }),
            timed_out: false,
            stdout: b"4\n".to_vec(),
            stderr: Vec::new(),
            duration: Duration::from_millis(10),
        };
        let result = ExecutionResult::from_outcome(
            outcome,
            Classification::Success,
            &ResourceProfile::default(),
        );
        assert_eq!(
            result.response_body(),
            serde_json::json!({"output": "4", "error": ""})
        );
    }

    #[test]
    fn profile_round_trips_through_json() {
        let profile = ResourceProfile::default();
        let encoded = serde_json::to_string(&profile).expect("serialize");
        let decoded: ResourceProfile = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded.memory_limit_mb, profile.memory_limit_mb);
        assert_eq!(decoded.network_mode, profile.network_mode);
        assert_eq!(decoded.filesystem_mode, profile.filesystem_mode);
    }

    #[test]
    fn runtime_error_surfaces_stderr_verbatim() {
        let outcome = RawOutcome {
            exit: Some(InstanceExit {
                status_code: 1,
                oom_killed: false,
            }),
            timed_out: false,
            stdout: Vec::new(),
            stderr: b"NameError: name 'x' is not defined\n".to_vec(),
            duration: Duration::from_millis(90),
        };
        let result = ExecutionResult::from_outcome(
            outcome,
            Classification::RuntimeError,
            &ResourceProfile::default(),
        );
        assert_eq!(result.error, "NameError: name 'x' is not defined");
    }
}
