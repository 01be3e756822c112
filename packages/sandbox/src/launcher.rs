// ABOUTME: Sandbox launcher staging submission code and starting isolated instances
// ABOUTME: Per-submission arena, collision-free naming, cleanup of partial launch state

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::error::{Result, SandboxError};
use crate::instance::SandboxInstance;
use crate::runtime::{CodeMount, InstanceSpec, IsolationRuntime, ScratchMount};
use crate::types::{FilesystemMode, InstanceState, NetworkMode, ResourceProfile, Submission};

/// Where the staged code is mounted inside the instance (read-only).
pub const CODE_MOUNT_PATH: &str = "/sandbox";

/// Writable scratch area, present only in scratch filesystem mode.
pub const SCRATCH_MOUNT_PATH: &str = "/scratch";

/// File name the submission is staged under inside its arena.
const ENTRYPOINT_FILE: &str = "main.py";

const SUBMISSION_LABEL: &str = "runbox.submission_id";

/// Turns a submission plus a resource profile into a running, confined
/// instance. Every constraint is handed to the runtime at creation time.
pub struct Launcher {
    runtime: Arc<dyn IsolationRuntime>,
}

impl Launcher {
    pub fn new(runtime: Arc<dyn IsolationRuntime>) -> Self {
        Self { runtime }
    }

    /// Stage the submission and start it inside a fresh isolated instance.
    ///
    /// On failure nothing is left behind: an arena without an instance is
    /// dropped with this call's scope, and a created-but-unstartable
    /// instance is released before the error is returned.
    pub async fn launch(
        &self,
        submission: &Submission,
        profile: &ResourceProfile,
    ) -> Result<SandboxInstance> {
        let arena = tempfile::Builder::new()
            .prefix(&format!("runbox-{}-", submission.id))
            .tempdir()?;
        std::fs::write(arena.path().join(ENTRYPOINT_FILE), &submission.code)?;

        let name = format!("runbox-{}", submission.id);
        let spec = build_spec(submission, profile, arena.path(), &name);

        let instance_id = self
            .runtime
            .create(&spec)
            .await
            .map_err(|e| SandboxError::Launch(e.to_string()))?;

        let mut instance = SandboxInstance::new(
            submission.id.clone(),
            instance_id,
            name,
            arena,
            Arc::clone(&self.runtime),
        );

        if let Err(e) = self.runtime.start(instance.instance_id()).await {
            error!(
                "Failed to start instance {} for submission {}: {}",
                instance.name(),
                submission.id,
                e
            );
            instance.transition(InstanceState::LaunchFailed);
            // Partial state exists; release it before surfacing the failure
            let _ = instance.release().await;
            return Err(SandboxError::Launch(e.to_string()));
        }

        instance.transition(InstanceState::Running);
        info!(
            "Instance {} running for submission {}",
            instance.name(),
            submission.id
        );
        Ok(instance)
    }
}

fn build_spec(
    submission: &Submission,
    profile: &ResourceProfile,
    arena_path: &Path,
    name: &str,
) -> InstanceSpec {
    let scratch = match profile.filesystem_mode {
        FilesystemMode::ReadOnly => None,
        FilesystemMode::ReadWriteScratch => Some(ScratchMount {
            container_path: SCRATCH_MOUNT_PATH.to_string(),
            size_mb: profile.scratch_size_mb,
        }),
    };

    InstanceSpec {
        name: name.to_string(),
        image: profile.image.clone(),
        command: vec![
            "python".to_string(),
            format!("{}/{}", CODE_MOUNT_PATH, ENTRYPOINT_FILE),
        ],
        code_mount: CodeMount {
            host_path: arena_path.to_path_buf(),
            container_path: CODE_MOUNT_PATH.to_string(),
        },
        scratch,
        memory_limit_bytes: (profile.memory_limit_mb * 1024 * 1024) as i64,
        cpu_cores: profile.cpu_cores,
        pid_limit: profile.pid_limit,
        network_enabled: profile.network_mode == NetworkMode::Enabled,
        readonly_rootfs: true,
        env: vec!["PYTHONUNBUFFERED=1".to_string()],
        labels: HashMap::from([(SUBMISSION_LABEL.to_string(), submission.id.clone())]),
    }
}
