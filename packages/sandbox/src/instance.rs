// ABOUTME: Live sandbox instance handle owning the isolated environment
// ABOUTME: Enforces the state machine and guarantees teardown on every exit path

use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SandboxError};
use crate::runtime::IsolationRuntime;
use crate::types::InstanceState;

/// One isolated, ephemeral execution environment for exactly one submission.
///
/// The handle owns the runtime instance, the staged-code arena, and the state
/// machine. Exactly one terminal `Removed` transition happens per instance:
/// explicitly via [`release`](Self::release), or through the `Drop` backstop
/// when the owning task panics or is cancelled before releasing.
pub struct SandboxInstance {
    submission_id: String,
    instance_id: String,
    name: String,
    state: InstanceState,
    started_at: Option<Instant>,
    arena: Option<TempDir>,
    runtime: Arc<dyn IsolationRuntime>,
}

impl SandboxInstance {
    pub(crate) fn new(
        submission_id: String,
        instance_id: String,
        name: String,
        arena: TempDir,
        runtime: Arc<dyn IsolationRuntime>,
    ) -> Self {
        Self {
            submission_id,
            instance_id,
            name,
            state: InstanceState::Created,
            started_at: None,
            arena: Some(arena),
            runtime,
        }
    }

    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Moment the instance entered `Running`; the deadline is measured from
    /// here, never from submission arrival.
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub(crate) fn transition(&mut self, next: InstanceState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        if !self.state.can_transition(next) {
            error!(
                "Refusing illegal state transition {:?} -> {:?} for instance {}",
                self.state, next, self.name
            );
            return;
        }
        debug!(
            "Instance {} transition {:?} -> {:?}",
            self.name, self.state, next
        );
        self.state = next;
        if next == InstanceState::Running {
            self.started_at = Some(Instant::now());
        }
    }

    /// Destroy the isolated environment and the staged-code arena.
    ///
    /// Idempotent: the first call transitions to `Removed`, later calls are
    /// no-ops. A teardown fault is reported as `SandboxError::Cleanup` so the
    /// caller can log it, but the instance still counts as removed; cleanup
    /// failure must never mask the execution's real outcome.
    pub async fn release(&mut self) -> Result<()> {
        if self.state == InstanceState::Removed {
            return Ok(());
        }
        self.transition(InstanceState::Removed);

        // Dropping the arena deletes the staged submission code
        self.arena.take();

        match self.runtime.remove(&self.instance_id).await {
            Ok(()) => {
                info!(
                    "Instance {} removed for submission {}",
                    self.name, self.submission_id
                );
                Ok(())
            }
            Err(e) => {
                warn!("Failed to remove instance {}: {}", self.name, e);
                Err(SandboxError::Cleanup(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for SandboxInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxInstance")
            .field("submission_id", &self.submission_id)
            .field("instance_id", &self.instance_id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}

impl Drop for SandboxInstance {
    fn drop(&mut self) {
        if self.state == InstanceState::Removed {
            return;
        }
        self.state = InstanceState::Removed;
        self.arena.take();

        let runtime = Arc::clone(&self.runtime);
        let instance_id = self.instance_id.clone();
        let name = self.name.clone();
        warn!("Instance {} dropped without release, removing in background", name);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = runtime.remove(&instance_id).await {
                        error!("Background removal of instance {} failed: {}", name, e);
                    }
                });
            }
            Err(_) => {
                error!(
                    "Instance {} dropped outside an async runtime; environment may leak",
                    name
                );
            }
        }
    }
}
