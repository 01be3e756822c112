// ABOUTME: Orchestration of one submission through launch, monitor, cleanup, classify
// ABOUTME: Guarantees teardown on every path and never lets cleanup mask the outcome

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier;
use crate::error::Result;
use crate::launcher::Launcher;
use crate::monitor::ExecutionMonitor;
use crate::runtime::{DockerRuntime, IsolationRuntime};
use crate::types::{ExecutionResult, ResourceProfile, Submission};

/// The sandboxed execution orchestrator.
///
/// One profile applies uniformly to every submission. The orchestrator holds
/// no cross-submission mutable state; it is cheap to share behind an `Arc`
/// and `execute` futures for unrelated submissions run fully independently.
pub struct Orchestrator {
    runtime: Arc<dyn IsolationRuntime>,
    launcher: Launcher,
    monitor: ExecutionMonitor,
    profile: ResourceProfile,
}

impl Orchestrator {
    /// Connect to the local Docker daemon and build an orchestrator with the
    /// given profile.
    pub async fn connect(profile: ResourceProfile) -> Result<Self> {
        let runtime = DockerRuntime::connect().await?;
        Ok(Self::with_runtime(Arc::new(runtime), profile))
    }

    /// Build an orchestrator on any isolation runtime.
    pub fn with_runtime(runtime: Arc<dyn IsolationRuntime>, profile: ResourceProfile) -> Self {
        Self {
            launcher: Launcher::new(Arc::clone(&runtime)),
            monitor: ExecutionMonitor::new(Arc::clone(&runtime)),
            runtime,
            profile,
        }
    }

    pub fn profile(&self) -> &ResourceProfile {
        &self.profile
    }

    /// Whether the isolation runtime is currently reachable.
    pub async fn runtime_available(&self) -> bool {
        self.runtime.ping().await.is_ok()
    }

    /// Run one code submission to completion and classify what happened.
    ///
    /// Launch strictly precedes monitoring, monitoring strictly precedes
    /// release, and release strictly precedes delivery of the result. The
    /// instance is released on every path out of here, including monitor
    /// faults; the handle's drop backstop covers cancellation of this future
    /// mid-flight.
    pub async fn execute(&self, code: &str) -> Result<ExecutionResult> {
        let submission = Submission::new(code);
        info!("Executing submission {}", submission.id);

        let mut instance = self.launcher.launch(&submission, &self.profile).await?;

        let outcome = self.monitor.wait(&mut instance, &self.profile).await;

        // Cleanup failure is logged and dropped; it never replaces the
        // execution's real outcome.
        if let Err(e) = instance.release().await {
            warn!("Cleanup failed for submission {}: {}", submission.id, e);
        }

        let raw = outcome?;
        let classification = classifier::classify(&raw);
        debug!(
            "Submission {} classified as {:?} after {:?}",
            submission.id, classification, raw.duration
        );

        Ok(ExecutionResult::from_outcome(
            raw,
            classification,
            &self.profile,
        ))
    }
}
