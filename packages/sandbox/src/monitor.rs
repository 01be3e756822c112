// ABOUTME: Execution monitor racing natural completion against the deadline
// ABOUTME: Forced termination on expiry and bounded capture of output streams

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::classifier;
use crate::error::{Result, SandboxError};
use crate::instance::SandboxInstance;
use crate::runtime::{CapturedOutput, IsolationRuntime};
use crate::types::{InstanceState, RawOutcome, ResourceProfile};

/// Owns the wait for one run: suspends until the program exits or the
/// deadline elapses, whichever comes first.
pub struct ExecutionMonitor {
    runtime: Arc<dyn IsolationRuntime>,
}

impl ExecutionMonitor {
    pub fn new(runtime: Arc<dyn IsolationRuntime>) -> Self {
        Self { runtime }
    }

    /// Wait for the instance to finish or hit its deadline.
    ///
    /// The deadline is measured from the moment the instance entered
    /// `Running`; launch latency never counts against it. On expiry the
    /// instance is killed outright, with no cooperative grace period the
    /// program could ignore, and whatever output it produced is still
    /// collected.
    pub async fn wait(
        &self,
        instance: &mut SandboxInstance,
        profile: &ResourceProfile,
    ) -> Result<RawOutcome> {
        let started = instance.started_at().unwrap_or_else(Instant::now);
        let remaining = profile.deadline.saturating_sub(started.elapsed());
        let instance_id = instance.instance_id().to_string();

        match tokio::time::timeout(remaining, self.runtime.wait(&instance_id)).await {
            Ok(Ok(exit)) => {
                let output = self
                    .runtime
                    .collect_output(&instance_id, profile.output_cap_bytes)
                    .await
                    .map_err(|e| SandboxError::Wait(e.to_string()))?;

                let next = if classifier::limit_kill_kind(&exit, &output.stderr).is_some() {
                    InstanceState::ResourceKilled
                } else {
                    InstanceState::Completed
                };
                instance.transition(next);

                debug!(
                    "Instance {} finished with status {} in {:?}",
                    instance.name(),
                    exit.status_code,
                    started.elapsed()
                );

                Ok(RawOutcome {
                    exit: Some(exit),
                    timed_out: false,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    duration: started.elapsed(),
                })
            }
            Ok(Err(e)) => Err(SandboxError::Wait(e.to_string())),
            Err(_elapsed) => {
                info!(
                    "Instance {} exceeded its {:?} deadline, killing",
                    instance.name(),
                    profile.deadline
                );

                if let Err(e) = self.runtime.kill(&instance_id).await {
                    // Forced removal during release will still tear it down
                    error!("Failed to kill instance {}: {}", instance.name(), e);
                }

                // Partial output up to termination, best-effort
                let output = self
                    .runtime
                    .collect_output(&instance_id, profile.output_cap_bytes)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(
                            "Partial output of instance {} unavailable: {}",
                            instance.name(),
                            e
                        );
                        CapturedOutput::default()
                    });

                instance.transition(InstanceState::TimedOut);

                Ok(RawOutcome {
                    exit: None,
                    timed_out: true,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    duration: started.elapsed(),
                })
            }
        }
    }
}
