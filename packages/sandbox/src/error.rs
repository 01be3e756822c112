// ABOUTME: Error types for sandboxed execution
// ABOUTME: Launch, staging, wait, and cleanup failures surfaced as typed errors

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Main error type for sandbox operations.
///
/// Timeout, resource-limit kills, and program crashes are NOT errors: they
/// are classifications carried by a successful `ExecutionResult`. Only
/// orchestrator-side faults land here.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Isolation runtime fault (daemon unreachable, API error)
    #[error("isolation runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Instance creation or start refused; nothing was left behind
    #[error("sandbox launch failed: {0}")]
    Launch(String),

    /// Staging the submission code into its arena failed
    #[error("failed to stage submission code: {0}")]
    Staging(#[from] std::io::Error),

    /// Waiting for completion failed for a reason other than the program's own exit
    #[error("sandbox wait failed: {0}")]
    Wait(String),

    /// Environment teardown failed; logged, never masks the execution result
    #[error("sandbox cleanup failed: {0}")]
    Cleanup(String),
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
