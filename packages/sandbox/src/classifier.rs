// ABOUTME: Deterministic mapping from raw execution outcomes to typed classifications
// ABOUTME: Timeout takes precedence, then limit kills, then runtime errors, then success

use crate::types::{Classification, InstanceExit, LimitKind, RawOutcome};

/// Exit status of a SIGKILL-terminated process (128 + 9).
pub const SIGKILL_EXIT: i64 = 137;

/// Classify a finished or aborted run.
///
/// Priority order: a timeout beats any captured exit status (the forced kill
/// after expiry produces a misleading code of its own), a kill-by-limit beats
/// a plain non-zero exit, and only a clean zero exit is a success.
pub fn classify(outcome: &RawOutcome) -> Classification {
    if outcome.timed_out {
        return Classification::Timeout;
    }

    match outcome.exit {
        Some(exit) if exit.status_code == 0 => Classification::Success,
        Some(exit) => match limit_kill_kind(&exit, &outcome.stderr) {
            Some(kind) => Classification::ResourceLimitExceeded(kind),
            None => Classification::RuntimeError,
        },
        // The monitor always records an exit when no timeout occurred
        None => Classification::RuntimeError,
    }
}

/// Best-effort attribution of a kill-by-limit, when one happened at all.
///
/// The runtime's own OOM flag is authoritative; stderr signatures are the
/// fallback. A generic SIGKILL without corroborating signals stays `Generic`
/// since the same status can also mean an external stop. CPU shares throttle
/// rather than kill, so `Cpu` is reserved for runtimes that report it
/// explicitly.
pub fn limit_kill_kind(exit: &InstanceExit, stderr: &[u8]) -> Option<LimitKind> {
    if exit.oom_killed {
        return Some(LimitKind::Memory);
    }

    let stderr = String::from_utf8_lossy(stderr);
    let memory_signature = stderr.contains("MemoryError") || stderr.contains("Out of memory");
    let pid_signature = stderr.contains("Resource temporarily unavailable")
        || stderr.contains("can't start new thread");

    if exit.status_code == SIGKILL_EXIT {
        return Some(if memory_signature || stderr.contains("Killed") {
            LimitKind::Memory
        } else if pid_signature {
            LimitKind::Pids
        } else {
            LimitKind::Generic
        });
    }

    if memory_signature {
        Some(LimitKind::Memory)
    } else if pid_signature {
        Some(LimitKind::Pids)
    } else {
        None
    }
}
