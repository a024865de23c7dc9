use std::io;
use thiserror::Error;

/// Errors raised by the ICMP probe engine.
///
/// Timeouts, ICMP error replies and validation mismatches are probe outcomes
/// (see `ProbeStatus`), not errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to resolve {target}: {reason}")]
    Resolution { target: String, reason: String },

    #[error("echo request was modified or never built; call finalize() before sending")]
    NotFinalized,

    #[error("malformed ICMP frame: {len} bytes, need at least {needed}")]
    Malformed { len: usize, needed: usize },

    #[error("{op} failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    pub fn resolution(target: &str, reason: impl Into<String>) -> Self {
        Self::Resolution {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    pub fn transport(op: &'static str, source: io::Error) -> Self {
        Self::Transport { op, source }
    }

    /// True when the failure is the usual missing raw-socket privilege
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::Transport { source, .. } if source.kind() == io::ErrorKind::PermissionDenied
        )
    }
}
