// Failure taxonomy shared by the coordinator client and the push channels.

use thiserror::Error;

/// Classified failures of the synchronization layer.
///
/// `CoordinatorUninitialized` and `RemoteUnavailable` are recoverable and
/// expected during normal operation (the remote session may simply not have
/// started yet, or the network may be flaky). `ProtocolMismatch` aborts the
/// single call that produced it and nothing else. None of these variants may
/// ever take down the process; callers log and move on.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote scoring session has not been started (HTTP 424).
    #[error("coordinator not initialised")]
    CoordinatorUninitialized,

    /// Network failure, timeout, or a non-success status other than 424.
    ///
    /// No automatic retry: score-mutating commands are not idempotent, so
    /// whether a transient failure is worth retrying is the caller's call.
    #[error("coordinator unavailable: {0}")]
    RemoteUnavailable(String),

    /// The response body did not parse as the expected shape.
    #[error("unexpected response shape from {endpoint}: {detail}")]
    ProtocolMismatch { endpoint: String, detail: String },

    /// A push subscription went down. The last-known projection values are
    /// retained; recovery is an operator-triggered reload.
    #[error("push channel `{channel}` disconnected")]
    ChannelDisconnected { channel: String },
}

impl SyncError {
    /// Whether a caller can reasonably carry on after this failure by
    /// skipping the dependent update and waiting for a later read or push.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SyncError::ProtocolMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_and_unavailable_are_recoverable() {
        assert!(SyncError::CoordinatorUninitialized.is_recoverable());
        assert!(SyncError::RemoteUnavailable("timeout".into()).is_recoverable());
        assert!(SyncError::ChannelDisconnected {
            channel: "hole".into()
        }
        .is_recoverable());
    }

    #[test]
    fn protocol_mismatch_is_not_recoverable() {
        let err = SyncError::ProtocolMismatch {
            endpoint: "/round".into(),
            detail: "expected integer".into(),
        };
        assert!(!err.is_recoverable());
    }
}
