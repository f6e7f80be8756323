//! Error types for port-forward sessions.
//!
//! Errors are categorized by where a start attempt broke down:
//! - resolution ([`TunnelError::ServiceLookup`], [`TunnelError::BackendLookup`],
//!   [`TunnelError::NoHealthyBackend`]): no forward was attempted
//! - local side ([`TunnelError::PortBind`]): the listener could not be set up
//! - transport ([`TunnelError::Tunnel`]): the upgraded connection failed
//!
//! ```ignore
//! match session.start().await {
//!     Err(TunnelError::NoHealthyBackend(_)) => { /* wait for pods, retry */ }
//!     Err(TunnelError::ServiceLookup(_)) => { /* wrong service name */ }
//!     Err(e) => { /* fatal */ }
//!     Ok(()) => {}
//! }
//! ```

use thiserror::Error;

/// Result alias used across the crate.
pub type TunnelResult<T> = Result<T, TunnelError>;

/// Errors that can occur while resolving, starting or running a tunnel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TunnelError {
    /// The service does not exist or could not be fetched.
    #[error("service lookup: {0}")]
    ServiceLookup(String),

    /// Listing the pods behind a service failed.
    #[error("backend lookup: {0}")]
    BackendLookup(String),

    /// The service exists but no running, ready, non-terminating pod backs it.
    #[error("no healthy backend: {0}")]
    NoHealthyBackend(String),

    /// Local port allocation or listen failed.
    #[error("port bind: {0}")]
    PortBind(String),

    /// The port-forward connection could not be established or broke.
    #[error("tunnel: {0}")]
    Tunnel(String),

    /// The forwarding task failed before reporting readiness.
    #[error("could not establish port-forward: {0}")]
    Establish(Box<TunnelError>),

    /// Operation not valid in the session's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Stop was requested before the session became ready.
    #[error("port-forward cancelled before it became ready")]
    Cancelled,

    /// A bounded wait expired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Kubeconfig or client construction failed.
    #[error("config: {0}")]
    Config(String),

    /// Caller supplied a malformed value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl TunnelError {
    /// Strip `Establish` wrappers and return the underlying error.
    pub fn root_cause(&self) -> &TunnelError {
        match self {
            TunnelError::Establish(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// Wrap a forwarding-task failure with startup context.
    pub(crate) fn establish(err: TunnelError) -> Self {
        TunnelError::Establish(Box::new(err))
    }
}

impl From<kube::config::KubeconfigError> for TunnelError {
    fn from(err: kube::config::KubeconfigError) -> Self {
        TunnelError::Config(err.to_string())
    }
}

impl From<kube::config::InferConfigError> for TunnelError {
    fn from(err: kube::config::InferConfigError) -> Self {
        TunnelError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TunnelError::NoHealthyBackend("monitoring/prometheus-k8s".into());
        assert_eq!(
            err.to_string(),
            "no healthy backend: monitoring/prometheus-k8s"
        );

        let err = TunnelError::establish(TunnelError::Tunnel("upgrade rejected".into()));
        assert_eq!(
            err.to_string(),
            "could not establish port-forward: tunnel: upgrade rejected"
        );
    }

    #[test]
    fn test_root_cause_unwraps_establish() {
        let inner = TunnelError::PortBind("address in use".into());
        let err = TunnelError::establish(TunnelError::establish(inner.clone()));
        assert_eq!(err.root_cause(), &inner);

        let plain = TunnelError::Cancelled;
        assert_eq!(plain.root_cause(), &TunnelError::Cancelled);
    }
}
