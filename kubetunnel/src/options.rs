//! Configuration for a port-forward session.

use crate::constants::defaults;
use crate::error::{TunnelError, TunnelResult};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Target
// ============================================================================

/// What the tunnel points at inside the namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetRef {
    /// Resolve a healthy pod through the service's selector on every start.
    Service(String),

    /// Forward straight to a named pod, skipping resolution.
    Pod(String),
}

impl TargetRef {
    pub fn name(&self) -> &str {
        match self {
            TargetRef::Service(name) | TargetRef::Pod(name) => name,
        }
    }
}

impl Default for TargetRef {
    fn default() -> Self {
        TargetRef::Service(String::new())
    }
}

// ============================================================================
// Port pair
// ============================================================================

/// One local-to-remote port mapping, written `LOCAL:REMOTE`.
///
/// Follows kubectl's port spec: `8080:80` listens on 8080, `80` and `:80`
/// listen on an auto-assigned local port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    /// Local listen port; 0 means auto-assign before start.
    pub local: u16,
    /// Port inside the pod.
    pub remote: u16,
}

impl PortPair {
    pub fn new(local: u16, remote: u16) -> Self {
        Self { local, remote }
    }
}

impl FromStr for PortPair {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str, what: &str| {
            part.parse::<u16>().map_err(|e| {
                TunnelError::InvalidArgument(format!("invalid {} port in '{}': {}", what, s, e))
            })
        };

        let (local, remote) = match s.split_once(':') {
            Some(("", remote)) => (0, parse(remote, "remote")?),
            Some((local, remote)) => (parse(local, "local")?, parse(remote, "remote")?),
            None => (0, parse(s, "remote")?),
        };

        if remote == 0 {
            return Err(TunnelError::InvalidArgument(format!(
                "remote port in '{}' must be non-zero",
                s
            )));
        }

        Ok(Self { local, remote })
    }
}

impl std::fmt::Display for PortPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

// ============================================================================
// Forward options
// ============================================================================

/// Options for a single port-forward session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForwardOptions {
    /// Namespace holding the service or pod.
    ///
    /// Default: "default"
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Service (resolved to a pod) or pod to forward to.
    pub target: TargetRef,

    /// Local and remote ports.
    pub ports: PortPair,

    /// Local address to listen on.
    ///
    /// Default: 127.0.0.1
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Parent cancellation token, e.g. one cancelled on Ctrl-C.
    ///
    /// The session's own stop token is a child of it, so cancelling the parent
    /// stops every session created from these options.
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

fn default_namespace() -> String {
    defaults::NAMESPACE.to_string()
}

fn default_bind_address() -> IpAddr {
    defaults::BIND_ADDRESS
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            target: TargetRef::default(),
            ports: PortPair::new(0, 0),
            bind_address: default_bind_address(),
            cancel: None,
        }
    }
}

impl ForwardOptions {
    /// Options for `target` in `namespace`, with the default bind address and
    /// no parent token.
    pub fn new(namespace: impl Into<String>, target: TargetRef, ports: PortPair) -> Self {
        Self {
            namespace: namespace.into(),
            target,
            ports,
            ..Default::default()
        }
    }

    /// Forward `local_port` (0 = auto) to `remote_port` on a pod behind `service`.
    pub fn service(
        namespace: impl Into<String>,
        service: impl Into<String>,
        local_port: u16,
        remote_port: u16,
    ) -> Self {
        Self::new(
            namespace,
            TargetRef::Service(service.into()),
            PortPair::new(local_port, remote_port),
        )
    }

    /// Forward `local_port` (0 = auto) to `remote_port` on the named pod.
    pub fn pod(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        local_port: u16,
        remote_port: u16,
    ) -> Self {
        Self::new(
            namespace,
            TargetRef::Pod(pod.into()),
            PortPair::new(local_port, remote_port),
        )
    }

    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Reject options that can never start.
    pub fn validate(&self) -> TunnelResult<()> {
        if self.namespace.is_empty() {
            return Err(TunnelError::InvalidArgument("namespace is empty".into()));
        }
        match &self.target {
            TargetRef::Service(name) if name.is_empty() => {
                return Err(TunnelError::InvalidArgument("service name is empty".into()));
            }
            TargetRef::Pod(name) if name.is_empty() => {
                return Err(TunnelError::InvalidArgument("pod name is empty".into()));
            }
            _ => {}
        }
        if self.ports.remote == 0 {
            return Err(TunnelError::InvalidArgument(
                "remote port must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_pair_parse() {
        assert_eq!("39090:9090".parse(), Ok(PortPair::new(39090, 9090)));
        assert_eq!("9090".parse(), Ok(PortPair::new(0, 9090)));
        assert_eq!(":9090".parse(), Ok(PortPair::new(0, 9090)));
        assert_eq!("0:9090".parse(), Ok(PortPair::new(0, 9090)));
    }

    #[test]
    fn test_port_pair_parse_rejects_garbage() {
        assert!("".parse::<PortPair>().is_err());
        assert!("abc".parse::<PortPair>().is_err());
        assert!("8080:".parse::<PortPair>().is_err());
        assert!("8080:0".parse::<PortPair>().is_err());
        assert!("70000:80".parse::<PortPair>().is_err());
        assert!("1:2:3".parse::<PortPair>().is_err());
    }

    #[test]
    fn test_port_pair_display() {
        assert_eq!(PortPair::new(39090, 9090).to_string(), "39090:9090");
    }

    #[test]
    fn test_service_options_defaults() {
        let opts = ForwardOptions::service("monitoring", "prometheus-k8s", 39090, 9090);
        assert_eq!(opts.namespace, "monitoring");
        assert_eq!(opts.target, TargetRef::Service("prometheus-k8s".into()));
        assert_eq!(opts.bind_address, defaults::BIND_ADDRESS);
        assert!(opts.cancel.is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_builder_sets_bind_address_and_cancel() {
        let token = CancellationToken::new();
        let opts = ForwardOptions::new(
            "default",
            TargetRef::Pod("debug-shell".into()),
            "8080:80".parse().unwrap(),
        )
        .with_bind_address("0.0.0.0".parse().unwrap())
        .with_cancel(token.clone());

        assert_eq!(opts.bind_address.to_string(), "0.0.0.0");
        assert_eq!(opts.ports, PortPair::new(8080, 80));
        token.cancel();
        assert!(opts.cancel.as_ref().is_some_and(|t| t.is_cancelled()));
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let opts = ForwardOptions::service("monitoring", "", 0, 9090);
        assert!(matches!(
            opts.validate(),
            Err(TunnelError::InvalidArgument(_))
        ));

        let opts = ForwardOptions::pod("", "prometheus-k8s-0", 0, 9090);
        assert!(opts.validate().is_err());

        let opts = ForwardOptions::service("monitoring", "prometheus-k8s", 0, 0);
        assert!(opts.validate().is_err());
    }
}
