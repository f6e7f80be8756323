//! Service references and port-forward targets.

use crate::cluster::Backend;
use serde::{Deserialize, Serialize};

/// A service identified by namespace and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRef {
    pub namespace: String,
    pub name: String,
}

impl ServiceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A resolved port-forward endpoint: one port on one pod.
///
/// Computed once per session and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub namespace: String,
    pub pod: String,
    pub remote_port: u16,
    /// API path of the pod's `portforward` subresource.
    pub url: String,
}

impl ForwardTarget {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>, remote_port: u16) -> Self {
        let namespace = namespace.into();
        let pod = pod.into();
        let url = build_target_url(&namespace, &pod, remote_port);
        Self {
            namespace,
            pod,
            remote_port,
            url,
        }
    }

    /// Target for `backend`, a pod resolved from `service`.
    pub fn for_backend(service: &ServiceRef, backend: &Backend, remote_port: u16) -> Self {
        Self::new(service.namespace.clone(), backend.name.clone(), remote_port)
    }
}

impl std::fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.pod, self.remote_port)
    }
}

/// Compose the core/v1 path for attaching a port-forward to `pod`.
pub fn build_target_url(namespace: &str, pod: &str, remote_port: u16) -> String {
    format!(
        "/api/v1/namespaces/{}/pods/{}/portforward?ports={}",
        namespace, pod, remote_port
    )
}
