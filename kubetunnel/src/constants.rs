//! Constants for kubetunnel
//!
//! Centralized location for defaults, environment variable names and the
//! Kubernetes field values the resolver relies on.

pub mod envs {
    /// Colon-separated kubeconfig path list, as understood by kubectl.
    pub const KUBECONFIG: &str = "KUBECONFIG";
}

/// Kubeconfig file locations.
pub mod kubeconfig {
    /// Directory under the home directory holding the kubeconfig.
    pub const DIR: &str = ".kube";

    /// Kubeconfig file name.
    pub const FILE: &str = "config";
}

/// Defaults applied when the caller leaves a value unset.
pub mod defaults {
    use std::net::{IpAddr, Ipv4Addr};

    /// Namespace used when none is given.
    pub const NAMESPACE: &str = "default";

    /// Local address the tunnel listens on.
    pub const BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
}

/// Pod fields used to pick a backend.
pub mod pod {
    /// Field selector restricting listings to running pods.
    pub const RUNNING_FIELD_SELECTOR: &str = "status.phase=Running";

    /// Condition type reported once all containers pass readiness probes.
    pub const READY_CONDITION: &str = "Ready";

    /// Condition status meaning the condition holds.
    pub const CONDITION_TRUE: &str = "True";
}
