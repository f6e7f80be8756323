//! kubetunnel - local TCP tunnels into Kubernetes pods
//!
//! Resolves a healthy pod behind a service, opens a port-forward connection to
//! it and forwards a local listening port through it. The session lifecycle
//! (start, ready, stop, failure) is safe to drive from several tasks at once.
//!
//! ## Architecture
//!
//! - `cluster`: the [`ClusterApi`] seam and its `kube` implementation
//! - `resolver`: service → running, ready pod
//! - `port`: local port allocation
//! - `session`: the [`PortForward`] controller and its forwarding task

pub mod cluster;
pub mod constants;
pub mod error;
pub mod kubeconfig;
pub mod options;
pub mod port;
pub mod resolver;
pub mod session;
pub mod target;

pub use cluster::{Backend, ClusterApi, ForwardStream, KubeCluster, ServiceInfo, TunnelConnection};
pub use error::{TunnelError, TunnelResult};
pub use options::{ForwardOptions, PortPair, TargetRef};
pub use session::{PortForward, SessionState, SessionStatus, Signal};
pub use target::{ForwardTarget, ServiceRef};

// Re-exported so callers can build parent tokens without a direct dependency
pub use tokio_util::sync::CancellationToken;
