//! Cluster API abstraction.
//!
//! The session only needs three things from the cluster: a service's selector,
//! the running pods behind it, and a way to open port-forward streams into a
//! pod. [`ClusterApi`] captures exactly that so sessions can run against a real
//! API server ([`KubeCluster`]) or an in-memory fake in tests.
//!
//! Authentication and TLS are the implementation's concern; callers hand over a
//! ready-to-use client.

use crate::error::TunnelResult;
use crate::target::ForwardTarget;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncWrite};

mod client;

pub use client::KubeCluster;

/// The parts of a Service the resolver needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    /// `spec.selector` labels; empty for selector-less services.
    pub selector: BTreeMap<String, String>,
}

/// A pod that may serve as the tunnel's remote end.
///
/// Built fresh on every resolution and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub name: String,
    /// A `Ready` condition with status `True` is reported.
    pub ready: bool,
    /// `metadata.deletionTimestamp` is set; the pod is terminating.
    pub deletion_pending: bool,
}

impl Backend {
    pub fn new(name: impl Into<String>, ready: bool, deletion_pending: bool) -> Self {
        Self {
            name: name.into(),
            ready,
            deletion_pending,
        }
    }

    /// Whether traffic may be tunneled to this pod.
    pub fn is_eligible(&self) -> bool {
        self.ready && !self.deletion_pending
    }
}

/// A bidirectional byte stream to the remote port.
pub trait ForwardStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ForwardStream for T {}

/// An established port-forward connection to one pod port.
///
/// Each accepted local connection gets its own stream; streams may be opened
/// concurrently.
#[async_trait]
pub trait TunnelConnection: Send + Sync {
    /// Open a new stream to the target port.
    async fn open_stream(&self) -> TunnelResult<Box<dyn ForwardStream>>;

    /// Tear down whatever the connection still holds open.
    async fn close(&self) {}
}

/// Cluster operations used by the resolver and the forwarder.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a service. Fails with `ServiceLookup`.
    async fn get_service(&self, namespace: &str, name: &str) -> TunnelResult<ServiceInfo>;

    /// List pods matching `label_selector` whose phase is Running, in API order.
    /// Fails with `BackendLookup`.
    async fn list_running_backends(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> TunnelResult<Vec<Backend>>;

    /// Upgrade a connection to the target's `portforward` subresource.
    /// Fails with `Tunnel`.
    async fn dial(&self, target: &ForwardTarget) -> TunnelResult<Box<dyn TunnelConnection>>;
}
