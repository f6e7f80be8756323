//! [`ClusterApi`] backed by a real API server through `kube`.

use super::{Backend, ClusterApi, ForwardStream, ServiceInfo, TunnelConnection};
use crate::constants::pod as pod_consts;
use crate::error::{TunnelError, TunnelResult};
use crate::kubeconfig;
use crate::target::ForwardTarget;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::Client;
use kube::api::{Api, ListParams, Portforwarder};
use parking_lot::Mutex;
use std::path::PathBuf;

/// Cluster access through a `kube::Client`.
///
/// Cloning is cheap; the underlying client is reference counted.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Wrap an already configured client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from a kubeconfig file.
    ///
    /// `path` falls back to `KUBECONFIG`, then `~/.kube/config`. `context`
    /// falls back to the kubeconfig's current context.
    pub async fn from_kubeconfig(
        path: Option<PathBuf>,
        context: Option<String>,
    ) -> TunnelResult<Self> {
        let config = kubeconfig::load_config(path, context).await?;
        let client = Client::try_from(config)
            .map_err(|e| TunnelError::Config(format!("create kubernetes client: {}", e)))?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("default_namespace", &self.client.default_namespace())
            .finish()
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_service(&self, namespace: &str, name: &str) -> TunnelResult<ServiceInfo> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = services.get(name).await.map_err(|e| {
            TunnelError::ServiceLookup(format!("get service {}/{}: {}", namespace, name, e))
        })?;

        Ok(ServiceInfo {
            name: service
                .metadata
                .name
                .unwrap_or_else(|| name.to_string()),
            selector: service
                .spec
                .and_then(|spec| spec.selector)
                .unwrap_or_default(),
        })
    }

    async fn list_running_backends(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> TunnelResult<Vec<Backend>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default()
            .labels(label_selector)
            .fields(pod_consts::RUNNING_FIELD_SELECTOR);

        let list = pods.list(&params).await.map_err(|e| {
            TunnelError::BackendLookup(format!(
                "list pods in {} matching '{}': {}",
                namespace, label_selector, e
            ))
        })?;

        Ok(list.items.iter().map(backend_from_pod).collect())
    }

    async fn dial(&self, target: &ForwardTarget) -> TunnelResult<Box<dyn TunnelConnection>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let forwarder = connect(&pods, target).await?;

        tracing::debug!(url = %target.url, "Port-forward connection upgraded");
        Ok(Box::new(KubeTunnel {
            pods,
            target: target.clone(),
            pending: Mutex::new(Some(forwarder)),
        }))
    }
}

async fn connect(pods: &Api<Pod>, target: &ForwardTarget) -> TunnelResult<Portforwarder> {
    pods.portforward(&target.pod, &[target.remote_port])
        .await
        .map_err(|e| TunnelError::Tunnel(format!("upgrade {}: {}", target.url, e)))
}

/// Port-forward connection to one pod port.
///
/// The websocket protocol carries one stream per port per upgraded connection,
/// so the connection made by `dial` serves the first local client and every
/// later client gets a fresh upgrade.
struct KubeTunnel {
    pods: Api<Pod>,
    target: ForwardTarget,
    pending: Mutex<Option<Portforwarder>>,
}

#[async_trait]
impl TunnelConnection for KubeTunnel {
    async fn open_stream(&self) -> TunnelResult<Box<dyn ForwardStream>> {
        let port = self.target.remote_port;
        let pending = self.pending.lock().take();
        let mut forwarder = match pending {
            Some(forwarder) => forwarder,
            None => connect(&self.pods, &self.target).await?,
        };

        let stream = forwarder.take_stream(port).ok_or_else(|| {
            TunnelError::Tunnel(format!("no stream for port {} on {}", port, self.target))
        })?;

        // The forwarder ends on its own once the stream is closed
        let endpoint = self.target.to_string();
        tokio::spawn(async move {
            if let Err(e) = forwarder.join().await {
                tracing::debug!(%endpoint, "Port-forward stream ended with error: {}", e);
            }
        });

        Ok(Box::new(stream))
    }

    async fn close(&self) {
        if let Some(forwarder) = self.pending.lock().take() {
            forwarder.abort();
        }
    }
}

/// Reduce a pod to the fields backend selection looks at.
pub(crate) fn backend_from_pod(pod: &Pod) -> Backend {
    let ready = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.type_ == pod_consts::READY_CONDITION && c.status == pod_consts::CONDITION_TRUE
            })
        })
        .unwrap_or(false);

    Backend {
        name: pod.metadata.name.clone().unwrap_or_default(),
        ready,
        deletion_pending: pod.metadata.deletion_timestamp.is_some(),
    }
}
