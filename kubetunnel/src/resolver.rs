//! Endpoint resolution: service name to a healthy pod.

use crate::cluster::{Backend, ClusterApi};
use crate::error::{TunnelError, TunnelResult};
use crate::target::ServiceRef;
use std::collections::BTreeMap;

/// Resolve `service` to the first running, ready, non-terminating pod behind it.
///
/// Pods are taken in the order the API lists them. Pods still starting or
/// already terminating are skipped.
pub async fn resolve(cluster: &dyn ClusterApi, service: &ServiceRef) -> TunnelResult<Backend> {
    let info = cluster
        .get_service(&service.namespace, &service.name)
        .await?;

    if info.selector.is_empty() {
        return Err(TunnelError::ServiceLookup(format!(
            "service {} has no pod selector",
            service
        )));
    }

    let selector = label_selector(&info.selector);
    let candidates = cluster
        .list_running_backends(&service.namespace, &selector)
        .await?;

    tracing::debug!(
        %service,
        %selector,
        candidates = candidates.len(),
        "Listed running pods"
    );

    select_backend(&candidates)
        .cloned()
        .ok_or_else(|| no_healthy_backend(service, &candidates))
}

/// First eligible candidate in listing order.
pub fn select_backend(candidates: &[Backend]) -> Option<&Backend> {
    candidates.iter().find(|b| b.is_eligible())
}

/// Render selector labels as `k1=v1,k2=v2`.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn no_healthy_backend(service: &ServiceRef, candidates: &[Backend]) -> TunnelError {
    if candidates.is_empty() {
        return TunnelError::NoHealthyBackend(format!("service {} has no running pods", service));
    }

    let terminating = candidates.iter().filter(|b| b.deletion_pending).count();
    TunnelError::NoHealthyBackend(format!(
        "service {} has {} running pod(s), none ready ({} terminating)",
        service,
        candidates.len(),
        terminating
    ))
}
