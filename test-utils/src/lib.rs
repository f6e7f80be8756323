//! Shared fixtures for kubetunnel tests.
//!
//! [`FakeCluster`] implements `ClusterApi` in memory: services and pods are
//! registered up front, dials succeed with an echo tunnel unless a failure or
//! delay is injected.

use async_trait::async_trait;
use kubetunnel::{
    Backend, ClusterApi, ForwardStream, ForwardTarget, ServiceInfo, TunnelConnection, TunnelError,
    TunnelResult,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const ECHO_BUFFER: usize = 64 * 1024;

/// A pod as the fake API server sees it.
#[derive(Debug, Clone)]
pub struct FakePod {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub phase: String,
    pub ready: bool,
    pub deleting: bool,
}

impl FakePod {
    /// A Running, Ready pod with no labels.
    pub fn running(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            phase: "Running".to_string(),
            ready: true,
            deleting: false,
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn phase(mut self, phase: &str) -> Self {
        self.phase = phase.to_string();
        self
    }

    pub fn unready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    fn matches(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|l| l == v))
    }
}

#[derive(Default)]
struct Faults {
    service: Option<TunnelError>,
    list: Option<TunnelError>,
    dial: Option<TunnelError>,
    stream: Option<TunnelError>,
    dial_delay: Option<Duration>,
}

/// In-memory cluster with an echo port-forward transport.
#[derive(Default)]
pub struct FakeCluster {
    services: Mutex<HashMap<(String, String), ServiceInfo>>,
    pods: Mutex<HashMap<String, Vec<FakePod>>>,
    faults: Mutex<Faults>,
    dialed: Mutex<Vec<ForwardTarget>>,
    list_calls: AtomicUsize,
    streams_opened: Arc<AtomicUsize>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service whose selector is `selector`.
    pub fn with_service(self, namespace: &str, name: &str, selector: &[(&str, &str)]) -> Self {
        let info = ServiceInfo {
            name: name.to_string(),
            selector: selector
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.services
            .lock()
            .insert((namespace.to_string(), name.to_string()), info);
        self
    }

    /// Add a pod; listing order follows insertion order.
    pub fn with_pod(self, namespace: &str, pod: FakePod) -> Self {
        self.pods
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .push(pod);
        self
    }

    pub fn fail_service_lookup(&self, err: TunnelError) {
        self.faults.lock().service = Some(err);
    }

    pub fn fail_list(&self, err: TunnelError) {
        self.faults.lock().list = Some(err);
    }

    pub fn fail_dial(&self, err: TunnelError) {
        self.faults.lock().dial = Some(err);
    }

    pub fn fail_streams(&self, err: TunnelError) {
        self.faults.lock().stream = Some(err);
    }

    /// Make every dial take `delay` before completing.
    pub fn set_dial_delay(&self, delay: Duration) {
        self.faults.lock().dial_delay = Some(delay);
    }

    /// Targets dialed so far, in order.
    pub fn dialed(&self) -> Vec<ForwardTarget> {
        self.dialed.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_service(&self, namespace: &str, name: &str) -> TunnelResult<ServiceInfo> {
        if let Some(err) = self.faults.lock().service.clone() {
            return Err(err);
        }
        self.services
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                TunnelError::ServiceLookup(format!(
                    "services \"{}\" not found in {}",
                    name, namespace
                ))
            })
    }

    async fn list_running_backends(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> TunnelResult<Vec<Backend>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.faults.lock().list.clone() {
            return Err(err);
        }

        let selector = parse_selector(label_selector)?;
        let pods = self.pods.lock();
        Ok(pods
            .get(namespace)
            .map(|pods| {
                pods.iter()
                    .filter(|p| p.phase == "Running" && p.matches(&selector))
                    .map(|p| Backend::new(p.name.clone(), p.ready, p.deleting))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn dial(&self, target: &ForwardTarget) -> TunnelResult<Box<dyn TunnelConnection>> {
        self.dialed.lock().push(target.clone());

        let (delay, dial_err, stream_err) = {
            let faults = self.faults.lock();
            (faults.dial_delay, faults.dial.clone(), faults.stream.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = dial_err {
            return Err(err);
        }

        Ok(Box::new(EchoTunnel {
            opened: self.streams_opened.clone(),
            failure: stream_err,
        }))
    }
}

fn parse_selector(selector: &str) -> TunnelResult<BTreeMap<String, String>> {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .map(|term| {
            term.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    TunnelError::BackendLookup(format!("unsupported selector term '{}'", term))
                })
        })
        .collect()
}

/// Tunnel whose streams echo every byte back.
struct EchoTunnel {
    opened: Arc<AtomicUsize>,
    failure: Option<TunnelError>,
}

#[async_trait]
impl TunnelConnection for EchoTunnel {
    async fn open_stream(&self) -> TunnelResult<Box<dyn ForwardStream>> {
        if let Some(err) = self.failure.clone() {
            return Err(err);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let (client, server) = tokio::io::duplex(ECHO_BUFFER);
        tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(server);
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        });
        Ok(Box::new(client))
    }
}

/// `monitoring/prometheus-k8s` backed by one ready pod `prometheus-k8s-0`.
pub fn prometheus_cluster() -> FakeCluster {
    FakeCluster::new()
        .with_service("monitoring", "prometheus-k8s", &[("prometheus", "k8s")])
        .with_pod(
            "monitoring",
            FakePod::running("prometheus-k8s-0").label("prometheus", "k8s"),
        )
}
