//! PortForward - single port-forward session lifecycle
//!
//! ## Architecture
//!
//! - `state`: status state machine, shared through a watch channel
//! - `signal`: one-shot ready/finished signals
//! - `forwarder`: background task owning the listener and the tunnel
//!
//! The controller (`PortForward`) and the forwarder talk through the ready
//! signal, the stop token and a oneshot error channel; status transitions are
//! validated so that whichever side reaches a terminal state first wins.

mod forwarder;
mod signal;
mod state;

pub use signal::Signal;
pub use state::{SessionState, SessionStatus};

use crate::cluster::ClusterApi;
use crate::error::{TunnelError, TunnelResult};
use crate::options::{ForwardOptions, TargetRef};
use crate::port;
use crate::resolver;
use crate::target::{ForwardTarget, ServiceRef};
use forwarder::Forwarder;
use parking_lot::Mutex;
use state::StateHandle;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A local TCP tunnel into one pod port.
///
/// Created Unstarted; [`start`](Self::start) resolves the pod, binds the
/// local port and returns once connections are being forwarded.
/// [`stop`](Self::stop) never blocks and may be called any number of times,
/// from any task.
///
/// All methods take `&self`, so a session can be shared through an `Arc`
/// between the task that starts it and the one that stops it.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> kubetunnel::TunnelResult<()> {
/// use kubetunnel::{ForwardOptions, KubeCluster, PortForward};
/// use std::sync::Arc;
///
/// let cluster = Arc::new(KubeCluster::from_kubeconfig(None, None).await?);
/// let options = ForwardOptions::service("monitoring", "prometheus-k8s", 39090, 9090);
/// let forward = PortForward::new(cluster, options)?;
///
/// forward.start().await?;
/// println!("listening on {}", forward.local_url().unwrap());
///
/// forward.stop();
/// forward.wait().await?;
/// # Ok(())
/// # }
/// ```
pub struct PortForward {
    options: ForwardOptions,
    cluster: Arc<dyn ClusterApi>,
    state: StateHandle,
    ready: Signal,
    finished: Signal,
    stop: CancellationToken,
    local_port: OnceLock<u16>,
    target: OnceLock<ForwardTarget>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PortForward {
    /// Create an Unstarted session. Fails on options that can never start.
    pub fn new(cluster: Arc<dyn ClusterApi>, options: ForwardOptions) -> TunnelResult<Self> {
        options.validate()?;

        let stop = match &options.cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        Ok(Self {
            options,
            cluster,
            state: StateHandle::new(),
            ready: Signal::new(),
            finished: Signal::new(),
            stop,
            local_port: OnceLock::new(),
            target: OnceLock::new(),
            task: Mutex::new(None),
        })
    }

    /// Start forwarding and wait until it is ready or has failed.
    ///
    /// Valid only once, from Unstarted. Resolution errors are returned as-is;
    /// errors from the forwarding task are wrapped in
    /// [`TunnelError::Establish`]. A concurrent [`stop`](Self::stop) makes this
    /// return [`TunnelError::Cancelled`]; a forwarder failure right after ready
    /// is returned as recorded in the session state.
    pub async fn start(&self) -> TunnelResult<()> {
        let status = self.status();
        if !status.can_start() {
            return Err(TunnelError::InvalidState(format!(
                "cannot start a session that is {}",
                status
            )));
        }
        self.state.transition(SessionStatus::Starting)?;
        tracing::info!(
            namespace = %self.options.namespace,
            forward = ?self.options.target,
            ports = %self.options.ports,
            "Starting port-forward"
        );

        match self.establish().await {
            Ok(()) => {
                if self.state.transition(SessionStatus::Ready).is_err() {
                    // stop() or a forwarder failure landed after ready fired
                    return Err(late_start_error(&self.state.snapshot()));
                }
                tracing::info!(
                    endpoint = %self.target().map(|t| t.to_string()).unwrap_or_default(),
                    local_port = self.local_port().unwrap_or_default(),
                    "Port-forward ready"
                );
                Ok(())
            }
            Err(TunnelError::Cancelled) => {
                let _ = self.state.transition(SessionStatus::Stopped);
                tracing::info!("Port-forward cancelled before ready");
                Err(TunnelError::Cancelled)
            }
            Err(e) => {
                let _ = self.state.fail(e.clone());
                self.stop.cancel();
                tracing::warn!("Port-forward failed to start: {}", e);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> TunnelResult<()> {
        let target = tokio::select! {
            biased;
            _ = self.stop.cancelled() => return Err(TunnelError::Cancelled),
            target = self.resolve_target() => target?,
        };

        let local_port =
            port::allocate_local_port(self.options.bind_address, self.options.ports.local)?;
        let _ = self.local_port.set(local_port);
        let _ = self.target.set(target.clone());

        let (startup_tx, startup_rx) = oneshot::channel();
        let forwarder = Forwarder {
            cluster: self.cluster.clone(),
            target,
            listen_addr: SocketAddr::new(self.options.bind_address, local_port),
            state: self.state.clone(),
            ready: self.ready.clone(),
            finished: self.finished.clone(),
            stop: self.stop.clone(),
        };
        *self.task.lock() = Some(tokio::spawn(forwarder.run(startup_tx)));

        tokio::select! {
            biased;
            _ = self.ready.wait() => {}
            failure = startup_rx => {
                return Err(match failure {
                    Ok(e) => TunnelError::establish(e),
                    Err(_) if self.stop.is_cancelled() => TunnelError::Cancelled,
                    Err(_) => TunnelError::establish(TunnelError::Tunnel(
                        "forwarding task exited before becoming ready".into(),
                    )),
                });
            }
        }

        if self.stop.is_cancelled() {
            return Err(TunnelError::Cancelled);
        }
        Ok(())
    }

    async fn resolve_target(&self) -> TunnelResult<ForwardTarget> {
        let namespace = &self.options.namespace;
        let remote_port = self.options.ports.remote;

        match &self.options.target {
            TargetRef::Service(name) => {
                let service = ServiceRef::new(namespace.clone(), name.clone());
                let backend = resolver::resolve(self.cluster.as_ref(), &service).await?;
                tracing::debug!(%service, pod = %backend.name, "Resolved backend");
                Ok(ForwardTarget::for_backend(&service, &backend, remote_port))
            }
            TargetRef::Pod(pod) => Ok(ForwardTarget::new(namespace.clone(), pod.clone(), remote_port)),
        }
    }

    /// Request shutdown without waiting for it.
    ///
    /// Moves a Starting or Ready session to Stopped and signals the forwarder.
    /// Returns true if this call did so; calls in any other status are no-ops.
    pub fn stop(&self) -> bool {
        if !self.status().can_stop() {
            return false;
        }
        if self.state.transition(SessionStatus::Stopped).is_err() {
            return false;
        }
        self.stop.cancel();
        tracing::info!(namespace = %self.options.namespace, "Port-forward stop requested");
        true
    }

    /// Resolves once stop has been requested, by [`stop`](Self::stop) or
    /// through the parent cancellation token.
    pub async fn wait_stopped(&self) {
        self.stop.cancelled().await
    }

    /// Resolves once the forwarder has fired ready.
    pub async fn wait_ready(&self) {
        self.ready.wait().await
    }

    /// Wait for the forwarding task to finish and return its outcome.
    ///
    /// Ok after a clean stop; the failure if the session ended Failed.
    pub async fn wait(&self) -> TunnelResult<()> {
        if self.task.lock().is_some() {
            self.finished.wait().await;
        }
        self.outcome()
    }

    /// [`stop`](Self::stop), then wait up to `timeout` for the forwarder to
    /// release the listener.
    pub async fn stop_and_wait(&self, timeout: Duration) -> TunnelResult<()> {
        self.stop();
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| {
                TunnelError::Timeout(format!(
                    "port-forward did not shut down within {:?}",
                    timeout
                ))
            })?
    }

    fn outcome(&self) -> TunnelResult<()> {
        let state = self.state.snapshot();
        match (state.status, state.error) {
            (SessionStatus::Failed, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn state(&self) -> SessionState {
        self.state.snapshot()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn options(&self) -> &ForwardOptions {
        &self.options
    }

    /// Resolved local port; None until start() allocated it.
    pub fn local_port(&self) -> Option<u16> {
        self.local_port.get().copied()
    }

    /// Resolved pod endpoint; None until start() resolved it.
    pub fn target(&self) -> Option<&ForwardTarget> {
        self.target.get()
    }

    /// `http://<bind>:<port>` for the local end, once the port is known.
    pub fn local_url(&self) -> Option<String> {
        self.local_port()
            .map(|port| format!("http://{}", SocketAddr::new(self.options.bind_address, port)))
    }
}

/// Error for a start() whose Ready transition was pre-empted by a terminal one.
fn late_start_error(state: &SessionState) -> TunnelError {
    match (state.status, &state.error) {
        (SessionStatus::Failed, Some(e)) => e.clone(),
        (status, _) if status.is_terminal() => TunnelError::Cancelled,
        (status, _) => TunnelError::InvalidState(format!(
            "session became {} while starting",
            status
        )),
    }
}

impl Drop for PortForward {
    fn drop(&mut self) {
        // The forwarder must not outlive its handle
        self.stop.cancel();
    }
}

impl std::fmt::Debug for PortForward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortForward")
            .field("namespace", &self.options.namespace)
            .field("target", &self.options.target)
            .field("ports", &self.options.ports)
            .field("status", &self.status())
            .field("local_port", &self.local_port())
            .finish()
    }
}

// Compile-time assertion: sessions are shared across tasks
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<PortForward>;
};

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(status: SessionStatus, error: Option<TunnelError>) -> SessionState {
        SessionState {
            status,
            error,
            ..SessionState::new()
        }
    }

    #[test]
    fn test_late_start_error_reports_failure() {
        let err = TunnelError::Tunnel("listener closed".into());
        let state = state_with(SessionStatus::Failed, Some(err.clone()));
        assert_eq!(late_start_error(&state), err);
    }

    #[test]
    fn test_late_start_error_after_stop_is_cancelled() {
        let state = state_with(SessionStatus::Stopped, None);
        assert_eq!(late_start_error(&state), TunnelError::Cancelled);
    }
}
