//! Forwarding task: owns the local listener and the tunnel connection.
//!
//! One task per session. It binds the listener, dials the tunnel, fires the
//! ready signal, then accepts local connections until the stop token is
//! cancelled. Every accepted connection is copied to its own tunnel stream in
//! a child task; all of them are aborted when the loop exits.
//!
//! A tunnel stream that cannot be opened ends the session: the tunnel is gone
//! and every later connection would fail the same way. Errors while copying
//! bytes only end that one connection.

use super::signal::{FireOnDrop, Signal};
use super::state::{SessionStatus, StateHandle};
use crate::cluster::{ClusterApi, TunnelConnection};
use crate::error::{TunnelError, TunnelResult};
use crate::target::ForwardTarget;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub(crate) struct Forwarder {
    pub(crate) cluster: Arc<dyn ClusterApi>,
    pub(crate) target: ForwardTarget,
    pub(crate) listen_addr: SocketAddr,
    pub(crate) state: StateHandle,
    pub(crate) ready: Signal,
    pub(crate) finished: Signal,
    pub(crate) stop: CancellationToken,
}

impl Forwarder {
    /// Run until stopped or failed.
    ///
    /// A failure before readiness goes to `startup` and nowhere else; after
    /// readiness it moves the session to Failed.
    pub(crate) async fn run(self, startup: oneshot::Sender<TunnelError>) {
        let _finished = FireOnDrop(self.finished.clone());

        let setup = tokio::select! {
            biased;
            _ = self.stop.cancelled() => {
                tracing::debug!(endpoint = %self.target, "Stopped before the tunnel was established");
                return;
            }
            result = self.establish() => result,
        };

        let (listener, tunnel) = match setup {
            Ok(parts) => parts,
            Err(e) => {
                tracing::debug!(endpoint = %self.target, "Port-forward setup failed: {}", e);
                let _ = startup.send(e);
                return;
            }
        };

        self.ready.fire();

        let result = self.accept_loop(listener, tunnel.clone()).await;
        tunnel.close().await;

        match result {
            Ok(()) => {
                // Parent token cancelled without stop(): record the stop here
                let _ = self.state.transition(SessionStatus::Stopped);
                tracing::info!(
                    endpoint = %self.target,
                    local = %self.listen_addr,
                    "Port-forward stopped"
                );
            }
            Err(e) => {
                tracing::error!(endpoint = %self.target, "Port-forward failed: {}", e);
                if self.state.fail(e).is_err() {
                    tracing::debug!("Session already terminal, failure not recorded");
                }
            }
        }
    }

    async fn establish(&self) -> TunnelResult<(TcpListener, Arc<dyn TunnelConnection>)> {
        let listener = TcpListener::bind(self.listen_addr).await.map_err(|e| {
            TunnelError::PortBind(format!("listen on {}: {}", self.listen_addr, e))
        })?;
        let tunnel: Arc<dyn TunnelConnection> = Arc::from(self.cluster.dial(&self.target).await?);
        Ok((listener, tunnel))
    }

    async fn accept_loop(
        &self,
        listener: TcpListener,
        tunnel: Arc<dyn TunnelConnection>,
    ) -> TunnelResult<()> {
        let mut connections = JoinSet::new();

        let result = loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, endpoint = %self.target, "Accepted local connection");
                        connections.spawn(forward_connection(
                            tunnel.clone(),
                            stream,
                            peer,
                            self.target.to_string(),
                        ));
                    }
                    Err(e) => {
                        break Err(TunnelError::PortBind(format!(
                            "accept on {}: {}",
                            self.listen_addr, e
                        )));
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Ok(Err(e)) = joined {
                        break Err(e);
                    }
                }
            }
        };

        connections.shutdown().await;
        drop(listener);
        result
    }
}

/// Copy bytes between one local connection and a fresh tunnel stream.
///
/// Fails only when the tunnel stream cannot be opened.
async fn forward_connection(
    tunnel: Arc<dyn TunnelConnection>,
    mut local: TcpStream,
    peer: SocketAddr,
    endpoint: String,
) -> TunnelResult<()> {
    let mut upstream = match tunnel.open_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(%peer, %endpoint, "Failed to open port-forward stream: {}", e);
            return Err(e);
        }
    };

    match tokio::io::copy_bidirectional(&mut local, &mut upstream).await {
        Ok((sent, received)) => {
            tracing::debug!(%peer, %endpoint, sent, received, "Local connection closed");
        }
        Err(e) => {
            tracing::debug!(%peer, %endpoint, "Local connection ended with error: {}", e);
        }
    }
    Ok(())
}
