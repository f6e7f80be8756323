pub mod forward;
pub mod pod;
pub mod resolve;

use anyhow::Context;
use kubetunnel::{
    CancellationToken, ClusterApi, ForwardOptions, PortForward, PortPair, TargetRef, TunnelError,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Start one session per port pair, print where each listens, then hold them
/// open until Ctrl-C or until one of them fails.
pub(crate) async fn run_forwards(
    cluster: Arc<dyn ClusterApi>,
    namespace: String,
    target: TargetRef,
    ports: Vec<PortPair>,
    bind_address: IpAddr,
) -> anyhow::Result<()> {
    if ports.is_empty() {
        anyhow::bail!("No ports to forward");
    }

    let shutdown = CancellationToken::new();
    let mut sessions = Vec::new();
    let mut errors = Vec::new();

    for pair in ports {
        let options = ForwardOptions::new(namespace.clone(), target.clone(), pair)
            .with_bind_address(bind_address)
            .with_cancel(shutdown.clone());
        let forward = PortForward::new(cluster.clone(), options)?;

        if let Err(e) = forward.start().await {
            eprintln!("Error forwarding {} to '{}': {}", pair, target.name(), e);
            errors.push(format!("{}: {}", pair, e));
            continue;
        }

        if let (Some(url), Some(endpoint)) = (forward.local_url(), forward.target()) {
            println!("{} -> {}", url, endpoint);
        }
        sessions.push(forward);
    }

    if !errors.is_empty() {
        shutdown.cancel();
        stop_all(&sessions).await;

        let error_summary = if sessions.is_empty() {
            format!("Failed to start all {} forward(s)", errors.len())
        } else {
            format!(
                "Failed to start {} of {} forward(s)",
                errors.len(),
                errors.len() + sessions.len()
            )
        };
        anyhow::bail!("{}\nErrors:\n  {}", error_summary, errors.join("\n  "));
    }

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, stopping {} forward(s)", sessions.len());
            Ok(())
        }
        (result, index, _) = futures::future::select_all(
            sessions.iter().map(|s| Box::pin(s.wait())),
        ) => result.with_context(|| format!("Forward {} ended", sessions[index].options().ports)),
    };

    shutdown.cancel();
    stop_all(&sessions).await;
    outcome
}

async fn stop_all(sessions: &[PortForward]) {
    let results =
        futures::future::join_all(sessions.iter().map(|s| s.stop_and_wait(STOP_TIMEOUT))).await;
    for (session, result) in sessions.iter().zip(results) {
        // Failures were already reported through wait()
        if let Err(e @ TunnelError::Timeout(_)) = result {
            tracing::warn!(ports = %session.options().ports, "Forward did not stop cleanly: {}", e);
        }
    }
}
