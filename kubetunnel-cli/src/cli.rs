use crate::commands::{forward::ForwardArgs, pod::PodArgs, resolve::ResolveArgs};
use clap::{Args, Parser, Subcommand};
use kubetunnel::KubeCluster;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "kubetunnel",
    author,
    version,
    about = "Forward local ports to pods behind Kubernetes services"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Forward local ports to a ready pod behind a service
    Forward(ForwardArgs),

    /// Forward local ports straight to a named pod
    Pod(PodArgs),

    /// Print the pod a service would be forwarded to
    Resolve(ResolveArgs),
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalFlags {
    /// Path to the kubeconfig file (default: $KUBECONFIG, then ~/.kube/config)
    #[arg(long, global = true, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Namespace (default: the context's namespace)
    #[arg(short, long, global = true, env = "KUBETUNNEL_NAMESPACE")]
    pub namespace: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalFlags {
    pub async fn create_cluster(&self) -> anyhow::Result<Arc<KubeCluster>> {
        let cluster =
            KubeCluster::from_kubeconfig(self.kubeconfig.clone(), self.context.clone()).await?;
        Ok(Arc::new(cluster))
    }

    /// `--namespace`, else the namespace the kubeconfig context selects.
    pub fn namespace(&self, cluster: &KubeCluster) -> String {
        self.namespace
            .clone()
            .unwrap_or_else(|| cluster.client().default_namespace().to_string())
    }
}
