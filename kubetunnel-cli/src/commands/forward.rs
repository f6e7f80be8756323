use clap::Args;
use kubetunnel::{PortPair, TargetRef};
use std::net::IpAddr;

#[derive(Args, Debug)]
pub struct ForwardArgs {
    /// Service whose ready pod receives the traffic
    pub service: String,

    /// Port mappings: LOCAL:REMOTE, or REMOTE for an auto-assigned local port
    #[arg(required = true, num_args = 1.., value_name = "PORTS")]
    pub ports: Vec<PortPair>,

    /// Local address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub address: IpAddr,
}

pub async fn execute(args: ForwardArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let cluster = global.create_cluster().await?;
    let namespace = global.namespace(&cluster);

    super::run_forwards(
        cluster,
        namespace,
        TargetRef::Service(args.service),
        args.ports,
        args.address,
    )
    .await
}
