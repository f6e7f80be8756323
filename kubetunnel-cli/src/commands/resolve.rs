use clap::Args;
use kubetunnel::{ServiceRef, resolver};

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Service to resolve
    #[arg(required = true, num_args = 1..)]
    pub services: Vec<String>,
}

pub async fn execute(args: ResolveArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let cluster = global.create_cluster().await?;
    let namespace = global.namespace(&cluster);

    let mut errors = Vec::new();
    let mut success_count = 0;

    for name in args.services {
        let service = ServiceRef::new(namespace.clone(), name);
        match resolver::resolve(cluster.as_ref(), &service).await {
            Ok(backend) => {
                println!("{}\t{}", service, backend.name);
                success_count += 1;
            }
            Err(e) => {
                eprintln!("Error resolving service '{}': {}", service, e);
                errors.push(format!("{}: {}", service, e));
            }
        }
    }

    if !errors.is_empty() {
        let error_summary = if success_count > 0 {
            format!(
                "Failed to resolve {} of {} service(s)",
                errors.len(),
                errors.len() + success_count
            )
        } else {
            format!("Failed to resolve all {} service(s)", errors.len())
        };

        anyhow::bail!("{}\nErrors:\n  {}", error_summary, errors.join("\n  "));
    }
    Ok(())
}
