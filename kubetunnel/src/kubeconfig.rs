//! Kubeconfig discovery.
//!
//! Lookup order: explicit path, then the first entry of `KUBECONFIG`, then
//! `~/.kube/config`.

use crate::constants::{envs, kubeconfig as files};
use crate::error::{TunnelError, TunnelResult};
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::ffi::OsString;
use std::path::PathBuf;

/// Pick the kubeconfig path without touching the filesystem.
pub fn resolve_path(
    explicit: Option<PathBuf>,
    env_value: Option<OsString>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    if let Some(value) = env_value
        && let Some(first) = std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty())
    {
        return Some(first);
    }

    home.map(|h| h.join(files::DIR).join(files::FILE))
}

/// Locate the kubeconfig file, failing if it does not exist.
pub fn kubeconfig_path(explicit: Option<PathBuf>) -> TunnelResult<PathBuf> {
    let path = resolve_path(
        explicit,
        std::env::var_os(envs::KUBECONFIG),
        dirs::home_dir(),
    )
    .ok_or_else(|| TunnelError::Config("cannot determine home directory for kubeconfig".into()))?;

    if !path.exists() {
        return Err(TunnelError::Config(format!(
            "kubeconfig file not found: {}",
            path.display()
        )));
    }

    tracing::debug!(path = %path.display(), "Using kubeconfig");
    Ok(path)
}

/// Load a client configuration from the located kubeconfig.
pub async fn load_config(
    explicit: Option<PathBuf>,
    context: Option<String>,
) -> TunnelResult<kube::Config> {
    let path = kubeconfig_path(explicit)?;
    let kubeconfig = Kubeconfig::read_from(&path)?;

    let options = KubeConfigOptions {
        context,
        ..Default::default()
    };
    Ok(kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?)
}
