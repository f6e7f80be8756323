#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Kubeconfig pointing at a port nothing listens on, so every API call fails
/// fast with a connection error.
const UNREACHABLE_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: test
clusters:
- name: test
  cluster:
    server: http://127.0.0.1:1
contexts:
- name: test
  context:
    cluster: test
    user: test
    namespace: monitoring
users:
- name: test
  user:
    token: test-token
"#;

pub struct TestContext {
    pub cmd: Command,
    pub kubeconfig: PathBuf,
    _temp_dir: TempDir, // Dropped after test
}

impl TestContext {
    /// A fresh command using this context's kubeconfig.
    pub fn new_cmd(&self) -> Command {
        command_with_kubeconfig(&self.kubeconfig)
    }
}

fn command_with_kubeconfig(path: &Path) -> Command {
    let bin_path = env!("CARGO_BIN_EXE_kubetunnel");
    let mut cmd = Command::new(bin_path);
    // You can override this with .timeout(Duration::from_secs(N))
    cmd.timeout(Duration::from_secs(30));
    cmd.env_remove("KUBECONFIG");
    cmd.env_remove("KUBETUNNEL_NAMESPACE");
    cmd.env("RUST_LOG", "warn");
    cmd.arg("--kubeconfig").arg(path);
    cmd
}

/// Context whose kubeconfig targets an unreachable API server.
pub fn kubetunnel() -> TestContext {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let kubeconfig = temp_dir.path().join("config");
    std::fs::write(&kubeconfig, UNREACHABLE_KUBECONFIG).expect("Failed to write kubeconfig");

    TestContext {
        cmd: command_with_kubeconfig(&kubeconfig),
        kubeconfig,
        _temp_dir: temp_dir,
    }
}

/// Command without a kubeconfig flag, for argument parsing checks.
pub fn bare() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kubetunnel"));
    cmd.timeout(Duration::from_secs(30));
    cmd
}
