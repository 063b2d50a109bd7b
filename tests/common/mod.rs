//! Shared test infrastructure for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use build_provenance::config::DiscoveryConfig;
use build_provenance::discovery::DiscoveryContext;
use build_provenance::fs_probe::LocalFileSystem;
use build_provenance::paths;
use tempfile::TempDir;

/// Scratch project tree on the real filesystem.
pub struct ProjectFixture {
    dir: TempDir,
}

/// Output of one `bprov` invocation.
#[derive(Debug)]
pub struct CliOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    /// Parse stdout as a JSON report, panicking with stderr on failure.
    pub fn report(&self) -> serde_json::Value {
        assert!(self.success, "bprov failed: {}", self.stderr);
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("report is not JSON ({err}): {}", self.stdout))
    }
}

impl ProjectFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[allow(dead_code)]
    /// Forward-slash form of a path inside the fixture.
    pub fn slash(&self, rel: &str) -> String {
        let full = if rel.is_empty() {
            self.path().to_path_buf()
        } else {
            self.path().join(rel)
        };
        paths::normalize(&full.to_string_lossy())
    }

    #[allow(dead_code)]
    pub fn dir(&self, rel: &str) -> PathBuf {
        let path = self.path().join(rel);
        fs::create_dir_all(&path).expect("create dir");
        path
    }

    pub fn file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    #[allow(dead_code)]
    /// Discovery context over the local filesystem rooted at `rel`.
    pub fn context(&self, config: DiscoveryConfig, rel: &str) -> DiscoveryContext {
        DiscoveryContext::new(config, Arc::new(LocalFileSystem))
            .expect("discovery context")
            .with_root(&self.slash(rel))
    }

    /// Run the `bprov` binary with `args`, from inside the fixture.
    pub fn run(&self, args: &[&str]) -> CliOutput {
        let output = Command::new(env!("CARGO_BIN_EXE_bprov"))
            .args(args)
            .current_dir(self.path())
            .env_remove("BPROV_LOG")
            .env("XDG_CONFIG_HOME", self.path())
            .output()
            .expect("spawn bprov");
        CliOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}
