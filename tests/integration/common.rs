//! Common test utilities.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// Variables that would leak the host's settings into a test run.
const SCRUBBED_VARS: &[&str] = &[
    "LANGPREF_STATE_DIR",
    "LANGPREF_DEFAULT_LOCALE",
    "LANGPREF_MAX_RECORDS",
    "LANGUAGE",
    "LC_ALL",
    "LC_MESSAGES",
    "LANG",
    "RUST_LOG",
];

/// An isolated home for one test: its own config, state and working
/// directory.
pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    /// Create a fresh environment.
    pub fn new() -> Self {
        Self { dir: TempDir::new().expect("Failed to create temp dir") }
    }

    /// Root of the environment; also the working directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Where the binary keeps its stores.
    pub fn state_dir(&self) -> PathBuf {
        self.root().join("state").join("langpref")
    }

    /// A path inside the environment.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    /// Write a project config file into the working directory.
    pub fn write_project_config(&self, yaml: &str) {
        std::fs::write(self.root().join(".langpref.yaml"), yaml).expect("write project config");
    }

    /// Write a raw local store file.
    pub fn write_local_store(&self, json: &str) {
        let dir = self.state_dir();
        std::fs::create_dir_all(&dir).expect("create state dir");
        std::fs::write(dir.join("local-storage.json"), json).expect("write local store");
    }

    /// A command for the langpref binary bound to this environment.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("langpref"));
        cmd.current_dir(self.root())
            .env("XDG_CONFIG_HOME", self.root().join("config"))
            .env("XDG_STATE_HOME", self.root().join("state"));
        for var in SCRUBBED_VARS {
            cmd.env_remove(var);
        }
        cmd
    }
}
