// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the behavioral specs.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::cargo::CommandCargoExt;
use tempfile::TempDir;

/// How long to wait for the daemon socket to appear
const STARTUP_WAIT: Duration = Duration::from_secs(10);

/// Agent that succeeds for every action and reports the plug it was given
pub const DUMMY_AGENT: &str = r#"#!/bin/sh
action=""
plug=""
while IFS='=' read -r key value; do
    case "$key" in
        action) action="$value" ;;
        plug|port) plug="$value" ;;
    esac
done
case "$action" in
    metadata) echo '<resource-agent name="fence_dummy"/>' ;;
    list) echo "node2"; echo "node3" ;;
    *) echo "$action $plug" >> "$0.log" ;;
esac
exit 0
"#;

/// Agent that fails every action
pub const FAILING_AGENT: &str = "#!/bin/sh\ncat >/dev/null\necho 'power switch unreachable' >&2\nexit 1\n";

/// A scratch directory holding a daemon's configuration, agents and state
pub struct Project {
    dir: TempDir,
    daemon: Option<Child>,
}

impl Project {
    /// Project with a configuration for `node1` and no agents
    pub fn empty() -> Self {
        let project = Self {
            dir: TempDir::new().unwrap(),
            daemon: None,
        };
        std::fs::create_dir_all(project.agent_dir()).unwrap();
        std::fs::create_dir_all(project.state_path()).unwrap();
        project.file(
            "fenced.toml",
            &format!(
                "node_name = \"node1\"\nagent_dir = \"{}\"\nstate_dir = \"{}\"\n",
                project.agent_dir().display(),
                project.state_path().display()
            ),
        );
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn agent_dir(&self) -> PathBuf {
        self.path().join("agents")
    }

    pub fn state_path(&self) -> PathBuf {
        self.path().join("state")
    }

    pub fn socket(&self) -> PathBuf {
        self.state_path().join("fenced.sock")
    }

    pub fn file(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    /// Install an executable agent script
    pub fn agent(&self, name: &str, script: &str) {
        let path = self.agent_dir().join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Lines the dummy agent recorded, as "action plug"
    pub fn agent_log(&self, name: &str) -> Vec<String> {
        std::fs::read_to_string(self.agent_dir().join(format!("{name}.log")))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Start `fenced` and wait until it accepts connections
    pub fn start_daemon(&mut self) {
        let mut cmd = Command::cargo_bin("fenced").unwrap();
        cmd.arg(self.path().join("fenced.toml"))
            .env_remove("FENCED_SOCKET_PATH")
            .env_remove("FENCED_CONFIG")
            .env("RUST_LOG", "debug")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        self.daemon = Some(cmd.spawn().unwrap());

        let deadline = Instant::now() + STARTUP_WAIT;
        while !self.socket().exists() {
            if Instant::now() > deadline {
                panic!("fenced did not start:\n{}", self.daemon_log());
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn daemon_log(&self) -> String {
        std::fs::read_to_string(self.state_path().join("fenced.log")).unwrap_or_default()
    }

    /// `fence-admin` pointed at this project's socket
    pub fn admin(&self) -> CliBuilder {
        let mut cmd = Command::cargo_bin("fence-admin").unwrap();
        cmd.arg("--socket")
            .arg(self.socket())
            .env_remove("FENCED_SOCKET_PATH")
            .env_remove("FENCED_CONFIG")
            .env_remove("RUST_LOG");
        CliBuilder { cmd }
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        if let Some(mut child) = self.daemon.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// `fence-admin` with no project around it
pub fn admin() -> CliBuilder {
    let mut cmd = Command::cargo_bin("fence-admin").unwrap();
    cmd.env_remove("FENCED_SOCKET_PATH")
        .env_remove("FENCED_CONFIG")
        .env_remove("RUST_LOG");
    CliBuilder { cmd }
}

pub struct CliBuilder {
    cmd: Command,
}

impl CliBuilder {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        self.cmd.env(key, value);
        self
    }

    fn run(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        RunAssert { output }
    }

    /// Run and require exit code 0
    pub fn passes(self) -> RunAssert {
        let run = self.run();
        assert!(
            run.output.status.success(),
            "expected success, got {:?}\nstdout:\n{}\nstderr:\n{}",
            run.output.status.code(),
            run.stdout(),
            run.stderr()
        );
        run
    }

    /// Run and require a non-zero exit code
    pub fn fails(self) -> RunAssert {
        let run = self.run();
        assert!(
            !run.output.status.success(),
            "expected failure\nstdout:\n{}",
            run.stdout()
        );
        run
    }

    /// Run and require a specific exit code
    pub fn exits_with(self, code: i32) -> RunAssert {
        let run = self.run();
        assert_eq!(
            run.output.status.code(),
            Some(code),
            "stdout:\n{}\nstderr:\n{}",
            run.stdout(),
            run.stderr()
        );
        run
    }
}

pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout does not contain {expected:?}:\n{stdout}"
        );
        self
    }

    pub fn stdout_lacks(self, unexpected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            !stdout.contains(unexpected),
            "stdout contains {unexpected:?}:\n{stdout}"
        );
        self
    }

    pub fn stdout_eq(self, expected: &str) -> Self {
        similar_asserts::assert_eq!(self.stdout().as_str(), expected);
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            stderr.contains(expected),
            "stderr does not contain {expected:?}:\n{stderr}"
        );
        self
    }

    pub fn stdout_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout()).unwrap()
    }
}
