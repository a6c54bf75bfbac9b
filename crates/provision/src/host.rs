//! Process execution on the host
//!
//! Strategies never spawn processes directly; they go through [`System`] so
//! tests can substitute [`mock::FakeSystem`].

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use crate::error::StrategyError;

/// A command to run, optionally as another user or with stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Run as this user with their HOME instead of the current account.
    pub as_user: Option<String>,
    pub stdin: Option<Vec<u8>>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.as_user = Some(user.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.as_user {
            write!(f, "[{user}] ")?;
        }
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            success: true,
        }
    }

    pub fn failed(stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            success: false,
        }
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

pub trait System: Send + Sync {
    fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput>;

    /// Locate a binary on PATH.
    fn which(&self, binary: &str) -> Option<PathBuf>;

    /// Whether a systemd unit is active; `None` when that cannot be told.
    fn service_active(&self, unit: &str) -> Option<bool>;

    /// Run and turn spawn errors or a non-zero exit into a [`StrategyError`].
    fn run_checked(&self, cmd: &CommandSpec) -> Result<CommandOutput, StrategyError> {
        let output = self
            .run(cmd)
            .map_err(|e| StrategyError::command(cmd.to_string(), e.to_string()))?;
        if output.success {
            Ok(output)
        } else {
            Err(StrategyError::command(
                cmd.to_string(),
                output.stderr_str().trim().to_string(),
            ))
        }
    }
}

/// Runs real processes.
pub struct ProcessSystem;

impl System for ProcessSystem {
    fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
        let mut command = match &cmd.as_user {
            Some(user) => {
                let mut c = Command::new("sudo");
                c.args(["-n", "-H", "-u", user, "env"]);
                for (key, value) in &cmd.env {
                    c.arg(format!("{key}={value}"));
                }
                c.arg(&cmd.program);
                c
            }
            None => {
                let mut c = Command::new(&cmd.program);
                c.envs(cmd.env.iter().map(|(k, v)| (k, v)));
                c
            }
        };
        command.args(&cmd.args);
        log::debug!("running {cmd}");

        match &cmd.stdin {
            None => command.output().map(Into::into),
            Some(input) => {
                let mut child = command
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(input)?;
                }
                child.wait_with_output().map(Into::into)
            }
        }
    }

    fn which(&self, binary: &str) -> Option<PathBuf> {
        which::which(binary).ok()
    }

    fn service_active(&self, unit: &str) -> Option<bool> {
        let output = Command::new("systemctl")
            .args(["is-active", unit])
            .output()
            .ok()?;
        match String::from_utf8_lossy(&output.stdout).trim() {
            "active" | "activating" | "reloading" => Some(true),
            "inactive" | "failed" | "deactivating" => Some(false),
            _ => None,
        }
    }
}

pub mod mock {
    //! In-memory [`System`] double.

    use super::{CommandOutput, CommandSpec, System};
    use std::collections::{BTreeSet, HashMap};
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Debug, Clone)]
    enum Effect {
        Respond(CommandOutput),
        AddBinary(String),
        RemoveBinary(String),
        CreateDir(PathBuf),
    }

    #[derive(Debug, Default)]
    struct FakeState {
        rules: Vec<(String, Effect)>,
        binaries: BTreeSet<String>,
        services: HashMap<String, bool>,
        commands: Vec<CommandSpec>,
    }

    /// Records commands and plays back scripted effects.
    ///
    /// Rules match when their pattern is a substring of the rendered
    /// command line. Unmatched commands succeed with empty output.
    #[derive(Debug, Clone, Default)]
    pub struct FakeSystem {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeSystem {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, FakeState> {
            match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }

        pub fn respond(&self, pattern: &str, output: CommandOutput) {
            self.lock()
                .rules
                .push((pattern.to_string(), Effect::Respond(output)));
        }

        /// Running a matching command puts `binary` on PATH.
        pub fn on_run_add_binary(&self, pattern: &str, binary: &str) {
            self.lock()
                .rules
                .push((pattern.to_string(), Effect::AddBinary(binary.to_string())));
        }

        pub fn on_run_remove_binary(&self, pattern: &str, binary: &str) {
            self.lock()
                .rules
                .push((pattern.to_string(), Effect::RemoveBinary(binary.to_string())));
        }

        pub fn on_run_create_dir(&self, pattern: &str, dir: impl Into<PathBuf>) {
            self.lock()
                .rules
                .push((pattern.to_string(), Effect::CreateDir(dir.into())));
        }

        pub fn add_binary(&self, binary: &str) {
            self.lock().binaries.insert(binary.to_string());
        }

        pub fn set_service(&self, unit: &str, active: bool) {
            self.lock().services.insert(unit.to_string(), active);
        }

        /// Rendered command lines, oldest first.
        pub fn commands(&self) -> Vec<String> {
            self.lock().commands.iter().map(ToString::to_string).collect()
        }

        pub fn specs(&self) -> Vec<CommandSpec> {
            self.lock().commands.clone()
        }

        pub fn ran(&self, pattern: &str) -> bool {
            self.commands().iter().any(|c| c.contains(pattern))
        }
    }

    impl System for FakeSystem {
        fn run(&self, cmd: &CommandSpec) -> io::Result<CommandOutput> {
            let line = cmd.to_string();
            let mut state = self.lock();
            state.commands.push(cmd.clone());

            let effects: Vec<Effect> = state
                .rules
                .iter()
                .filter(|(pattern, _)| line.contains(pattern.as_str()))
                .map(|(_, effect)| effect.clone())
                .collect();

            let mut output = CommandOutput::ok(Vec::new());
            for effect in effects {
                match effect {
                    Effect::Respond(o) => output = o,
                    Effect::AddBinary(b) => {
                        state.binaries.insert(b);
                    }
                    Effect::RemoveBinary(b) => {
                        state.binaries.remove(&b);
                    }
                    Effect::CreateDir(dir) => std::fs::create_dir_all(dir)?,
                }
            }
            Ok(output)
        }

        fn which(&self, binary: &str) -> Option<PathBuf> {
            self.lock()
                .binaries
                .contains(binary)
                .then(|| PathBuf::from("/usr/bin").join(binary))
        }

        fn service_active(&self, unit: &str) -> Option<bool> {
            self.lock().services.get(unit).copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::FakeSystem;
    use super::*;

    #[test]
    fn test_command_display() {
        let cmd = CommandSpec::new("bash")
            .arg("-s")
            .env("PROFILE", "/dev/null")
            .as_user("alice");
        assert_eq!(cmd.to_string(), "[alice] PROFILE=/dev/null bash -s");
    }

    #[test]
    fn test_fake_rules_and_log() {
        let fake = FakeSystem::new();
        fake.respond("dpkg --print-architecture", CommandOutput::ok("arm64\n"));
        fake.on_run_add_binary("sh /tmp", "docker");

        let out = fake
            .run(&CommandSpec::new("dpkg").arg("--print-architecture"))
            .unwrap();
        assert_eq!(out.stdout_str().trim(), "arm64");

        assert!(fake.which("docker").is_none());
        fake.run(&CommandSpec::new("sh").arg("/tmp/x/install.sh")).unwrap();
        assert!(fake.which("docker").is_some());
        assert!(fake.ran("install.sh"));
    }

    #[test]
    fn test_run_checked_maps_failure() {
        let fake = FakeSystem::new();
        fake.respond("false", CommandOutput::failed("nope"));
        let err = fake.run_checked(&CommandSpec::new("false")).unwrap_err();
        assert!(matches!(err, StrategyError::Command { .. }));
    }
}
