//! Scripted in-memory engine for driving the pipeline without docker.
#![allow(dead_code)]

use bytes::Bytes;
use clausewitz_pipeline::environment::Expect;
use clausewitz_pipeline::{
    Architecture, Engine, EnvError, Environment, Phase, PipelineConfig, Realized, SourceTree,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const BINARY: &str = "paradox-clausewitz-sav";

/// Config with a fixed native architecture so provisioning is deterministic
pub fn config() -> PipelineConfig {
    PipelineConfig {
        native_arch: Architecture::X64,
        concurrency: 2,
        ..PipelineConfig::default()
    }
}

/// A throwaway source tree with build output that must never be staged
pub fn source_tree() -> (tempfile::TempDir, SourceTree) {
    let dir = tempfile::tempdir().unwrap();
    let cli = dir.path().join("src/MageeSoft.Paradox.Clausewitz.Save.Cli");
    std::fs::create_dir_all(cli.join("obj")).unwrap();
    std::fs::create_dir_all(cli.join("bin/Debug")).unwrap();
    std::fs::write(cli.join("Program.cs"), "Console.WriteLine(\"hi\");").unwrap();
    std::fs::write(cli.join("obj/project.assets.json"), "{}").unwrap();
    std::fs::write(cli.join("bin/Debug/stale.dll"), "stale").unwrap();
    let tree = SourceTree::open(dir.path()).unwrap();
    (dir, tree)
}

#[derive(Debug)]
enum Rule {
    /// In environments mentioning `needle`, the first step of `phase` fails
    FailPhase { needle: String, phase: Phase },
    /// Any step whose command line contains `needle` exits with `exit_code`
    FailCommand { needle: String, exit_code: i32 },
}

/// Engine that runs nothing and answers from a script.
///
/// Every step succeeds and prints `ran <command>` unless a rule says
/// otherwise. A `dotnet publish ... -o <dir>` step leaves a binary at
/// `<dir>/paradox-clausewitz-sav` whose contents name the output directory.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    rules: Vec<Rule>,
    stdout: HashMap<String, String>,
    no_artifact: Vec<String>,
    empty_artifact: Vec<String>,
    delay: Option<Duration>,
    slow: Vec<(String, Duration)>,
    recorded: Mutex<Vec<Environment>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_phase(mut self, needle: &str, phase: Phase) -> Self {
        self.rules.push(Rule::FailPhase {
            needle: needle.to_string(),
            phase,
        });
        self
    }

    pub fn fail_command(mut self, needle: &str, exit_code: i32) -> Self {
        self.rules.push(Rule::FailCommand {
            needle: needle.to_string(),
            exit_code,
        });
        self
    }

    /// Stdout for the step whose command line is exactly `command`
    pub fn with_stdout(mut self, command: &str, stdout: &str) -> Self {
        self.stdout.insert(command.to_string(), stdout.to_string());
        self
    }

    /// Publish leaves no binary in environments mentioning `needle`
    pub fn without_artifact(mut self, needle: &str) -> Self {
        self.no_artifact.push(needle.to_string());
        self
    }

    /// Publish leaves a zero-byte binary in environments mentioning `needle`
    pub fn with_empty_artifact(mut self, needle: &str) -> Self {
        self.empty_artifact.push(needle.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Only environments mentioning `needle` take `delay` to materialise
    pub fn slow(mut self, needle: &str, delay: Duration) -> Self {
        self.slow.push((needle.to_string(), delay));
        self
    }

    pub fn environments(&self) -> Vec<Environment> {
        self.recorded.lock().unwrap().clone()
    }

    /// Environments currently being materialised
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn step_failure(&self, env: &Environment, phase: Phase, command: &str) -> Option<i32> {
        self.rules.iter().find_map(|rule| match rule {
            Rule::FailPhase { needle, phase: p } if *p == phase && mentions(env, needle) => Some(1),
            Rule::FailCommand { needle, exit_code } if command.contains(needle.as_str()) => {
                Some(*exit_code)
            }
            _ => None,
        })
    }
}

fn mentions(env: &Environment, needle: &str) -> bool {
    env.steps().iter().any(|s| s.command_line().contains(needle))
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Engine for ScriptedEngine {
    type Handle = ScriptedHandle;

    async fn materialize(&self, env: &Environment) -> Result<ScriptedHandle, EnvError> {
        self.recorded.lock().unwrap().push(env.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let delay = self
            .slow
            .iter()
            .find(|(needle, _)| mentions(env, needle))
            .map(|(_, delay)| *delay)
            .or(self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut handle = ScriptedHandle::default();
        for step in env.steps() {
            let command = step.command_line();
            let stdout = self
                .stdout
                .get(&command)
                .cloned()
                .unwrap_or_else(|| format!("ran {}\n", command));

            match self.step_failure(env, step.phase, &command) {
                Some(code) if step.expect == Expect::Success => {
                    return Err(EnvError::CommandFailed {
                        phase: step.phase,
                        command,
                        exit_code: Some(code),
                        stdout,
                        stderr: format!("scripted {} failure", step.phase),
                    });
                }
                Some(code) => {
                    handle.exit_code = Some(code);
                    handle.stderr = format!("scripted {} failure", step.phase);
                }
                None => {
                    handle.exit_code = Some(0);
                    handle.stderr = String::new();
                }
            }
            handle.stdout = stdout;

            if step.args.get(1).map(String::as_str) == Some("publish")
                && let Some(pos) = step.args.iter().position(|a| a == "-o")
                && let Some(dir) = step.args.get(pos + 1)
                && !self.no_artifact.iter().any(|n| mentions(env, n))
            {
                let contents = if self.empty_artifact.iter().any(|n| mentions(env, n)) {
                    Bytes::new()
                } else {
                    Bytes::from(format!("native binary from {}", dir))
                };
                handle.files.insert(format!("{}/{}", dir, BINARY), contents);
            }
        }
        Ok(handle)
    }
}

#[derive(Debug, Default)]
pub struct ScriptedHandle {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    files: HashMap<String, Bytes>,
}

impl Realized for ScriptedHandle {
    fn stdout(&self) -> &str {
        &self.stdout
    }

    fn stderr(&self) -> &str {
        &self.stderr
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    async fn read_file(&self, path: &str) -> Result<Bytes, EnvError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| EnvError::FileNotFound {
                path: path.to_string(),
            })
    }
}
