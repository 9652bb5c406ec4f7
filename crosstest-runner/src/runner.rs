// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The build → run → compare pipeline and its scheduler.
//!
//! Each [`TestConfiguration`] moves through a three-stage pipeline: build the
//! source with the configuration's toolchain, run the executable under its
//! simulator, and compare captured output against the expected file. The
//! scheduler fans configurations out across a bounded queue of concurrent
//! pipelines and collects one [`TestResult`] per configuration; toolchain and
//! simulator provisioning runs through the same queue beforehand.

use crate::{
    artifact::{ArtifactKind, TestFile},
    config::{EvalContext, TestThreads},
    errors::TestRunnerBuildError,
    resolve::TestConfiguration,
};
use future_queue::StreamExt as _;
use futures::prelude::*;
use std::{
    collections::BTreeSet,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{process::Command, runtime::Runtime};
use tracing::{debug, info, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<TestThreads>,
    keep_artifacts: bool,
    timeout: Option<Duration>,
}

impl TestRunnerBuilder {
    /// Sets the number of configurations to run simultaneously.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Retains generated artifacts after the run instead of cleaning them.
    pub fn set_keep_artifacts(&mut self, keep: bool) -> &mut Self {
        self.keep_artifacts = keep;
        self
    }

    /// Sets a per-invocation timeout for build and run subprocesses.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Creates a new test runner against the given context.
    pub fn build(self, ctx: &EvalContext) -> Result<TestRunner<'_>, TestRunnerBuildError> {
        let test_threads = self.test_threads.unwrap_or_default().compute();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("crosstest-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            inner: TestRunnerInner {
                ctx,
                test_threads,
                keep_artifacts: self.keep_artifacts,
                timeout: self.timeout,
                runtime,
            },
        })
    }
}

/// Context for running test configurations.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<'a> {
    inner: TestRunnerInner<'a>,
}

impl TestRunner<'_> {
    /// Provisions simulator configurations before any test runs.
    ///
    /// With `required` set, only those configurations are built; otherwise
    /// every registered configuration is. One configuration's build failure
    /// is logged and does not abort sibling builds; the return value is the
    /// logical AND of all individual results.
    pub fn provision_simulators(&self, required: Option<&BTreeSet<String>>) -> bool {
        self.inner.runtime.block_on(self.inner.provision(required))
    }

    /// Executes the resolved configurations, each pipeline in its own
    /// subprocess chain, and collects the results.
    ///
    /// Unless artifact retention was requested, every artifact referenced by
    /// every result is cleaned before this returns. Results are sorted by
    /// display name.
    pub fn execute(&self, configurations: Vec<TestConfiguration>) -> RunResults {
        self.inner.runtime.block_on(self.inner.execute(configurations))
    }
}

#[derive(Debug)]
struct TestRunnerInner<'a> {
    ctx: &'a EvalContext,
    test_threads: usize,
    keep_artifacts: bool,
    timeout: Option<Duration>,
    runtime: Runtime,
}

impl TestRunnerInner<'_> {
    async fn provision(&self, required: Option<&BTreeSet<String>>) -> bool {
        let names: Vec<String> = match required {
            Some(required) => required.iter().cloned().collect(),
            None => self.ctx.simulators.names().map(str::to_owned).collect(),
        };

        let results: Vec<bool> = futures::stream::iter(names)
            .map(|name| (1, move |_cx| self.provision_one(name)))
            .future_queue(self.test_threads)
            .collect()
            .await;
        results.iter().all(|&ok| ok)
    }

    async fn provision_one(&self, name: String) -> bool {
        let Some(build_command) = self.ctx.simulators.build_command(&name) else {
            warn!(simulator = %name, "unknown simulator configuration");
            return false;
        };

        let tokens = match shell_words::split(build_command) {
            Ok(tokens) => tokens,
            Err(error) => {
                warn!(simulator = %name, %error, "invalid build command");
                return false;
            }
        };
        if tokens.is_empty() {
            // Nothing to build for this configuration.
            return true;
        }

        let install_dir = self.ctx.simulators.install_dir(&name);
        info!(simulator = %name, command = %shell_words::join(&tokens), "provisioning");

        let mut command = Command::new(&tokens[0]);
        command
            .args(&tokens[1..])
            .env("BUILD", &install_dir)
            .current_dir(&self.ctx.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match run_to_completion(command, self.timeout).await {
            Ok(Some(0)) => true,
            Ok(_) => {
                warn!(simulator = %name, "failed to build simulator configuration");
                false
            }
            Err(message) => {
                warn!(simulator = %name, "{message}");
                false
            }
        }
    }

    async fn execute(&self, configurations: Vec<TestConfiguration>) -> RunResults {
        let cancelled = Arc::new(AtomicBool::new(false));
        let signal_task = {
            let cancelled = cancelled.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling pending configurations");
                    cancelled.store(true, Ordering::Release);
                }
            })
        };

        let mut results: Vec<TestResult> = futures::stream::iter(configurations)
            .map(|configuration| {
                let cancelled = cancelled.clone();
                let fut = async move {
                    if cancelled.load(Ordering::Acquire) {
                        return TestResult {
                            build_log: None,
                            run_output: None,
                            messages: vec!["Cancelled".to_owned()],
                            configuration,
                        };
                    }
                    self.run_configuration(configuration).await
                };
                (1, move |_cx| fut)
            })
            .future_queue(self.test_threads)
            .collect()
            .await;
        signal_task.abort();

        if !self.keep_artifacts {
            for result in &results {
                result.clean();
            }
        }

        results.sort_by_key(TestResult::display_name);
        let stats = RunStats::from_results(&results);
        RunResults { results, stats }
    }

    /// Runs one configuration through build, run, and check.
    async fn run_configuration(&self, configuration: TestConfiguration) -> TestResult {
        debug!(test = %configuration.display_name(), "running configuration");
        let fingerprint = configuration.fingerprint();
        let build_log = TestFile::generated(TestFile::derive(
            &configuration.test_name,
            ArtifactKind::BuildLog,
            fingerprint,
        ));
        let executable = TestFile::generated(TestFile::derive(
            &configuration.test_name,
            ArtifactKind::Executable,
            fingerprint,
        ));

        if let Err(message) = self
            .build_configuration(&configuration, &executable, &build_log)
            .await
        {
            // A failed compiler invocation may still have written partial
            // output to the derived executable path.
            if !self.keep_artifacts {
                executable.clean();
            }
            return TestResult {
                build_log: Some(build_log),
                run_output: None,
                messages: vec![message],
                configuration,
            };
        }

        let run_output = TestFile::generated(TestFile::derive(
            &configuration.test_name,
            ArtifactKind::RunOutput,
            fingerprint,
        ));
        // The executable is only needed for the run stage; clean it as soon
        // as the stage is over unless the run kept artifacts.
        let run_result = self
            .execute_configuration(&configuration, &executable, &run_output)
            .await;
        if !self.keep_artifacts {
            executable.clean();
        }
        if let Err(message) = run_result {
            return TestResult {
                build_log: Some(build_log),
                run_output: None,
                messages: vec![message],
                configuration,
            };
        }

        let messages = match self.check_configuration(&configuration, &run_output).await {
            Ok(()) => Vec::new(),
            Err(message) => vec![message],
        };
        TestResult {
            build_log: Some(build_log),
            run_output: Some(run_output),
            messages,
            configuration,
        }
    }

    /// The build stage: compile the source into the derived executable,
    /// capturing combined output into the build log.
    async fn build_configuration(
        &self,
        configuration: &TestConfiguration,
        executable: &TestFile,
        build_log: &TestFile,
    ) -> Result<(), String> {
        let toolchain_name = configuration.toolchain.options.as_str();
        if self.ctx.toolchains.install_dir(toolchain_name).is_none() {
            return Err(format!("Invalid toolchain '{toolchain_name}'"));
        }

        let tool_suffix = configuration.source.kind.tool_suffix();
        let Some(tool) = self.ctx.toolchains.find_tool(toolchain_name, tool_suffix) else {
            return Err(format!(
                "No '*{tool_suffix}' tool in toolchain '{toolchain_name}'"
            ));
        };

        let options = shell_words::split(&configuration.compile.options)
            .map_err(|error| format!("Invalid compile options: {error}"))?;

        let mut command = Command::new(&tool);
        command
            .args(&options)
            .arg(configuration.source.file.path())
            .arg("-o")
            .arg(executable.path());
        info!(
            test = %configuration.display_name(),
            tool = %tool,
            "building"
        );

        match run_captured(command, build_log, self.timeout).await? {
            Some(0) => Ok(()),
            _ => Err("Failed to build".to_owned()),
        }
    }

    /// The run stage: execute the built program under the configuration's
    /// simulator, capturing combined output.
    ///
    /// The process's own exit code is deliberately ignored: simulated
    /// programs may legitimately exit non-zero, and only output divergence
    /// fails a test.
    async fn execute_configuration(
        &self,
        configuration: &TestConfiguration,
        executable: &TestFile,
        run_output: &TestFile,
    ) -> Result<(), String> {
        let simulator_name = configuration.simulate.options.as_str();
        if !self.ctx.simulators.contains(simulator_name) {
            return Err(format!("Invalid simulator '{simulator_name}'"));
        }
        let simulator = self.ctx.simulators.executable(simulator_name);

        let options = shell_words::split(&configuration.execute.options)
            .map_err(|error| format!("Invalid execute options: {error}"))?;

        let mut command = Command::new(&simulator);
        command.arg(executable.path()).args(&options);
        info!(
            test = %configuration.display_name(),
            simulator = %simulator,
            "running"
        );

        run_captured(command, run_output, self.timeout).await?;
        Ok(())
    }

    /// The check stage: byte-for-byte comparison of captured run output
    /// against the expected file.
    async fn check_configuration(
        &self,
        configuration: &TestConfiguration,
        run_output: &TestFile,
    ) -> Result<(), String> {
        let expected = tokio::fs::read(configuration.expected.path())
            .await
            .map_err(|error| {
                format!(
                    "Failed to read expected output '{}': {error}",
                    configuration.expected.path()
                )
            })?;
        let actual = tokio::fs::read(run_output.path())
            .await
            .map_err(|error| format!("Failed to read run output: {error}"))?;

        if expected == actual {
            Ok(())
        } else {
            Err("Output did not match".to_owned())
        }
    }
}

/// Spawns `command` with combined stdout/stderr captured into `output`, and
/// waits for it, returning the exit code.
async fn run_captured(
    mut command: Command,
    output: &TestFile,
    timeout: Option<Duration>,
) -> Result<Option<i32>, String> {
    let log = std::fs::File::create(output.path())
        .map_err(|error| format!("Failed to create '{}': {error}", output.path()))?;
    let log_err = log
        .try_clone()
        .map_err(|error| format!("Failed to create '{}': {error}", output.path()))?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    run_to_completion(command, timeout).await
}

/// Spawns `command` and waits for it, enforcing the per-invocation timeout.
///
/// A timed-out child is killed before the error is reported.
async fn run_to_completion(
    mut command: Command,
    timeout: Option<Duration>,
) -> Result<Option<i32>, String> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let mut child = command
        .spawn()
        .map_err(|error| format!("Failed to invoke '{program}': {error}"))?;

    let status = match timeout {
        Some(duration) => match tokio::time::timeout(duration, child.wait()).await {
            Ok(status) => {
                status.map_err(|error| format!("Failed to wait for '{program}': {error}"))?
            }
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(format!(
                    "'{program}' timed out after {}s",
                    duration.as_secs()
                ));
            }
        },
        None => child
            .wait()
            .await
            .map_err(|error| format!("Failed to wait for '{program}': {error}"))?,
    };
    Ok(status.code())
}

/// The simulator configurations a set of resolved configurations requires.
pub fn required_simulators(configurations: &[TestConfiguration]) -> BTreeSet<String> {
    configurations
        .iter()
        .map(|configuration| configuration.simulate.options.clone())
        .collect()
}

/// The outcome of one configuration's pipeline run.
#[derive(Clone, Debug)]
pub struct TestResult {
    /// The configuration that ran.
    pub configuration: TestConfiguration,
    /// Captured compiler output; absent if the pipeline never reached the
    /// build invocation.
    pub build_log: Option<TestFile>,
    /// Captured simulator output; absent if the pipeline failed before or
    /// during the run stage.
    pub run_output: Option<TestFile>,
    /// Failure messages; empty exactly when the configuration passed.
    pub messages: Vec<String>,
}

impl TestResult {
    /// The reporting name of the underlying configuration.
    pub fn display_name(&self) -> String {
        self.configuration.display_name()
    }

    /// Whether the configuration passed.
    pub fn is_success(&self) -> bool {
        self.messages.is_empty()
    }

    /// Cleans every generated artifact this result references.
    pub fn clean(&self) {
        if let Some(build_log) = &self.build_log {
            build_log.clean();
        }
        if let Some(run_output) = &self.run_output {
            run_output.clean();
        }
        self.configuration.expected.clean();
        self.configuration.source.file.clean();
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of configurations that ran.
    pub initial_run_count: usize,
    /// The number of configurations that passed.
    pub passed: usize,
    /// The number of configurations that failed.
    pub failed: usize,
}

impl RunStats {
    fn from_results(results: &[TestResult]) -> Self {
        let passed = results.iter().filter(|result| result.is_success()).count();
        Self {
            initial_run_count: results.len(),
            passed,
            failed: results.len() - passed,
        }
    }

    /// Whether every configuration passed.
    pub fn is_success(self) -> bool {
        self.failed == 0
    }

    /// The pass rate as a percentage, 100 for an empty run.
    pub fn pass_rate(self) -> f64 {
        if self.initial_run_count == 0 {
            100.0
        } else {
            100.0 * (self.passed as f64 / self.initial_run_count as f64)
        }
    }
}

/// All results of a run, sorted by display name, plus aggregate statistics.
#[derive(Clone, Debug)]
pub struct RunResults {
    /// Per-configuration results, sorted by display name.
    pub results: Vec<TestResult>,
    /// Aggregate statistics.
    pub stats: RunStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifact::TestFile,
        config::AxisEntry,
        list::TestName,
        resolve::{SourceFile, SourceKind},
    };
    use pretty_assertions::assert_eq;

    fn result_with_messages(messages: Vec<String>) -> TestResult {
        TestResult {
            configuration: TestConfiguration {
                test_name: TestName::new("/t/add"),
                source: SourceFile {
                    file: TestFile::checked_in("/t/add.c"),
                    kind: SourceKind::C,
                },
                expected: TestFile::checked_in("/t/add.exp"),
                compile: AxisEntry::untagged(""),
                execute: AxisEntry::untagged(""),
                simulate: AxisEntry::untagged("default"),
                toolchain: AxisEntry::untagged("tc"),
                tag: None,
            },
            build_log: None,
            run_output: None,
            messages,
        }
    }

    #[test]
    fn stats_aggregate_pass_and_fail() {
        let results = vec![
            result_with_messages(vec![]),
            result_with_messages(vec!["Failed to build".to_owned()]),
            result_with_messages(vec![]),
        ];
        let stats = RunStats::from_results(&results);
        assert_eq!(
            stats,
            RunStats {
                initial_run_count: 3,
                passed: 2,
                failed: 1,
            }
        );
        assert!(!stats.is_success());
        assert!((stats.pass_rate() - 66.666).abs() < 0.01);
    }

    #[test]
    fn empty_run_is_successful() {
        let stats = RunStats::from_results(&[]);
        assert!(stats.is_success());
        assert_eq!(stats.pass_rate(), 100.0);
    }

    #[test]
    fn required_simulators_dedupes() {
        let a = result_with_messages(vec![]).configuration;
        let mut b = result_with_messages(vec![]).configuration;
        b.simulate = AxisEntry::untagged("other");
        let mut c = result_with_messages(vec![]).configuration;
        c.simulate = AxisEntry::untagged("default");

        let required = required_simulators(&[a, b, c]);
        let names: Vec<_> = required.iter().map(String::as_str).collect();
        assert_eq!(names, ["default", "other"]);
    }
}
