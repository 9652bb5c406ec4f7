// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ExpectedError,
    output::{OutputContext, OutputOpts},
};
use camino::Utf8PathBuf;
use crosstest_runner::{
    config::{EvalContext, SimulatorRegistry, TestThreads, ToolchainRegistry},
    list::{TestFilter, TestList},
    reporter::TestReporterBuilder,
    resolve::{resolve_all, TestConfiguration},
    runner::{required_simulators, TestRunnerBuilder},
};
use indexmap::IndexMap;
use std::{
    io::{self, Write},
    time::Duration,
};
use tracing::{info, warn};

/// The axis default used when a test carries no `.toolchain` file.
const DEFAULT_TOOLCHAIN: &str = "default";

/// The axis default used when a test carries no `.sim` file.
const DEFAULT_SIMULATOR: &str = "default";

/// The conventional name of a simulator executable under `<install>/bin`.
const SIMULATOR_BINARY: &str = "sim";

/// A combinatorial build/run/compare test orchestrator.
///
/// Discovers test definitions under the given paths, expands each into the
/// cross product of its compile/execute/simulator/toolchain option axes, and
/// builds, runs, and checks every configuration in parallel.
#[derive(Debug, clap::Parser)]
#[command(version)]
pub(crate) struct CrosstestApp {
    /// Paths to search for test cases. Can be any valid path
    #[arg(value_name = "PATHS")]
    paths: Vec<Utf8PathBuf>,

    /// Project root containing the tests directory and the build tree
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    root: Utf8PathBuf,

    /// Registry directory [default: <root>/tests/config]
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<Utf8PathBuf>,

    /// Exclude tests matching PATTERN
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Exclude tests matching regex PATTERN
    #[arg(long = "exclude-regex", value_name = "PATTERN")]
    exclude_regex: Vec<String>,

    /// Number of configurations to run simultaneously [possible values:
    /// integer or "num-cpus"]
    #[arg(
        short = 'j',
        long,
        visible_alias = "test-threads",
        value_name = "N",
        default_value_t
    )]
    jobs: TestThreads,

    /// Keep files generated by running tests
    #[arg(short = 'k', long)]
    keep: bool,

    /// Per-invocation timeout for build and run subprocesses, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Only provision the simulator configurations the tests require, not
    /// every registered one
    #[arg(long)]
    no_test_build: bool,

    /// Don't run the tests, just print which configurations would have run
    #[arg(long)]
    dry_run: bool,

    /// Suppress the final summary line
    #[arg(long)]
    no_summary: bool,

    #[command(flatten)]
    output: OutputOpts,
}

impl CrosstestApp {
    pub(crate) fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub(crate) fn exec(self, output: OutputContext) -> Result<i32, ExpectedError> {
        let root = absolutize(&self.root)?;
        if output.verbose {
            info!("using project root {root}");
        }
        let primary_test_dir = root.join("tests");
        let config_dir = match &self.config_dir {
            Some(dir) => absolutize(dir)?,
            None => primary_test_dir.join("config"),
        };
        let build_root = root.join("._build");

        let mut vars = IndexMap::new();
        vars.insert("ROOT".to_owned(), root.to_string());
        vars.insert("TEST_DIR".to_owned(), primary_test_dir.to_string());
        vars.insert("CONFIG_DIR".to_owned(), config_dir.to_string());
        vars.insert("BUILD_DIR".to_owned(), build_root.to_string());

        let toolchains = ToolchainRegistry::from_file(&config_dir.join("TOOLCHAINS"), &vars)?;
        let simulators = SimulatorRegistry::from_file(
            &config_dir.join("COMPSIM"),
            &vars,
            &build_root,
            SIMULATOR_BINARY,
        )?;
        let ctx = EvalContext::new(
            toolchains,
            simulators,
            DEFAULT_TOOLCHAIN,
            DEFAULT_SIMULATOR,
            config_dir.join("DEFAULT.c"),
            build_root,
            root,
        )?;

        let mut filters: Vec<TestFilter> = self
            .exclude
            .iter()
            .map(TestFilter::substring)
            .collect();
        for pattern in &self.exclude_regex {
            filters.push(TestFilter::regex(pattern)?);
        }

        let paths = if self.paths.is_empty() {
            vec![primary_test_dir]
        } else {
            self.paths.clone()
        };
        let test_list = TestList::discover(&paths, &filters)?;
        let configurations = resolve_all(&test_list, &ctx);
        info!(
            "resolved {} configurations from {} tests",
            configurations.len(),
            test_list.len()
        );

        if self.dry_run {
            let mut stdout = io::stdout().lock();
            print_dry_run(&configurations, &mut stdout).map_err(ExpectedError::ReportWrite)?;
            return Ok(0);
        }

        let mut builder = TestRunnerBuilder::default();
        builder
            .set_test_threads(self.jobs)
            .set_keep_artifacts(self.keep)
            .set_timeout(self.timeout.map(Duration::from_secs));
        let runner = builder.build(&ctx)?;

        let required = self.no_test_build.then(|| required_simulators(&configurations));
        if runner.provision_simulators(required.as_ref()) {
            info!("provisioned all simulator configurations");
        } else {
            warn!("failed to provision some simulator configurations");
        }

        let run = runner.execute(configurations);

        let mut reporter_builder = TestReporterBuilder::default();
        reporter_builder
            .set_colorize(output.color.should_colorize(supports_color::Stream::Stdout))
            .set_hide_summary(self.no_summary);
        let reporter = reporter_builder.build();
        let mut stdout = io::stdout().lock();
        reporter
            .report(&run, &mut stdout)
            .map_err(ExpectedError::ReportWrite)?;

        if run.stats.is_success() {
            Ok(0)
        } else {
            Err(ExpectedError::TestRunFailed)
        }
    }
}

fn print_dry_run(
    configurations: &[TestConfiguration],
    writer: &mut dyn Write,
) -> io::Result<()> {
    for configuration in configurations {
        writeln!(
            writer,
            "{}: compile='{}' execute='{}' simulator='{}' toolchain='{}'",
            configuration.display_name(),
            configuration.compile.options,
            configuration.execute.options,
            configuration.simulate.options,
            configuration.toolchain.options,
        )?;
    }
    Ok(())
}

fn absolutize(path: &Utf8PathBuf) -> Result<Utf8PathBuf, ExpectedError> {
    let abs = std::path::absolute(path).map_err(|error| {
        ExpectedError::TestListCreate(crosstest_runner::errors::TestListError::Absolutize {
            path: path.clone(),
            error,
        })
    })?;
    Utf8PathBuf::try_from(abs).map_err(|error| {
        ExpectedError::TestListCreate(crosstest_runner::errors::TestListError::Absolutize {
            path: path.clone(),
            error: error.into_io_error(),
        })
    })
}
