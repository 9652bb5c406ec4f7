// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registries, option axes, and the read-only evaluation context.
//!
//! Registry files use a `NAME = value` line format with `#` comments and
//! `$(VAR)` substitution against a caller-supplied variable map. Option axis
//! files use one `options[ # tag]` entry per line.

use crate::{
    errors::{ConfigResolveError, ContextSetupError, RegistryReadError, TestThreadsParseError},
    helpers::get_num_cpus,
    list::TestName,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::{fmt, fs, str::FromStr, sync::LazyLock};
use tracing::warn;

static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(([A-Za-z0-9_]+)\)").expect("variable regex is valid"));

/// Parses a `NAME = value` registry file.
///
/// `$(VAR)` references in values are resolved against `vars`. A malformed
/// line or an unknown variable abandons that line only: it is logged and the
/// remaining lines are still parsed.
pub fn parse_variable_file(
    path: &Utf8Path,
    vars: &IndexMap<String, String>,
) -> Result<IndexMap<String, String>, RegistryReadError> {
    let contents = fs::read_to_string(path).map_err(|error| RegistryReadError {
        path: path.to_owned(),
        error,
    })?;

    let mut entries = IndexMap::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, value) = match line.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (line, ""),
        };
        if name.is_empty() {
            warn!(line = idx + 1, file = %path, "invalid registry line `{line}`");
            continue;
        }

        let mut unknown_var = None;
        let value = VAR_REGEX.replace_all(value, |captures: &Captures<'_>| {
            let var_name = &captures[1];
            match vars.get(var_name) {
                Some(substitution) => substitution.clone(),
                None => {
                    unknown_var = Some(var_name.to_owned());
                    String::new()
                }
            }
        });
        if let Some(var_name) = unknown_var {
            warn!(
                line = idx + 1,
                file = %path,
                "unknown variable name `{var_name}`"
            );
            continue;
        }

        entries.insert(name.to_owned(), value.into_owned());
    }
    Ok(entries)
}

/// The toolchain registry: name → install directory.
///
/// A toolchain install tree is expected to carry its tools under `bin/`, with
/// the compiler driver distinguishable by a conventional name suffix.
#[derive(Clone, Debug, Default)]
pub struct ToolchainRegistry {
    install_dirs: IndexMap<String, Utf8PathBuf>,
}

impl ToolchainRegistry {
    /// Loads the registry from a `NAME = path` file.
    pub fn from_file(
        path: &Utf8Path,
        vars: &IndexMap<String, String>,
    ) -> Result<Self, RegistryReadError> {
        let install_dirs = parse_variable_file(path, vars)?
            .into_iter()
            .map(|(name, dir)| (name, Utf8PathBuf::from(dir)))
            .collect();
        Ok(Self { install_dirs })
    }

    /// Adds a toolchain to the registry.
    pub fn add(&mut self, name: impl Into<String>, install_dir: impl Into<Utf8PathBuf>) {
        self.install_dirs.insert(name.into(), install_dir.into());
    }

    /// Looks up a toolchain's install directory.
    pub fn install_dir(&self, name: &str) -> Option<&Utf8Path> {
        self.install_dirs.get(name).map(Utf8PathBuf::as_path)
    }

    /// Finds the first tool under `<install>/bin` whose file name ends with
    /// `suffix`.
    pub fn find_tool(&self, name: &str, suffix: &str) -> Option<Utf8PathBuf> {
        let bin_dir = self.install_dir(name)?.join("bin");
        let entries = bin_dir.read_dir_utf8().ok()?;
        let mut tools: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.file_name()
                    .is_some_and(|file_name| file_name.ends_with(suffix))
            })
            .collect();
        tools.sort();
        tools.into_iter().next()
    }
}

/// The simulator registry: name → build command, with install directories
/// derived from the build root.
#[derive(Clone, Debug)]
pub struct SimulatorRegistry {
    build_commands: IndexMap<String, String>,
    build_root: Utf8PathBuf,
    binary_name: String,
}

impl SimulatorRegistry {
    /// Creates an empty registry rooted at `build_root`, with simulator
    /// executables expected at `<install>/bin/<binary_name>`.
    pub fn new(build_root: impl Into<Utf8PathBuf>, binary_name: impl Into<String>) -> Self {
        Self {
            build_commands: IndexMap::new(),
            build_root: build_root.into(),
            binary_name: binary_name.into(),
        }
    }

    /// Loads the registry from a `NAME = build command` file.
    pub fn from_file(
        path: &Utf8Path,
        vars: &IndexMap<String, String>,
        build_root: impl Into<Utf8PathBuf>,
        binary_name: impl Into<String>,
    ) -> Result<Self, RegistryReadError> {
        let mut registry = Self::new(build_root, binary_name);
        registry.build_commands = parse_variable_file(path, vars)?;
        Ok(registry)
    }

    /// Adds a simulator configuration to the registry.
    pub fn add(&mut self, name: impl Into<String>, build_command: impl Into<String>) {
        self.build_commands.insert(name.into(), build_command.into());
    }

    /// All registered configuration names.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.build_commands.keys().map(String::as_str)
    }

    /// Whether `name` is a registered configuration.
    pub fn contains(&self, name: &str) -> bool {
        self.build_commands.contains_key(name)
    }

    /// The build command for a configuration.
    pub fn build_command(&self, name: &str) -> Option<&str> {
        self.build_commands.get(name).map(String::as_str)
    }

    /// The install directory a configuration is provisioned into.
    pub fn install_dir(&self, name: &str) -> Utf8PathBuf {
        self.build_root.join(name)
    }

    /// The conventional path of a configuration's simulator executable.
    pub fn executable(&self, name: &str) -> Utf8PathBuf {
        self.install_dir(name).join("bin").join(&self.binary_name)
    }
}

/// The process-wide evaluation context.
///
/// Built once at startup and shared by reference into discovery, resolution,
/// and the runner; never mutated afterwards.
#[derive(Clone, Debug)]
pub struct EvalContext {
    /// The toolchain registry.
    pub toolchains: ToolchainRegistry,
    /// The simulator registry.
    pub simulators: SimulatorRegistry,
    /// The toolchain axis default.
    pub default_toolchain: String,
    /// The simulator axis default.
    pub default_simulator: String,
    /// Fixture copied when a test has no source file of its own.
    pub default_source: Utf8PathBuf,
    /// The directory simulator configurations are provisioned into.
    pub build_root: Utf8PathBuf,
    /// The directory provisioning build commands run in.
    pub project_root: Utf8PathBuf,
}

impl EvalContext {
    /// Creates the context, creating the build root directory.
    ///
    /// Failure to create the build root is fatal to startup.
    pub fn new(
        toolchains: ToolchainRegistry,
        simulators: SimulatorRegistry,
        default_toolchain: impl Into<String>,
        default_simulator: impl Into<String>,
        default_source: impl Into<Utf8PathBuf>,
        build_root: impl Into<Utf8PathBuf>,
        project_root: impl Into<Utf8PathBuf>,
    ) -> Result<Self, ContextSetupError> {
        let build_root = build_root.into();
        fs::create_dir_all(&build_root).map_err(|error| ContextSetupError::CreateWorkDir {
            path: build_root.clone(),
            error,
        })?;
        Ok(Self {
            toolchains,
            simulators,
            default_toolchain: default_toolchain.into(),
            default_simulator: default_simulator.into(),
            default_source: default_source.into(),
            build_root,
            project_root: project_root.into(),
        })
    }
}

/// One of the four independent option axes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AxisKind {
    /// Flags passed to the compiler.
    Compile,
    /// Arguments passed to the simulated program.
    Execute,
    /// Which simulator configuration runs the program.
    Simulate,
    /// Which toolchain builds the program.
    Toolchain,
}

impl AxisKind {
    /// The sidecar file extension for this axis.
    pub fn extension(self) -> &'static str {
        match self {
            AxisKind::Compile => "compopt",
            AxisKind::Execute => "execopt",
            AxisKind::Simulate => "sim",
            AxisKind::Toolchain => "toolchain",
        }
    }

    /// The synthetic entry used when the axis file is absent.
    ///
    /// The simulate and toolchain axes select *which tool* runs rather than
    /// flags to one tool, so their defaults are the context's named defaults
    /// rather than an empty option string.
    pub fn default_options(self, ctx: &EvalContext) -> String {
        match self {
            AxisKind::Compile | AxisKind::Execute => String::new(),
            AxisKind::Simulate => ctx.default_simulator.clone(),
            AxisKind::Toolchain => ctx.default_toolchain.clone(),
        }
    }
}

/// One entry of an option axis: an option string plus an optional subtest
/// tag.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AxisEntry {
    /// The literal option string passed to the downstream tool.
    pub options: String,
    /// The subtest tag selecting an alternate expected-output file.
    pub tag: Option<String>,
}

impl AxisEntry {
    /// Creates an entry with no tag.
    pub fn untagged(options: impl Into<String>) -> Self {
        Self {
            options: options.into(),
            tag: None,
        }
    }

    /// Parses one axis file line: `options[ # tag]`.
    ///
    /// Returns `None` for blank lines. An empty tag after trimming counts as
    /// no tag.
    fn parse_line(line: &str) -> Option<Self> {
        let (options, tag) = match line.split_once('#') {
            Some((options, tag)) => (options.trim(), Some(tag.trim())),
            None => (line.trim(), None),
        };
        if options.is_empty() && tag.is_none() {
            return None;
        }
        let tag = tag.filter(|tag| !tag.is_empty()).map(str::to_owned);
        Some(Self {
            options: options.to_owned(),
            tag,
        })
    }
}

/// Loads one option axis for a test.
///
/// If `<test>.<axis ext>` exists it is parsed line by line; otherwise a
/// single synthetic default entry is returned.
pub fn load_axis(
    test_name: &TestName,
    kind: AxisKind,
    ctx: &EvalContext,
) -> Result<Vec<AxisEntry>, ConfigResolveError> {
    let path = test_name.with_extension(kind.extension());
    if !path.is_file() {
        return Ok(vec![AxisEntry::untagged(kind.default_options(ctx))]);
    }

    let contents = fs::read_to_string(&path)
        .map_err(|error| ConfigResolveError::Read { path, error })?;
    Ok(contents.lines().filter_map(AxisEntry::parse_line).collect())
}

/// Type for the `--jobs` value: how many configurations run at once.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// Run with a specified number of workers.
    Count(usize),

    /// Run with a number of workers equal to the logical CPU count.
    NumCpus,
}

impl TestThreads {
    /// Gets the actual number of workers computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => get_num_cpus(),
        }
    }
}

impl Default for TestThreads {
    fn default() -> Self {
        Self::NumCpus
    }
}

impl FromStr for TestThreads {
    type Err = TestThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        match s.parse::<isize>() {
            Err(e) => Err(TestThreadsParseError::new(format!(
                "Error: {e} parsing {s}"
            ))),
            Ok(0) => Err(TestThreadsParseError::new("jobs may not be 0")),
            Ok(j) if j < 0 => Ok(TestThreads::Count(
                (get_num_cpus() as isize + j).max(1) as usize,
            )),
            Ok(j) => Ok(TestThreads::Count(j as usize)),
        }
    }
}

impl fmt::Display for TestThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(threads) => write!(f, "{threads}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}
