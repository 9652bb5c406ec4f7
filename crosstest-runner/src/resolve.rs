// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expansion of discovered tests into runnable configurations.
//!
//! Each test's four option axes are crossed into the full product, identical
//! tuples collapse into one, and every tuple is bound to its expected-output
//! file. A tuple may carry at most one
//! subtest tag across its four entries: a single tag selects the tagged
//! expected file, no tags select the default, and tuples with two or more
//! tags are discarded as invalid combinations.

use crate::{
    artifact::TestFile,
    config::{load_axis, AxisEntry, AxisKind, EvalContext},
    errors::ConfigResolveError,
    list::{TestList, TestName, SOURCE_EXTENSIONS},
};
use camino::Utf8Path;
use indexmap::{IndexMap, IndexSet};
use itertools::iproduct;
use tracing::{debug, error};
use xxhash_rust::xxh3::Xxh3;

/// How a source file is turned into an executable.
///
/// Dispatch point for per-language build strategies. All kinds currently
/// share the toolchain's compiler driver, which handles assembly inputs too.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SourceKind {
    /// A C source file.
    C,
    /// A C++ source file.
    Cpp,
    /// An assembly source file.
    Assembly,
}

impl SourceKind {
    /// Classifies a source file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "c" => Some(Self::C),
            "cpp" | "cc" => Some(Self::Cpp),
            "s" | "asm" => Some(Self::Assembly),
            _ => None,
        }
    }

    /// The file name suffix of the toolchain tool that builds this kind.
    pub fn tool_suffix(self) -> &'static str {
        // The compiler driver assembles and links as well.
        match self {
            Self::C | Self::Cpp | Self::Assembly => "-g++",
        }
    }
}

/// The single source file of a test.
#[derive(Clone, Debug)]
pub struct SourceFile {
    /// The file handle; generated if the source was synthesized.
    pub file: TestFile,
    /// The build strategy for this source.
    pub kind: SourceKind,
}

/// One runnable element of a test's configuration matrix.
#[derive(Clone, Debug)]
pub struct TestConfiguration {
    /// The test this configuration belongs to.
    pub test_name: TestName,
    /// The source file shared by all configurations of the test.
    pub source: SourceFile,
    /// The expected-output file this configuration is checked against.
    pub expected: TestFile,
    /// Compile axis entry.
    pub compile: AxisEntry,
    /// Execute axis entry.
    pub execute: AxisEntry,
    /// Simulate axis entry.
    pub simulate: AxisEntry,
    /// Toolchain axis entry.
    pub toolchain: AxisEntry,
    /// The single subtest tag carried by the four entries, if any.
    pub tag: Option<String>,
}

impl TestConfiguration {
    /// The reporting name: the test name, qualified with the subtest tag when
    /// one is present.
    pub fn display_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}.{tag}", self.test_name),
            None => self.test_name.to_string(),
        }
    }

    /// A stable fingerprint of the four option strings and the subtest tag.
    ///
    /// Artifact paths fold this in, making artifact identity a pure function
    /// of the full configuration rather than just the test name. Two
    /// configurations of one test can therefore build and run fully
    /// independently.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for axis in [&self.compile, &self.execute, &self.simulate, &self.toolchain] {
            hasher.update(axis.options.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(self.tag.as_deref().unwrap_or("").as_bytes());
        hasher.digest()
    }
}

/// The loaded option axes of one test.
#[derive(Clone, Debug)]
pub struct TestAxes {
    /// Compile axis entries.
    pub compile: Vec<AxisEntry>,
    /// Execute axis entries.
    pub execute: Vec<AxisEntry>,
    /// Simulate axis entries.
    pub simulate: Vec<AxisEntry>,
    /// Toolchain axis entries.
    pub toolchain: Vec<AxisEntry>,
}

impl TestAxes {
    /// Loads all four axes for a test.
    pub fn load(test_name: &TestName, ctx: &EvalContext) -> Result<Self, ConfigResolveError> {
        Ok(Self {
            compile: load_axis(test_name, AxisKind::Compile, ctx)?,
            execute: load_axis(test_name, AxisKind::Execute, ctx)?,
            simulate: load_axis(test_name, AxisKind::Simulate, ctx)?,
            toolchain: load_axis(test_name, AxisKind::Toolchain, ctx)?,
        })
    }
}

/// Resolves every test in the list, logging and skipping tests whose
/// resolution fails.
///
/// Per-test resolution errors (too many sources, unresolved tags) never
/// abort the run as a whole.
pub fn resolve_all(list: &TestList, ctx: &EvalContext) -> Vec<TestConfiguration> {
    let mut configurations = Vec::new();
    for test_name in list.iter() {
        match resolve_test(test_name, ctx) {
            Ok(mut resolved) => configurations.append(&mut resolved),
            Err(err) => error!(test = %test_name, "failed to resolve test: {err}"),
        }
    }
    configurations
}

/// Resolves one test into its full set of runnable configurations.
pub fn resolve_test(
    test_name: &TestName,
    ctx: &EvalContext,
) -> Result<Vec<TestConfiguration>, ConfigResolveError> {
    let source = resolve_source(test_name, ctx)?;
    let expected = discover_expected(test_name)?;
    let axes = TestAxes::load(test_name, ctx)?;

    let mut configurations = Vec::new();
    let mut seen = IndexSet::new();
    for (compile, execute, simulate, toolchain) in
        iproduct!(&axes.compile, &axes.execute, &axes.simulate, &axes.toolchain)
    {
        // Duplicate axis lines make identical tuples whose derived artifact
        // paths would collide; only the first one runs.
        if !seen.insert((compile, execute, simulate, toolchain)) {
            continue;
        }

        let mut tags = [compile, execute, simulate, toolchain]
            .into_iter()
            .filter_map(|entry| entry.tag.as_deref());
        let tag = tags.next();
        if tags.next().is_some() {
            // More than one axis entry names a subtest: not a runnable
            // combination.
            continue;
        }

        let bound_expected = match tag {
            None => expected.default.clone(),
            Some(tag) => expected
                .tagged
                .get(tag)
                .ok_or_else(|| ConfigResolveError::UnresolvedTag {
                    test_name: test_name.to_string(),
                    tag: tag.to_owned(),
                })?
                .clone(),
        };

        configurations.push(TestConfiguration {
            test_name: test_name.clone(),
            source: source.clone(),
            expected: bound_expected,
            compile: compile.clone(),
            execute: execute.clone(),
            simulate: simulate.clone(),
            toolchain: toolchain.clone(),
            tag: tag.map(str::to_owned),
        });
    }

    debug!(
        test = %test_name,
        count = configurations.len(),
        "resolved configurations"
    );
    Ok(configurations)
}

/// The expected-output files of one test: the default plus any tagged
/// variants.
struct ExpectedFiles {
    default: TestFile,
    tagged: IndexMap<String, TestFile>,
}

/// Resolves the single source file of a test.
///
/// Zero candidates synthesize a copy of the context's default source; two or
/// more candidates are a configuration error.
fn resolve_source(
    test_name: &TestName,
    ctx: &EvalContext,
) -> Result<SourceFile, ConfigResolveError> {
    let candidates: Vec<_> = SOURCE_EXTENSIONS
        .iter()
        .map(|ext| test_name.with_extension(ext))
        .filter(|path| path.is_file())
        .collect();

    match candidates.as_slice() {
        [] => {
            let ext = ctx.default_source.extension().unwrap_or("c");
            let kind = SourceKind::from_extension(ext).unwrap_or(SourceKind::C);
            let file = TestFile::create(
                &test_name.with_extension(ext),
                Some(&ctx.default_source),
                "",
            )?;
            Ok(SourceFile { file, kind })
        }
        [path] => {
            let kind = path
                .extension()
                .and_then(SourceKind::from_extension)
                .expect("candidates are filtered by source extension");
            Ok(SourceFile {
                file: TestFile::checked_in(path.clone()),
                kind,
            })
        }
        _ => Err(ConfigResolveError::TooManySources {
            test_name: test_name.to_string(),
            found: candidates.iter().map(|p| p.to_string()).collect(),
        }),
    }
}

/// Finds the default and tagged expected-output files of a test.
///
/// A missing default is synthesized as an empty generated file.
fn discover_expected(test_name: &TestName) -> Result<ExpectedFiles, ConfigResolveError> {
    let default_path = test_name.with_extension("exp");
    let default = if default_path.is_file() {
        TestFile::checked_in(default_path)
    } else {
        TestFile::create(&default_path, None, "")?
    };

    let mut tagged = IndexMap::new();
    let entries = test_name
        .dir()
        .read_dir_utf8()
        .map_err(|error| ConfigResolveError::Read {
            path: test_name.dir().to_owned(),
            error,
        })?;
    for entry in entries {
        let entry = entry.map_err(|error| ConfigResolveError::Read {
            path: test_name.dir().to_owned(),
            error,
        })?;
        if let Some(tag) = tag_of_expected(entry.path(), test_name.base()) {
            tagged.insert(tag, TestFile::checked_in(entry.path().to_owned()));
        }
    }
    Ok(ExpectedFiles { default, tagged })
}

/// Extracts `<tag>` if `path` is `<base>.<tag>.exp` for this test.
fn tag_of_expected(path: &Utf8Path, base: &str) -> Option<String> {
    let file_name = path.file_name()?;
    let rest = file_name.strip_prefix(base)?.strip_prefix('.')?;
    let tag = rest.strip_suffix(".exp")?;
    if tag.is_empty() || tag.contains('.') {
        return None;
    }
    Some(tag.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimulatorRegistry, ToolchainRegistry};
    use camino::Utf8Path;
    use camino_tempfile::tempdir;
    use pretty_assertions::assert_eq;

    fn test_context(dir: &Utf8Path) -> EvalContext {
        let default_source = dir.join("DEFAULT.c");
        std::fs::write(&default_source, "int main() { return 0; }\n")
            .expect("wrote default source");
        EvalContext::new(
            ToolchainRegistry::default(),
            SimulatorRegistry::new(dir.join("build"), "sim"),
            "default-tc",
            "default-sim",
            default_source,
            dir.join("build"),
            dir.to_owned(),
        )
        .expect("created context")
    }

    #[test]
    fn zero_sources_synthesizes_default() {
        let dir = tempdir().expect("created tempdir");
        let ctx = test_context(dir.path());
        let test_name = TestName::new(dir.path().join("fresh"));
        std::fs::write(test_name.with_extension("exp"), "").expect("wrote exp");

        let configs = resolve_test(&test_name, &ctx).expect("resolved");
        assert_eq!(configs.len(), 1);
        let source = &configs[0].source;
        assert!(source.file.is_generated());
        assert_eq!(source.file.path().file_name(), Some("._fresh.c"));
        assert!(source.file.path().is_file());
    }

    #[test]
    fn two_sources_is_an_error() {
        let dir = tempdir().expect("created tempdir");
        let ctx = test_context(dir.path());
        let test_name = TestName::new(dir.path().join("dup"));
        std::fs::write(test_name.with_extension("c"), "").expect("wrote source");
        std::fs::write(test_name.with_extension("s"), "").expect("wrote source");

        let err = resolve_test(&test_name, &ctx).expect_err("too many sources");
        assert!(matches!(err, ConfigResolveError::TooManySources { .. }));
    }

    #[test]
    fn cross_product_counts_and_tag_binding() {
        let dir = tempdir().expect("created tempdir");
        let ctx = test_context(dir.path());
        let test_name = TestName::new(dir.path().join("loop"));
        std::fs::write(test_name.with_extension("c"), "").expect("wrote source");
        std::fs::write(test_name.with_extension("exp"), "base").expect("wrote exp");
        std::fs::write(dir.path().join("loop.fast.exp"), "fast").expect("wrote exp");
        std::fs::write(test_name.with_extension("compopt"), "-O0\n-O2 # fast\n")
            .expect("wrote compopt");
        std::fs::write(test_name.with_extension("execopt"), "\n--trace # fast\n")
            .expect("wrote execopt");

        // compile has 2 entries (one tagged), execute has 1 tagged entry.
        // Cross product is 2; the (tagged, tagged) tuple is discarded.
        let configs = resolve_test(&test_name, &ctx).expect("resolved");
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].compile.options, "-O0");
        assert_eq!(configs[0].tag.as_deref(), Some("fast"));
        assert_eq!(
            configs[0].expected.path().file_name(),
            Some("loop.fast.exp")
        );
    }

    #[test]
    fn scenario_b_two_configurations() {
        let dir = tempdir().expect("created tempdir");
        let ctx = test_context(dir.path());
        let test_name = TestName::new(dir.path().join("loop"));
        std::fs::write(test_name.with_extension("c"), "").expect("wrote source");
        std::fs::write(test_name.with_extension("exp"), "base").expect("wrote exp");
        std::fs::write(dir.path().join("loop.fast.exp"), "fast").expect("wrote exp");
        std::fs::write(test_name.with_extension("compopt"), "-O0\n-O2 # fast\n")
            .expect("wrote compopt");

        let configs = resolve_test(&test_name, &ctx).expect("resolved");
        assert_eq!(configs.len(), 2);

        let untagged = &configs[0];
        assert_eq!(untagged.compile.options, "-O0");
        assert_eq!(untagged.expected.path().file_name(), Some("loop.exp"));
        assert_eq!(untagged.display_name(), test_name.to_string());

        let tagged = &configs[1];
        assert_eq!(tagged.compile.options, "-O2");
        assert_eq!(tagged.expected.path().file_name(), Some("loop.fast.exp"));
        assert_eq!(tagged.display_name(), format!("{test_name}.fast"));

        // The two configurations must never collide on artifacts.
        assert_ne!(untagged.fingerprint(), tagged.fingerprint());
    }

    #[test]
    fn duplicate_axis_lines_collapse_to_one_configuration() {
        let dir = tempdir().expect("created tempdir");
        let ctx = test_context(dir.path());
        let test_name = TestName::new(dir.path().join("dup"));
        std::fs::write(test_name.with_extension("c"), "").expect("wrote source");
        std::fs::write(test_name.with_extension("exp"), "").expect("wrote exp");
        std::fs::write(test_name.with_extension("compopt"), "-O0\n-O0\n")
            .expect("wrote compopt");
        std::fs::write(test_name.with_extension("execopt"), "--trace\n--trace\n")
            .expect("wrote execopt");

        // Equal tuples would share a fingerprint and therefore derived
        // artifact paths; only distinct tuples may run.
        let configs = resolve_test(&test_name, &ctx).expect("resolved");
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].compile.options, "-O0");
        assert_eq!(configs[0].execute.options, "--trace");
    }

    #[test]
    fn unresolved_tag_is_an_error() {
        let dir = tempdir().expect("created tempdir");
        let ctx = test_context(dir.path());
        let test_name = TestName::new(dir.path().join("loop"));
        std::fs::write(test_name.with_extension("c"), "").expect("wrote source");
        std::fs::write(test_name.with_extension("compopt"), "-O2 # missing\n")
            .expect("wrote compopt");

        let err = resolve_test(&test_name, &ctx).expect_err("unresolved tag");
        assert!(matches!(
            err,
            ConfigResolveError::UnresolvedTag { ref tag, .. } if tag == "missing"
        ));
    }

    #[test]
    fn missing_default_expected_is_synthesized() {
        let dir = tempdir().expect("created tempdir");
        let ctx = test_context(dir.path());
        let test_name = TestName::new(dir.path().join("quiet"));
        std::fs::write(test_name.with_extension("c"), "").expect("wrote source");

        let configs = resolve_test(&test_name, &ctx).expect("resolved");
        assert_eq!(configs.len(), 1);
        assert!(configs[0].expected.is_generated());
        assert_eq!(configs[0].expected.path().file_name(), Some("._quiet.exp"));
    }

    #[test]
    fn fingerprint_is_stable() {
        let dir = tempdir().expect("created tempdir");
        let ctx = test_context(dir.path());
        let test_name = TestName::new(dir.path().join("add"));
        std::fs::write(test_name.with_extension("c"), "").expect("wrote source");
        std::fs::write(test_name.with_extension("exp"), "").expect("wrote exp");

        let first = resolve_test(&test_name, &ctx).expect("resolved");
        let second = resolve_test(&test_name, &ctx).expect("resolved");
        assert_eq!(first[0].fingerprint(), second[0].fingerprint());
    }
}
