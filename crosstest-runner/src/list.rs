// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test discovery.
//!
//! A test is identified by its *test name*: the absolute directory plus base
//! name, with no extension. Any file matching the test filename grammar
//! (`add.c`, `add.exp`, `add.fast.exp`, `add.compopt`, ...) contributes its
//! base name, and multiple sidecar files of one test collapse into a single
//! entry. Directories containing a `SKIP` marker are pruned wholesale.

use crate::{
    artifact::GENERATED_PREFIX,
    errors::{FilterParseError, TestListError},
    helpers::{absolutize, plural},
};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::{collections::BTreeSet, sync::LazyLock};
use tracing::debug;

/// File name of the marker that excludes a directory subtree from discovery.
pub const SKIP_MARKER: &str = "SKIP";

/// Extensions recognized as source files, in resolution order.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cpp", "cc", "s", "asm"];

/// The test filename grammar.
///
/// Matches `<name>.<sourceExt>`, `<name>.exp`, `<name>.<tag>.exp`, and the
/// four axis files. The name group is lazy so that a tagged expected file
/// contributes the base name, not `name.tag`.
static TEST_FILE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?<name>.+?)\.(?:(?:(?<tag>[A-Za-z0-9_\-]+)\.)?exp|c|cpp|cc|s|asm|compopt|execopt|sim|toolchain)$",
    )
    .expect("test filename regex is valid")
});

/// The canonical identity of one logical test: directory + base name, no
/// extension.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TestName {
    path: Utf8PathBuf,
}

impl TestName {
    /// Creates a test name from a directory + base path.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The directory containing the test's files.
    pub fn dir(&self) -> &Utf8Path {
        self.path.parent().unwrap_or(Utf8Path::new(""))
    }

    /// The base name, without directory or extension.
    pub fn base(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }

    /// The full directory + base path.
    pub fn as_path(&self) -> &Utf8Path {
        &self.path
    }

    /// The path of a sidecar file: `<dir>/<base>.<ext>`.
    pub fn with_extension(&self, ext: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.{ext}", self.path))
    }
}

impl std::fmt::Display for TestName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// An exclusion filter applied to candidate test files during discovery.
#[derive(Clone, Debug)]
pub enum TestFilter {
    /// Excludes any path containing this substring.
    Substring(String),
    /// Excludes any path matching this regex.
    Regex(Regex),
}

impl TestFilter {
    /// Creates a substring filter.
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self::Substring(pattern.into())
    }

    /// Creates a regex filter.
    pub fn regex(pattern: &str) -> Result<Self, FilterParseError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|error| FilterParseError {
                pattern: pattern.to_owned(),
                error: Box::new(error),
            })
    }

    fn is_match(&self, haystack: &str) -> bool {
        match self {
            Self::Substring(pattern) => haystack.contains(pattern.as_str()),
            Self::Regex(regex) => regex.is_match(haystack),
        }
    }
}

/// The set of unique test names found under the input paths.
#[derive(Clone, Debug)]
pub struct TestList {
    test_names: BTreeSet<TestName>,
}

impl TestList {
    /// Discovers tests under each input path.
    ///
    /// A path that is itself a test-qualifying file contributes its test name
    /// directly; a directory is walked depth-first. Files matching any
    /// exclusion filter are skipped, as are directories carrying a
    /// [`SKIP_MARKER`] file. A nonexistent input path is a fatal error.
    pub fn discover(
        paths: &[Utf8PathBuf],
        exclude: &[TestFilter],
    ) -> Result<Self, TestListError> {
        let mut test_names = BTreeSet::new();
        for path in paths {
            let path = absolutize(path).map_err(|error| TestListError::Absolutize {
                path: path.clone(),
                error,
            })?;
            if path.is_file() {
                if let Some(test_name) = test_name_of(&path, exclude) {
                    test_names.insert(test_name);
                }
            } else if path.is_dir() {
                walk_dir(&path, exclude, &mut test_names)?;
            } else {
                return Err(TestListError::PathDoesNotExist { path });
            }
        }
        debug!(
            "discovered {} {}",
            test_names.len(),
            plural::tests_str(test_names.len())
        );
        Ok(Self { test_names })
    }

    /// Iterates over the discovered test names, in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &TestName> + '_ {
        self.test_names.iter()
    }

    /// The number of discovered tests.
    pub fn len(&self) -> usize {
        self.test_names.len()
    }

    /// Whether no tests were discovered.
    pub fn is_empty(&self) -> bool {
        self.test_names.is_empty()
    }
}

fn walk_dir(
    dir: &Utf8Path,
    exclude: &[TestFilter],
    test_names: &mut BTreeSet<TestName>,
) -> Result<(), TestListError> {
    if dir.join(SKIP_MARKER).exists() {
        debug!(dir = %dir, "skipping directory with SKIP marker");
        return Ok(());
    }

    let entries = dir.read_dir_utf8().map_err(|error| TestListError::ReadDir {
        path: dir.to_owned(),
        error,
    })?;
    for entry in entries {
        let entry = entry.map_err(|error| TestListError::ReadDir {
            path: dir.to_owned(),
            error,
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(path, exclude, test_names)?;
        } else if let Some(test_name) = test_name_of(path, exclude) {
            test_names.insert(test_name);
        }
    }
    Ok(())
}

/// Classifies a file against the test filename grammar, returning the test
/// name it contributes, if any.
///
/// Files carrying the generated prefix are never test-qualifying, so
/// artifacts left over from a `--keep` run are invisible to rediscovery.
fn test_name_of(path: &Utf8Path, exclude: &[TestFilter]) -> Option<TestName> {
    if exclude.iter().any(|filter| filter.is_match(path.as_str())) {
        return None;
    }

    let file_name = path.file_name()?;
    if file_name.starts_with(GENERATED_PREFIX) {
        return None;
    }

    let captures = TEST_FILE_REGEX.captures(file_name)?;
    let base = captures.name("name").expect("name group always captures");
    let dir = path.parent().unwrap_or(Utf8Path::new(""));
    Some(TestName::new(dir.join(base.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("add.c", Some("add"); "c source")]
    #[test_case("add.cpp", Some("add"); "cpp source")]
    #[test_case("add.cc", Some("add"); "cc source")]
    #[test_case("add.s", Some("add"); "assembly source")]
    #[test_case("add.asm", Some("add"); "asm source")]
    #[test_case("add.exp", Some("add"); "default expected")]
    #[test_case("add.fast.exp", Some("add"); "tagged expected")]
    #[test_case("add.compopt", Some("add"); "compile options")]
    #[test_case("add.execopt", Some("add"); "execute options")]
    #[test_case("add.sim", Some("add"); "simulator selection")]
    #[test_case("add.toolchain", Some("add"); "toolchain selection")]
    #[test_case("my.test.c", Some("my.test"); "dotted base name")]
    #[test_case("add.rs", None; "unrecognized extension")]
    #[test_case("add", None; "no extension")]
    #[test_case("._add.000000000000feed.out", None; "generated artifact")]
    #[test_case("._add.c", None; "generated source")]
    fn filename_grammar(file_name: &str, expected_base: Option<&str>) {
        let path = Utf8PathBuf::from("/suite").join(file_name);
        let test_name = test_name_of(&path, &[]);
        assert_eq!(
            test_name.as_ref().map(|t| t.base()),
            expected_base,
            "classifying {file_name}"
        );
    }

    #[test]
    fn sidecar_files_collapse_to_one_test() {
        let dir = tempdir().expect("created tempdir");
        for name in ["add.c", "add.exp", "add.fast.exp", "add.compopt"] {
            std::fs::write(dir.path().join(name), "").expect("wrote file");
        }
        let list = TestList::discover(&[dir.path().to_owned()], &[]).expect("discovered");
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().expect("one test").base(), "add");
    }

    #[test]
    fn skip_marker_prunes_subtree() {
        let dir = tempdir().expect("created tempdir");
        let skipped = dir.path().join("skipped");
        let nested = skipped.join("nested");
        std::fs::create_dir_all(&nested).expect("created dirs");
        std::fs::write(skipped.join(SKIP_MARKER), "").expect("wrote marker");
        std::fs::write(skipped.join("a.c"), "").expect("wrote file");
        std::fs::write(nested.join("b.c"), "").expect("wrote file");
        std::fs::write(dir.path().join("kept.c"), "").expect("wrote file");

        let list = TestList::discover(&[dir.path().to_owned()], &[]).expect("discovered");
        let names: Vec<_> = list.iter().map(|t| t.base().to_owned()).collect();
        assert_eq!(names, ["kept"]);
    }

    #[test]
    fn exclusion_filters_apply() {
        let dir = tempdir().expect("created tempdir");
        std::fs::write(dir.path().join("slow_mul.c"), "").expect("wrote file");
        std::fs::write(dir.path().join("add.c"), "").expect("wrote file");

        let filters = [TestFilter::substring("slow")];
        let list = TestList::discover(&[dir.path().to_owned()], &filters).expect("discovered");
        let names: Vec<_> = list.iter().map(|t| t.base().to_owned()).collect();
        assert_eq!(names, ["add"]);

        let filters = [TestFilter::regex("a.d").expect("valid regex")];
        let list = TestList::discover(&[dir.path().to_owned()], &filters).expect("discovered");
        let names: Vec<_> = list.iter().map(|t| t.base().to_owned()).collect();
        assert_eq!(names, ["slow_mul"]);
    }

    #[test]
    fn single_file_path_contributes_directly() {
        let dir = tempdir().expect("created tempdir");
        let file = dir.path().join("add.c");
        std::fs::write(&file, "").expect("wrote file");

        let list = TestList::discover(&[file], &[]).expect("discovered");
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn missing_path_is_fatal() {
        let err = TestList::discover(&[Utf8PathBuf::from("/does/not/exist")], &[])
            .expect_err("missing path");
        assert!(matches!(err, TestListError::PathDoesNotExist { .. }));
    }
}
