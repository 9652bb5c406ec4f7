// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by crosstest.

use camino::Utf8PathBuf;
use std::io;
use thiserror::Error;

/// An error that occurred while reading a registry file (`TOOLCHAINS` or
/// `COMPSIM`).
///
/// Malformed lines and unresolved `$(VAR)` references inside a registry file
/// are not errors: they are logged and skipped, line by line.
#[derive(Debug, Error)]
#[error("failed to read registry file `{path}`")]
pub struct RegistryReadError {
    pub(crate) path: Utf8PathBuf,
    #[source]
    pub(crate) error: io::Error,
}

/// An error that occurred while setting up the evaluation context.
#[derive(Debug, Error)]
pub enum ContextSetupError {
    /// The artifact working directory could not be created.
    #[error("failed to create working directory `{path}`")]
    CreateWorkDir {
        /// The working directory.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A registry file could not be read.
    #[error(transparent)]
    RegistryRead(#[from] RegistryReadError),
}

/// An error that occurred while discovering tests.
#[derive(Debug, Error)]
pub enum TestListError {
    /// An input path does not exist.
    #[error("input path `{path}` does not exist")]
    PathDoesNotExist {
        /// The missing path.
        path: Utf8PathBuf,
    },

    /// An input path could not be made absolute.
    #[error("failed to canonicalize input path `{path}`")]
    Absolutize {
        /// The input path.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A directory could not be read during the walk.
    #[error("failed to read directory `{path}`")]
    ReadDir {
        /// The directory that failed to read.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while building an exclusion filter.
#[derive(Debug, Error)]
#[error("invalid exclusion regex `{pattern}`")]
pub struct FilterParseError {
    pub(crate) pattern: String,
    #[source]
    pub(crate) error: Box<regex::Error>,
}

/// An error that occurred while creating a generated artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The file to seed the artifact from does not exist.
    #[error("copy source `{path}` does not exist")]
    CopySourceMissing {
        /// The missing seed file.
        path: Utf8PathBuf,
    },

    /// An I/O error occurred while writing the artifact.
    #[error("failed to write generated file `{path}`")]
    Write {
        /// The artifact path.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while resolving a single test into its
/// configurations.
///
/// These errors are fatal to the affected test only: the scheduler logs them
/// and proceeds with the remaining tests.
#[derive(Debug, Error)]
pub enum ConfigResolveError {
    /// More than one candidate source file exists for the test.
    #[error("too many source files for `{test_name}`: {}", .found.join(", "))]
    TooManySources {
        /// The affected test.
        test_name: String,
        /// All candidate source files found.
        found: Vec<String>,
    },

    /// An option line references a subtest tag with no matching `.<tag>.exp`
    /// file.
    #[error("no expected output for tag `{tag}` of `{test_name}`")]
    UnresolvedTag {
        /// The affected test.
        test_name: String,
        /// The unresolved tag.
        tag: String,
    },

    /// An axis or expected-output file could not be read.
    #[error("failed to read `{path}`")]
    Read {
        /// The unreadable file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A generated file (default source or default expected output) could not
    /// be synthesized.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// An error that occurred while parsing a `--jobs` value.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct TestThreadsParseError {
    pub(crate) message: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An error that occurred while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
pub enum TestRunnerBuildError {
    /// The tokio runtime failed to start.
    #[error("error creating tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),
}
