// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Naming and lifecycle of generated files.
//!
//! Everything a test run writes to disk (synthesized sources, build logs,
//! executables, captured run output) goes through this module. Generated
//! files carry the reserved [`GENERATED_PREFIX`] in their file name so they
//! are distinguishable from checked-in fixtures, are invisible to test
//! discovery, and are safe to delete.

use crate::{errors::ArtifactError, list::TestName};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs, io::Write};
use tracing::{debug, warn};

/// The reserved file name prefix marking a file as generated.
pub const GENERATED_PREFIX: &str = "._";

/// The kind of ephemeral artifact a pipeline run produces.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ArtifactKind {
    /// The built executable.
    Executable,
    /// Captured compiler output.
    BuildLog,
    /// Captured simulator output.
    RunOutput,
}

impl ArtifactKind {
    /// The file name suffix for this kind of artifact.
    pub fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Executable => "out",
            ArtifactKind::BuildLog => "build",
            ArtifactKind::RunOutput => "output",
        }
    }
}

/// A handle to a file that is either checked in (source, expected output) or
/// generated by a test run.
///
/// Only generated files are ever removed by [`clean`](Self::clean).
#[derive(Clone, Debug)]
pub struct TestFile {
    path: Utf8PathBuf,
    generated: bool,
}

impl TestFile {
    /// Wraps a checked-in file. `clean` on the returned handle is a no-op.
    pub fn checked_in(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            generated: false,
        }
    }

    /// Wraps a path a pipeline run is about to write. The file need not exist
    /// yet; it is removed by `clean` once it does.
    pub fn generated(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            generated: true,
        }
    }

    /// Derives the path of a per-configuration artifact.
    ///
    /// The path lands in the test's own directory, prefixed with
    /// [`GENERATED_PREFIX`], with the configuration fingerprint folded in
    /// before the kind suffix. Two configurations of the same test therefore
    /// never collide, and the mapping is deterministic: equal inputs always
    /// produce an equal path.
    pub fn derive(test_name: &TestName, kind: ArtifactKind, fingerprint: u64) -> Utf8PathBuf {
        test_name.dir().join(format!(
            "{GENERATED_PREFIX}{base}.{fingerprint:016x}.{suffix}",
            base = test_name.base(),
            suffix = kind.suffix(),
        ))
    }

    /// Prefixes the file name portion of `path` with [`GENERATED_PREFIX`].
    pub fn prefix_generated(path: &Utf8Path) -> Utf8PathBuf {
        let base = path.file_name().unwrap_or_default();
        match path.parent() {
            Some(dir) => dir.join(format!("{GENERATED_PREFIX}{base}")),
            None => format!("{GENERATED_PREFIX}{base}").into(),
        }
    }

    /// Creates a generated file, optionally seeded from `copy_from`, with
    /// `append` written after the seeded content.
    ///
    /// The file name is prefixed with [`GENERATED_PREFIX`]; used to
    /// synthesize a default source or an empty default expected-output file.
    pub fn create(
        path: &Utf8Path,
        copy_from: Option<&Utf8Path>,
        append: &str,
    ) -> Result<Self, ArtifactError> {
        let path = Self::prefix_generated(path);

        let mut file = fs::File::create(&path).map_err(|error| ArtifactError::Write {
            path: path.clone(),
            error,
        })?;
        if let Some(copy_from) = copy_from {
            if !copy_from.is_file() {
                return Err(ArtifactError::CopySourceMissing {
                    path: copy_from.to_owned(),
                });
            }
            let contents = fs::read(copy_from).map_err(|error| ArtifactError::Write {
                path: copy_from.to_owned(),
                error,
            })?;
            file.write_all(&contents)
                .map_err(|error| ArtifactError::Write {
                    path: path.clone(),
                    error,
                })?;
        }
        file.write_all(append.as_bytes())
            .map_err(|error| ArtifactError::Write {
                path: path.clone(),
                error,
            })?;

        debug!(path = %path, "created generated file");
        Ok(Self {
            path,
            generated: true,
        })
    }

    /// The path of this file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Whether this file was generated by a test run.
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Removes the file if it is generated and still exists.
    ///
    /// Idempotent: cleaning a checked-in file or an already-removed artifact
    /// is a no-op, and removal errors are logged rather than raised.
    pub fn clean(&self) {
        if !self.generated || !self.path.is_file() {
            return;
        }
        if let Err(error) = fs::remove_file(&self.path) {
            warn!(path = %self.path, %error, "failed to remove generated file");
        }
    }
}
