// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use crosstest_runner::errors::{
    ContextSetupError, FilterParseError, RegistryReadError, TestListError, TestRunnerBuildError,
};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;

/// An error occurred in a program that we expected to run correctly.
///
/// Errors which close out the process: carries the exit code reported to the
/// shell. Test failures exit with 1, setup and configuration errors with 2.
#[derive(Debug, Error)]
pub(crate) enum ExpectedError {
    #[error("error setting up evaluation context")]
    ContextSetup(#[from] ContextSetupError),

    #[error("error reading registry")]
    RegistryRead(#[from] RegistryReadError),

    #[error("error parsing exclusion filter")]
    FilterParse(#[from] FilterParseError),

    #[error("error discovering tests")]
    TestListCreate(#[from] TestListError),

    #[error("error building test runner")]
    TestRunnerBuild(#[from] TestRunnerBuildError),

    #[error("error writing report")]
    ReportWrite(#[source] std::io::Error),

    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub(crate) fn process_exit_code(&self) -> i32 {
        match self {
            Self::TestRunFailed => 1,
            _ => 2,
        }
    }

    /// Displays this error to stderr, along with its source chain.
    pub(crate) fn display_to_stderr(&self, styles: &StderrStyles) {
        eprintln!("{}: {self}", "error".style(styles.error));
        let mut source = self.source();
        while let Some(error) = source {
            eprintln!("{}: {error}", "  caused by".style(styles.bold));
            source = error.source();
        }
    }
}
