// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The final pass/fail report.

use crate::{
    helpers::plural,
    runner::{RunResults, TestResult},
};
use owo_colors::{OwoColorize, Style};
use std::io;

/// Reporter options.
#[derive(Debug, Default)]
pub struct TestReporterBuilder {
    colorize: bool,
    hide_summary: bool,
}

impl TestReporterBuilder {
    /// Enables colored output.
    pub fn set_colorize(&mut self, colorize: bool) -> &mut Self {
        self.colorize = colorize;
        self
    }

    /// Suppresses the aggregate summary line.
    pub fn set_hide_summary(&mut self, hide_summary: bool) -> &mut Self {
        self.hide_summary = hide_summary;
        self
    }

    /// Creates a new reporter.
    pub fn build(self) -> TestReporter {
        let mut styles = Styles::default();
        if self.colorize {
            styles.colorize();
        }
        TestReporter {
            styles,
            hide_summary: self.hide_summary,
        }
    }
}

/// Writes the name-sorted report and the aggregate summary.
#[derive(Debug)]
pub struct TestReporter {
    styles: Styles,
    hide_summary: bool,
}

impl TestReporter {
    /// Writes one line per result, sorted by name, followed by the summary.
    pub fn report(&self, run: &RunResults, writer: &mut dyn io::Write) -> io::Result<()> {
        for result in &run.results {
            self.report_result(result, writer)?;
        }
        if !self.hide_summary {
            let stats = run.stats;
            writeln!(
                writer,
                "\nPassed {}/{} {} ({:.2}%)",
                stats.passed.style(self.styles.count),
                stats.initial_run_count.style(self.styles.count),
                plural::configurations_str(stats.initial_run_count),
                stats.pass_rate(),
            )?;
        }
        Ok(())
    }

    fn report_result(&self, result: &TestResult, writer: &mut dyn io::Write) -> io::Result<()> {
        if result.is_success() {
            writeln!(
                writer,
                "{}: {}",
                result.display_name(),
                "Passed".style(self.styles.pass)
            )
        } else {
            writeln!(
                writer,
                "{}: {} - {}",
                result.display_name(),
                "Failed".style(self.styles.fail),
                result.messages.join("; ")
            )
        }
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifact::TestFile,
        config::AxisEntry,
        list::TestName,
        resolve::{SourceFile, SourceKind, TestConfiguration},
        runner::RunStats,
    };
    use pretty_assertions::assert_eq;

    fn result(name: &str, messages: Vec<String>) -> TestResult {
        TestResult {
            configuration: TestConfiguration {
                test_name: TestName::new(format!("/t/{name}")),
                source: SourceFile {
                    file: TestFile::checked_in(format!("/t/{name}.c")),
                    kind: SourceKind::C,
                },
                expected: TestFile::checked_in(format!("/t/{name}.exp")),
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
    fn report_lists_results_and_summary() {
        let results = vec![
            result("add", vec![]),
            result("loop", vec!["Output did not match".to_owned()]),
        ];
        let stats = RunStats {
            initial_run_count: 2,
            passed: 1,
            failed: 1,
        };
        let run = RunResults { results, stats };

        let reporter = TestReporterBuilder::default().build();
        let mut out = Vec::new();
        reporter.report(&run, &mut out).expect("report written");
        let out = String::from_utf8(out).expect("utf-8 output");
        assert_eq!(
            out,
            "/t/add: Passed\n\
             /t/loop: Failed - Output did not match\n\
             \nPassed 1/2 configurations (50.00%)\n"
        );
    }

    #[test]
    fn summary_can_be_hidden() {
        let run = RunResults {
            results: vec![result("add", vec![])],
            stats: RunStats {
                initial_run_count: 1,
                passed: 1,
                failed: 0,
            },
        };
        let mut builder = TestReporterBuilder::default();
        builder.set_hide_summary(true);
        let reporter = builder.build();

        let mut out = Vec::new();
        reporter.report(&run, &mut out).expect("report written");
        let out = String::from_utf8(out).expect("utf-8 output");
        assert_eq!(out, "/t/add: Passed\n");
    }
}
