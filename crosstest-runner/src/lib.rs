// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core functionality for [crosstest](../crosstest), a combinatorial
//! build/run/compare test orchestrator.
//!
//! A test is a base name on disk plus a handful of optional sidecar files:
//! option axes (`.compopt`, `.execopt`, `.sim`, `.toolchain`) and expected
//! output (`.exp`, `.<tag>.exp`). Each test expands into the cross product of
//! its four option axes, and every resulting configuration is built with the
//! selected toolchain, run under the selected simulator, and checked against
//! its expected output, all through a bounded parallel queue.

pub mod artifact;
pub mod config;
pub mod errors;
mod helpers;
pub mod list;
pub mod reporter;
pub mod resolve;
pub mod runner;
