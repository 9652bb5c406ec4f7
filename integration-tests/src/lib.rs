// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for the end-to-end tests.
//!
//! Real toolchains and simulators are too heavy for the test suite, so the
//! tests stand up shell-script stand-ins whose output is a pure function of
//! their inputs.

use camino::Utf8Path;
use std::{fs, io};

/// A stand-in compiler driver.
///
/// Invoked as `<opts...> <source> -o <output>`: copies the source to the
/// output and appends the option string as a final line, so the "executable"
/// records exactly which compile options built it. A `-bad` option makes the
/// build fail after writing partial output, like a compiler dying mid-link.
pub const FAKE_COMPILER: &str = r#"#!/bin/sh
out=""
src=""
opts=""
while [ $# -gt 0 ]; do
    if [ "$1" = "-o" ]; then
        shift
        out="$1"
    else
        if [ -n "$src" ]; then
            opts="${opts:+$opts }$src"
        fi
        src="$1"
    fi
    shift
done
case " $opts " in
    *" -bad "*)
        printf 'partial\n' > "$out"
        echo "unrecognized option '-bad'" >&2
        exit 1
        ;;
esac
cp "$src" "$out"
if [ -n "$opts" ]; then
    printf '%s\n' "$opts" >> "$out"
fi
"#;

/// A stand-in simulator.
///
/// Invoked as `<program> <args...>`: prints the program file followed by one
/// line per argument.
pub const FAKE_SIMULATOR: &str = r#"#!/bin/sh
exe="$1"
shift
cat "$exe"
for arg in "$@"; do
    printf '%s\n' "$arg"
done
"#;

/// Writes `contents` to `path` and marks it executable.
pub fn write_script(path: &Utf8Path, contents: &str) -> io::Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
