// Copyright (c) The crosstest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use std::{io, sync::LazyLock};
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
#[inline]
pub(crate) fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Turns a possibly-relative path into an absolute, normalized UTF-8 path.
pub(crate) fn absolutize(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    let abs = std::path::absolute(path)?;
    Utf8PathBuf::try_from(abs)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error.into_io_error()))
}

pub(crate) mod plural {
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    pub(crate) fn configurations_str(count: usize) -> &'static str {
        if count == 1 {
            "configuration"
        } else {
            "configurations"
        }
    }
}
