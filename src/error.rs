// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later
//! Errors raised at the one genuinely fallible boundary of this crate:
//! save-state I/O (§7). The core engine itself is total and never
//! returns a `Result`.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    #[snafu(display("failed to write save state to {path:?}"))]
    FailedWriteFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read save state from {path:?}"))]
    FailedReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to encode save state"))]
    FailedEncode { source: bincode::Error },

    #[snafu(display("failed to decode save state"))]
    FailedDecode { source: bincode::Error },
}
