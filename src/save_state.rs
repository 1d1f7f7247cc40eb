// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later
//! Versioned save-state serialization (C10, §6 "Persisted state", §4.12).
//!
//! No teacher precedent exists for this surface; grounded on the
//! teacher's `snafu`-derived error style (`error.rs`) plus `serde` and
//! `bincode` for the versioned binary encoding itself.

use std::io::{Read, Write};
use std::path::Path;

use snafu::ResultExt;

use crate::engine::Engine;
use crate::error::{EngineError, FailedDecodeSnafu, FailedEncodeSnafu, FailedReadFileSnafu, FailedWriteFileSnafu};

/// Current on-disk format version. Version 4 added lighting caches so
/// they need not be regenerated on load; this crate only ever writes the
/// current version but accepts anything older.
pub const CURRENT_VERSION: u32 = 4;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SaveStateV4 {
    engine: Engine,
}

impl Engine {
    pub fn save_to_writer<W: Write>(&self, mut writer: W) -> Result<(), EngineError> {
        let payload = SaveStateV4 { engine: self.clone() };
        let encoded = bincode::serialize(&payload).context(FailedEncodeSnafu)?;

        writer
            .write_all(&CURRENT_VERSION.to_le_bytes())
            .and_then(|_| writer.write_all(&encoded))
            .context(FailedWriteFileSnafu { path: Path::new("<writer>") })?;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).context(FailedWriteFileSnafu { path })?;
        self.save_to_writer(file)
    }

    pub fn load_from_reader<R: Read>(mut reader: R) -> Result<Engine, EngineError> {
        let mut version_bytes = [0u8; 4];
        reader
            .read_exact(&mut version_bytes)
            .context(FailedReadFileSnafu { path: Path::new("<reader>") })?;
        let version = u32::from_le_bytes(version_bytes);

        let mut rest = Vec::new();
        reader
            .read_to_end(&mut rest)
            .context(FailedReadFileSnafu { path: Path::new("<reader>") })?;

        let mut engine: Engine = bincode::deserialize(&rest)
            .map(|s: SaveStateV4| s.engine)
            .context(FailedDecodeSnafu)?;

        if version < CURRENT_VERSION {
            #[cfg(feature = "tracing")]
            tracing::info!(version, "regenerating lighting caches for older save state");
            engine.regenerate_lighting_caches();
        }

        Ok(engine)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Engine, EngineError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).context(FailedReadFileSnafu { path })?;
        Engine::load_from_reader(file)
    }
}
