// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later
//! Engine configuration.

#[cfg(feature = "save-state")]
use serde::{Deserialize, Serialize};

/// Tunables that don't change engine semantics but resolve an
/// undocumented hardware behavior (§9 Open Questions).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Whether a texture-matrix-stack overflow sets the sticky status
    /// bit, the same way a projection-stack overflow does. Undocumented
    /// on real hardware; default matches the projection stack.
    pub texture_stack_overflow_flagging: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        EngineConfig {
            texture_stack_overflow_flagging: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::new()
    }
}
