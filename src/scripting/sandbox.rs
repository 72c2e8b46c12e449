/// `scripting/sandbox.rs` — Lua sandbox restrictions per worker
///
/// Every worker VM is created with a restricted set of standard libraries.
/// Dangerous libraries (os, io, package) are omitted by default; the
/// coroutine library is always present because the scheduler depends on it.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};
use serde::{Deserialize, Serialize};

/// Controls which Lua standard libraries are available to a worker VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Default: string, table, math, coroutine — no I/O or OS
    Basic,
    /// Basic + io (for reading files in a scoped path)
    FileRead,
    /// Full standard library — only for trusted scripts
    Elevated,
}

impl Default for TrustLevel {
    fn default() -> Self {
        Self::Basic
    }
}

/// Creates a new Lua VM exposing only the libraries `trust` allows.
pub fn create_sandboxed_vm(trust: TrustLevel) -> LuaResult<Lua> {
    let mut libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE;

    if trust == TrustLevel::FileRead || trust == TrustLevel::Elevated {
        libs |= StdLib::IO;
    }

    if trust == TrustLevel::Elevated {
        libs |= StdLib::OS | StdLib::PACKAGE;
    }

    Lua::new_with(libs, LuaOptions::default())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
