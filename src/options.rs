//! Decompiler options catalogue and the mutable per-coordinator options map.
//!
//! Values are strings throughout, matching what the decompile engine expects;
//! the catalogue carries the type only for validation and display. One entry,
//! `decompiletimeout`, is consumed by the coordinator alone and is stripped
//! from the payload sent to the execution unit.

use anyhow::{Result, bail};
use serde::Serialize;
use std::collections::BTreeMap;

pub const TIMEOUT_KEY: &str = "decompiletimeout";
pub const DEFAULT_TIMEOUT_MS: u64 = 15000;

/// Keys understood only by the coordinator, never forwarded to the worker.
const COORDINATOR_ONLY_KEYS: [&str; 1] = [TIMEOUT_KEY];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Bool,
    Troolean,
    Int,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionSpec {
    pub key: &'static str,
    pub kind: OptionKind,
    pub default: &'static str,
    pub description: &'static str,
}

/// Fixed, ordered list of recognized options.
pub fn catalogue() -> &'static [OptionSpec] {
    const CATALOGUE: &[OptionSpec] = &[
        OptionSpec {
            key: "aexagg",
            kind: OptionKind::Troolean,
            default: "neither",
            description: "Try to extend and merge exceptions more aggressively",
        },
        OptionSpec {
            key: "arrayiter",
            kind: OptionKind::Troolean,
            default: "true",
            description: "Re-sugar array based iteration",
        },
        OptionSpec {
            key: "collectioniter",
            kind: OptionKind::Troolean,
            default: "true",
            description: "Re-sugar collection based iteration",
        },
        OptionSpec {
            key: "decodeenumswitch",
            kind: OptionKind::Troolean,
            default: "true",
            description: "Re-sugar switch on enum",
        },
        OptionSpec {
            key: "decodestringswitch",
            kind: OptionKind::Troolean,
            default: "true",
            description: "Re-sugar switch on String",
        },
        OptionSpec {
            key: "innerclasses",
            kind: OptionKind::Troolean,
            default: "true",
            description: "Decompile inner classes",
        },
        OptionSpec {
            key: "sugarenums",
            kind: OptionKind::Troolean,
            default: "true",
            description: "Re-sugar enums",
        },
        OptionSpec {
            key: "removeboilerplate",
            kind: OptionKind::Troolean,
            default: "true",
            description: "Remove boilerplate functions (constructor boilerplate, lambda deserialization)",
        },
        OptionSpec {
            key: "hideutf",
            kind: OptionKind::Bool,
            default: "true",
            description: "Hide UTF8 characters - quote them instead of showing the raw characters",
        },
        OptionSpec {
            key: "hidelongstrings",
            kind: OptionKind::Bool,
            default: "false",
            description: "Hide very long strings - useful if obfuscators have placed fake code in strings",
        },
        OptionSpec {
            key: "commentmonitors",
            kind: OptionKind::Bool,
            default: "false",
            description: "Replace monitors with comments - useful if we're completely confused",
        },
        OptionSpec {
            key: "lenient",
            kind: OptionKind::Bool,
            default: "false",
            description: "Be a bit more lenient in situations where we'd normally throw an exception",
        },
        OptionSpec {
            key: "recover",
            kind: OptionKind::Bool,
            default: "true",
            description: "Allow more and more aggressive fallbacks if decompilation fails",
        },
        OptionSpec {
            key: "showversion",
            kind: OptionKind::Bool,
            default: "true",
            description: "Show the decompiler name and version in the header comment",
        },
        OptionSpec {
            key: TIMEOUT_KEY,
            kind: OptionKind::Int,
            default: "15000",
            description: "Per-request decompilation timeout in milliseconds (coordinator-side)",
        },
    ];
    CATALOGUE
}

pub fn default_options() -> BTreeMap<String, String> {
    catalogue()
        .iter()
        .map(|spec| (spec.key.to_string(), spec.default.to_string()))
        .collect()
}

/// Merges `overrides` into `options` key-for-key; keys absent from
/// `overrides` are left untouched.
pub fn merge_options(options: &mut BTreeMap<String, String>, overrides: &BTreeMap<String, String>) {
    for (key, value) in overrides {
        options.insert(key.clone(), value.clone());
    }
}

/// Copy of the options with coordinator-only keys stripped, suitable for a
/// worker payload.
pub fn worker_payload(options: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut payload = options.clone();
    for key in COORDINATOR_ONLY_KEYS {
        payload.remove(key);
    }
    payload
}

pub fn timeout_ms(options: &BTreeMap<String, String>) -> u64 {
    options
        .get(TIMEOUT_KEY)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_MS)
}

/// Validates one `key=value` override against the catalogue. Used by the CLI
/// so typos surface before a request is dispatched.
pub fn validate_override(key: &str, value: &str) -> Result<()> {
    let Some(spec) = catalogue().iter().find(|spec| spec.key == key) else {
        bail!("Unknown option: {key} (see `jarview options` for the catalogue)");
    };

    let valid = match spec.kind {
        OptionKind::Bool => matches!(value, "true" | "false"),
        OptionKind::Troolean => matches!(value, "true" | "false" | "neither"),
        OptionKind::Int => value.trim().parse::<i64>().is_ok(),
    };
    if !valid {
        bail!("Invalid value for {key}: {value:?} (expected {:?})", spec.kind);
    }
    Ok(())
}
