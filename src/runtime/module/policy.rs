use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Governs whether and when a module may be unloaded after use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnloadPolicy {
    /// Never unloaded; required for correctness.
    NeverUnload,
    /// Shared infrastructure, kept for the life of the process.
    Core,
    /// Unloaded right after each call unless heat-protected.
    Immediate,
    /// Unloaded after sitting idle for the configured window.
    #[default]
    IdleTimeout,
}

impl UnloadPolicy {
    /// Policies that protect a module regardless of heat.
    pub fn is_pinned(self) -> bool {
        matches!(self, Self::NeverUnload | Self::Core)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeverUnload => "NEVER_UNLOAD",
            Self::Core => "CORE",
            Self::Immediate => "IMMEDIATE",
            Self::IdleTimeout => "IDLE_TIMEOUT",
        }
    }
}

impl fmt::Display for UnloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown unload policy `{0}` (expected NEVER_UNLOAD, CORE, IMMEDIATE or IDLE_TIMEOUT)")]
pub struct ParsePolicyError(pub String);

impl FromStr for UnloadPolicy {
    type Err = ParsePolicyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "NEVER_UNLOAD" => Ok(Self::NeverUnload),
            "CORE" => Ok(Self::Core),
            "IMMEDIATE" => Ok(Self::Immediate),
            "IDLE_TIMEOUT" => Ok(Self::IdleTimeout),
            _ => Err(ParsePolicyError(raw.to_string())),
        }
    }
}
