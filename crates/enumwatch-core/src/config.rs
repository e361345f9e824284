#![forbid(unsafe_code)]

//! Notifier configuration.
//!
//! The only tunable today is how protocol misuse (nested `begin`, or `end`
//! without `begin`) is reported. Misuse never double-delivers and never
//! corrupts session state; the policy only decides who hears about it.
//!
//! | Policy        | Effect                                                   |
//! |---------------|----------------------------------------------------------|
//! | `Ignore`      | Silently skipped.                                        |
//! | `Warn`        | `tracing::warn!` event (default).                        |
//! | `DebugAssert` | Panics in debug builds, `Warn` behavior in release.      |
//! | `Reject`      | Returned as a [`ProtocolError`](crate::ProtocolError).   |
//!
//! All policies bump the notifier's misuse counter.

use std::env;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Environment variable consulted by [`NotifierConfig::from_env`].
pub const MISUSE_ENV_VAR: &str = "ENUMWATCH_MISUSE";

/// How protocol misuse is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MisusePolicy {
    Ignore,
    #[default]
    Warn,
    DebugAssert,
    Reject,
}

impl FromStr for MisusePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" | "off" => Ok(Self::Ignore),
            "warn" => Ok(Self::Warn),
            "assert" | "debug_assert" | "debug-assert" => Ok(Self::DebugAssert),
            "reject" | "error" => Ok(Self::Reject),
            other => Err(format!("unknown misuse policy: {other}")),
        }
    }
}

/// Configuration for a [`ChangeNotifier`](crate::ChangeNotifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NotifierConfig {
    pub misuse: MisusePolicy,
}

impl NotifierConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_misuse(mut self, misuse: MisusePolicy) -> Self {
        self.misuse = misuse;
        self
    }

    /// Defaults overridden by `ENUMWATCH_MISUSE` when it holds a known policy.
    ///
    /// Unknown values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(env::var(MISUSE_ENV_VAR).ok().as_deref())
    }

    /// Same as [`from_env`](Self::from_env) given the variable's value.
    #[must_use]
    pub fn from_env_value(misuse: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(val) = misuse {
            match val.parse() {
                Ok(policy) => config.misuse = policy,
                Err(err) => tracing::warn!(var = MISUSE_ENV_VAR, %err, "ignoring invalid value"),
            }
        }
        config
    }
}
