//! Universe types and the alias rules that tie an ear to one of them.
//!
//! Dev worlds have root aliases starting with `d`. They run locally in
//! development environments, and the same world instance can be created many
//! times, so their output is not meant for permanent storage.
//!
//! Hybrid worlds (`h`) and shadow worlds (`s`) keep their output. A shadow
//! world instance runs at most once.
//!
//! There is only one real world and its root alias is `w`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The kind of universe an ear listens to. Names parse case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum UniverseType {
    /// Local development world.
    #[default]
    Dev,
    /// Shared simulation.
    Shadow,
    /// Simulation mixed with real devices.
    Hybrid,
    /// The real world.
    Real,
}

impl UniverseType {
    /// Whether output from this universe is disposable.
    #[must_use]
    pub fn is_disposable(self) -> bool {
        matches!(self, Self::Dev)
    }
}

impl fmt::Display for UniverseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => write!(f, "Dev"),
            Self::Shadow => write!(f, "Shadow"),
            Self::Hybrid => write!(f, "Hybrid"),
            Self::Real => write!(f, "Real"),
        }
    }
}

impl FromStr for UniverseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "shadow" => Ok(Self::Shadow),
            "hybrid" => Ok(Self::Hybrid),
            "real" => Ok(Self::Real),
            other => Err(Error::config(format!("unknown universe type: {other}"))),
        }
    }
}

impl TryFrom<String> for UniverseType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// The first dot-separated word of a GNode alias.
#[must_use]
pub fn root_alias(g_node_alias: &str) -> &str {
    g_node_alias.split('.').next().unwrap_or_default()
}

/// The world alias of a world instance alias (`hw1__1` -> `hw1`).
#[must_use]
pub fn world_root(world_instance_alias: &str) -> &str {
    world_instance_alias
        .split("__")
        .next()
        .unwrap_or_default()
}

/// Check that the configured universe agrees with the ear's GNode alias.
///
/// # Errors
///
/// Returns [`Error::UnsupportedUniverse`] for the real world and
/// [`Error::UniverseMismatch`] when the alias root and universe disagree.
pub fn check_universe_type(g_node_alias: &str, universe: UniverseType) -> Result<()> {
    let root = root_alias(g_node_alias);
    if root == "w" {
        return Err(Error::UnsupportedUniverse(UniverseType::Real.to_string()));
    }

    let expected = if root.starts_with('d') {
        UniverseType::Dev
    } else if root.starts_with('h') {
        UniverseType::Hybrid
    } else if root.starts_with('s') {
        UniverseType::Shadow
    } else {
        return Err(Error::UniverseMismatch {
            universe: universe.to_string(),
            alias: g_node_alias.to_string(),
        });
    };

    if expected == universe {
        Ok(())
    } else {
        Err(Error::UniverseMismatch {
            universe: universe.to_string(),
            alias: g_node_alias.to_string(),
        })
    }
}
