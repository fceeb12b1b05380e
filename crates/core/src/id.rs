//! Unique identifiers for Armada entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a single orchestrator run.
///
/// Appears in workspace branch names and log spans so that concurrent
/// or repeated runs against the same repository never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a new RunId
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// A short lowercase suffix suitable for branch names.
    pub fn short(&self) -> String {
        let s = self.0.to_string().to_lowercase();
        s[s.len() - 8..].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RunId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
