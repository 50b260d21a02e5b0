use crate::validity::Strictness;
use serde::{Deserialize, Serialize};

/// Column at which printed field comments start.
pub const DEFAULT_COMMENT_COLUMN: usize = 38;

/// What happens to objects that referenced a removed object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Referencing fields keep the stale name and become unresolved.
    #[default]
    Detach,
    /// Objects left with an unresolved reference in a required field are
    /// removed as well, transitively.
    Cascade,
}

/// How the instance parser treats records whose type the catalog lacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTypePolicy {
    /// Fail the parse.
    Reject,
    /// Keep the raw record so it prints back unchanged.
    #[default]
    Catchall,
}

/// Runtime settings for a [`Store`](crate::store::Store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub removal_policy: RemovalPolicy,
    pub unknown_types: UnknownTypePolicy,
    /// Level used by [`Store::report`](crate::store::Store::report).
    pub default_strictness: Strictness,
    pub comment_column: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            removal_policy: RemovalPolicy::Detach,
            unknown_types: UnknownTypePolicy::Catchall,
            default_strictness: Strictness::Draft,
            comment_column: DEFAULT_COMMENT_COLUMN,
        }
    }
}
