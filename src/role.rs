//! Identity of the two runtimes evaluating the same graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which runtime a value, lease or writer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeRole {
    /// Browser-embedded runtime used for live editing
    Frontend,
    /// Unattended server runtime, the default lease holder
    Backend,
}

impl fmt::Display for RuntimeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeRole::Frontend => write!(f, "frontend"),
            RuntimeRole::Backend => write!(f, "backend"),
        }
    }
}
