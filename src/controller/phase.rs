use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request lifecycle phase.
///
/// Each controller method is bound to exactly one phase, and the phase decides
/// which responses are conventional for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Renders markup; side effect free
    View,
    /// Processes a state change, then answers with a View or Redirect
    Action,
    /// Serves arbitrary bytes with full control over the response
    Resource,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::View, Phase::Action, Phase::Resource];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::View => "view",
            Phase::Action => "action",
            Phase::Resource => "resource",
        }
    }

    /// Whether a content body is the conventional outcome of this phase
    #[must_use]
    pub fn renders_content(&self) -> bool {
        !matches!(self, Phase::Action)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "view" | "render" => Ok(Phase::View),
            "action" => Ok(Phase::Action),
            "resource" => Ok(Phase::Resource),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}
