use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Lifecycle of one worker generation.
///
/// ```text
/// Parsed -> Installing -> Installed -> Activating -> Activated
///     \__________\____________\____________\___________\--> Redundant
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Superseded by a newer generation, or failed to install.
    Redundant,
}

impl LifecycleState {
    /// Whether fetch events are intercepted in this state.
    pub fn is_serving(&self) -> bool {
        matches!(self, LifecycleState::Activated)
    }

    fn successor(&self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Parsed => Some(LifecycleState::Installing),
            LifecycleState::Installing => Some(LifecycleState::Installed),
            LifecycleState::Installed => Some(LifecycleState::Activating),
            LifecycleState::Activating => Some(LifecycleState::Activated),
            LifecycleState::Activated | LifecycleState::Redundant => None,
        }
    }

    /// Advance one step, or fail if `self` is not `from`.
    pub fn advance(&mut self, from: LifecycleState) -> Result<LifecycleState> {
        if *self != from {
            return Err(CacheError::InvalidState {
                expected: from,
                actual: *self,
            });
        }
        let next = self.successor().ok_or(CacheError::InvalidState {
            expected: from,
            actual: *self,
        })?;
        *self = next;
        Ok(next)
    }
}
