//! Action Space
//!
//! The three discrete actions the tabular agent chooses between.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

/// Number of discrete actions
pub const NUM_ACTIONS: usize = 3;

/// Discrete trading action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Action {
    /// Go (or stay) long
    Long = 0,
    /// Go (or stay) short
    Short = 1,
    /// Do nothing
    Hold = 2,
}

impl Action {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Long),
            1 => Some(Self::Short),
            2 => Some(Self::Hold),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Get all possible actions
    pub fn all() -> &'static [Action] {
        &[Self::Long, Self::Short, Self::Hold]
    }

    /// Directional side of the action, `None` for hold
    pub fn as_side(&self) -> Option<Side> {
        match self {
            Self::Long => Some(Side::Long),
            Self::Short => Some(Side::Short),
            Self::Hold => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Hold => "hold",
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::Hold
    }
}

impl From<Side> for Action {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Action::Long,
            Side::Short => Action::Short,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_index_roundtrip() {
        for action in Action::all() {
            let recovered = Action::from_index(action.to_index()).unwrap();
            assert_eq!(*action, recovered);
        }
        assert_eq!(Action::from_index(NUM_ACTIONS), None);
    }

    #[test]
    fn test_hold_has_no_side() {
        assert_eq!(Action::Hold.as_side(), None);
        assert_eq!(Action::from(Side::Short).as_side(), Some(Side::Short));
    }
}
