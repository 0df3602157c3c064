//! Known store backends and their yield-point limits.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Per-backend batch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendProfile {
    /// Maximum number of operations between two yield points, `None` for no
    /// yield points at all.
    pub max_operations_per_yield_point: Option<NonZeroUsize>,
}

const FOUR_HUNDRED_NINETY_NINE: NonZeroUsize = match NonZeroUsize::new(499) {
    Some(n) => n,
    None => unreachable!(),
};

impl BackendProfile {
    /// Calendar provider: no limit on operations per yield point.
    pub const CALENDAR: BackendProfile = BackendProfile {
        max_operations_per_yield_point: None,
    };

    /// Contacts provider: rejects more than 499 operations without a yield point.
    pub const CONTACTS: BackendProfile = BackendProfile {
        max_operations_per_yield_point: Some(FOUR_HUNDRED_NINETY_NINE),
    };

    /// tasks.org / OpenTasks task providers.
    pub const TASKS: BackendProfile = BackendProfile {
        max_operations_per_yield_point: Some(FOUR_HUNDRED_NINETY_NINE),
    };

    /// Profile without yield points, for stores with no known limit.
    pub const GENERIC: BackendProfile = BackendProfile {
        max_operations_per_yield_point: None,
    };

    pub fn with_yield_point_every(operations: usize) -> Self {
        BackendProfile {
            max_operations_per_yield_point: NonZeroUsize::new(operations),
        }
    }

    pub fn from_name(name: &str) -> ConfigResult<Self> {
        match name {
            "calendar" => Ok(Self::CALENDAR),
            "contacts" => Ok(Self::CONTACTS),
            "tasks" => Ok(Self::TASKS),
            "generic" => Ok(Self::GENERIC),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }

    /// Whether the operation at 1-based position `position` of a sub-batch
    /// gets a yield point.
    pub fn is_yield_point(&self, position: usize) -> bool {
        self.max_operations_per_yield_point
            .is_some_and(|max| position % max.get() == 0)
    }
}

impl Default for BackendProfile {
    fn default() -> Self {
        Self::GENERIC
    }
}
