use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::experiment::{Permission, UserId};

/// The user issuing a command, with whatever permissions the caller vouches for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user: UserId,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl Actor {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: UserId::new(user),
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}
