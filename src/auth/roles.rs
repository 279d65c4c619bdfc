use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// User role. Immutable after account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Reader,
    Author,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reader => f.write_str("reader"),
            Role::Author => f.write_str("author"),
            Role::Admin => f.write_str("admin"),
        }
    }
}

/// Named permission granted by a role. Capability sets are additive:
/// author extends reader, admin extends author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Browse,
    Download,
    Upload,
    EditOwn,
    DeleteOwn,
    EditAny,
    DeleteAny,
    ManageUsers,
}

impl Role {
    pub fn grants(self, cap: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Reader => matches!(cap, Browse | Download),
            Role::Author => matches!(cap, Browse | Download | Upload | EditOwn | DeleteOwn),
            Role::Admin => true,
        }
    }

    /// Central authorization gate for mutating operations. Deny by default.
    pub fn require(self, cap: Capability) -> Result<(), AppError> {
        if self.grants(cap) {
            Ok(())
        } else {
            Err(AppError::Authorization(
                "You do not have permission to perform this action",
            ))
        }
    }

    /// Ownership-scoped gate: the owner needs `own`, everyone else `any`.
    pub fn require_owned(
        self,
        is_owner: bool,
        own: Capability,
        any: Capability,
    ) -> Result<(), AppError> {
        if is_owner {
            self.require(own)
        } else {
            self.require(any)
        }
    }
}
