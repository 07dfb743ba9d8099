//! Caller identity
//!
//! Authentication happens outside this crate. Callers hand the engine the
//! authenticated user as an [`Actor`]; the engine only checks the role.

use serde::{Deserialize, Serialize};

/// Approver name recorded when the acting user has no display name
pub const FALLBACK_APPROVER: &str = "Admin";

/// User role as issued by the authentication layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Staff,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    /// Whether this role may approve or reject workflow stages
    pub fn can_decide(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }
}

/// The authenticated user on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    /// Name written into `approved_by`
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() { FALLBACK_APPROVER } else { name }
    }
}
