use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

/// Authenticated principal embedded in every session token.
///
/// The role is a snapshot taken when the token was issued; later role
/// changes only take effect once a new token is issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: i64,
    pub role: String,
}

impl Identity {
    pub fn new(subject_id: i64, role: impl Into<String>) -> Self {
        Self {
            subject_id,
            role: role.into(),
        }
    }

    /// True when the identity carries one of the roles in `roles`.
    pub fn has_any_role(&self, roles: &RoleSet) -> bool {
        roles.contains(&self.role)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.role.is_empty() {
            write!(f, "subject {}", self.subject_id)
        } else {
            write!(f, "subject {} ({})", self.subject_id, self.role)
        }
    }
}

/// Well-known role names managed by administrators.
pub mod roles {
    pub const SUPERADMIN: &str = "SUPERADMIN";
    pub const ADMIN: &str = "ADMIN";
}

/// Static set of roles a route group requires. Matching is exact on the
/// role name; an empty set admits nobody.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, role: &str) -> bool {
        !role.is_empty() && self.0.contains(role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
