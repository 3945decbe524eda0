use serde::{Deserialize, Serialize};

/// Asks whether `user` holds `permission`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CheckPermissionRequest {
    /// User being checked.
    pub user: String,

    /// Permission name. `None` checks general staff access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

impl CheckPermissionRequest {
    /// General access check for `user`.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            permission: None,
        }
    }

    /// Narrows the check to one permission.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }
}

/// Outcome of a permission check.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CheckPermissionResponse {
    /// Whether the user is allowed.
    pub allowed: bool,
}
