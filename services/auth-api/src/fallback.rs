//! Degraded-mode profiles served while the users API circuit is open.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::user::User;

static BUILTIN: Lazy<FallbackCatalog> = Lazy::new(|| {
    FallbackCatalog::from_users([
        User::new("admin", "Admin", "User", "admin"),
        User::new("johnd", "John", "Doe", "user"),
        User::new("janed", "Jane", "Doe", "user"),
    ])
});

/// Read-only mapping from username to a minimal profile.
#[derive(Debug, Clone, Default)]
pub struct FallbackCatalog {
    users: HashMap<String, User>,
}

impl FallbackCatalog {
    /// Catalog keyed by each user's username.
    pub fn from_users<I>(users: I) -> Self
    where
        I: IntoIterator<Item = User>,
    {
        Self {
            users: users
                .into_iter()
                .map(|user| (user.username.clone(), user))
                .collect(),
        }
    }

    /// The process-wide built-in catalog.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Profile for `username`, or the generic placeholder when unknown.
    #[must_use]
    pub fn lookup(&self, username: &str) -> User {
        self.users
            .get(username)
            .cloned()
            .unwrap_or_else(|| User::placeholder(username))
    }

    /// Whether a dedicated profile exists for `username`.
    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }
}
