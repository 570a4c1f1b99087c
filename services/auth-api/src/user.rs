//! User profile record as served by the users API.

use serde::{Deserialize, Serialize};

/// Role assigned to regular accounts and to placeholder profiles.
pub const DEFAULT_ROLE: &str = "user";

/// A resolved user profile. The username is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name
    pub username: String,
    /// Given name
    #[serde(rename = "firstname")]
    pub first_name: String,
    /// Family name
    #[serde(rename = "lastname")]
    pub last_name: String,
    /// Role, e.g. `admin` or `user`
    pub role: String,
}

impl User {
    /// Creates a new profile.
    pub fn new(
        username: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role: role.into(),
        }
    }

    /// Generic profile for a username with no known attributes.
    pub fn placeholder(username: impl Into<String>) -> Self {
        Self::new(username, "Unknown", "User", DEFAULT_ROLE)
    }

    /// Whether this profile carries the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let user = User::new("johnd", "John", "Doe", "user");
        let json = serde_json::to_value(&user).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "username": "johnd",
                "firstname": "John",
                "lastname": "Doe",
                "role": "user",
            })
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let body = r#"{"id":7,"username":"admin","firstname":"Admin","lastname":"User","role":"admin"}"#;
        let user: User = serde_json::from_str(body).unwrap();

        assert_eq!(user, User::new("admin", "Admin", "User", "admin"));
        assert!(user.is_admin());
    }

    #[test]
    fn test_decode_requires_all_fields() {
        let body = r#"{"username":"admin","firstname":"Admin"}"#;
        assert!(serde_json::from_str::<User>(body).is_err());
    }

    #[test]
    fn test_placeholder() {
        let user = User::placeholder("ghost");
        assert_eq!(user.first_name, "Unknown");
        assert_eq!(user.last_name, "User");
        assert_eq!(user.role, DEFAULT_ROLE);
        assert!(!user.is_admin());
    }
}
