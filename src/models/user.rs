// src/models/user.rs

use serde::{Deserialize, Serialize};

/// A cached peer (§3.1). `display_name` is derived, not stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub access_token: Option<String>,
    pub is_contact: bool,
    pub is_bot: bool,
    pub is_premium: bool,
    pub fetched_at: i64,
    pub raw_payload: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// `display_name = trim(first + " " + last)` (may be null per §3.1).
    pub fn display_name(&self) -> Option<String> {
        let combined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let trimmed = combined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_user() -> User {
        User {
            id: "1".into(),
            username: None,
            first_name: None,
            last_name: None,
            phone: None,
            access_token: None,
            is_contact: false,
            is_bot: false,
            is_premium: false,
            fetched_at: 0,
            raw_payload: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn display_name_trims_and_joins() {
        let mut u = base_user();
        u.first_name = Some("Ada".into());
        u.last_name = Some("Lovelace".into());
        assert_eq!(u.display_name().as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn display_name_none_when_both_missing() {
        assert_eq!(base_user().display_name(), None);
    }

    #[test]
    fn display_name_trims_single_field() {
        let mut u = base_user();
        u.first_name = Some("Ada".into());
        assert_eq!(u.display_name().as_deref(), Some("Ada"));
    }
}
