use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered severity levels
///
/// Levels are informational only. Authorization is decided by flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    None,
    User,
    Moderator,
    Admin,
    Owner,
    System,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::User => "user",
            PermissionLevel::Moderator => "moderator",
            PermissionLevel::Admin => "admin",
            PermissionLevel::Owner => "owner",
            PermissionLevel::System => "system",
        }
    }

    /// All levels, lowest first
    pub fn all() -> [PermissionLevel; 6] {
        [
            PermissionLevel::None,
            PermissionLevel::User,
            PermissionLevel::Moderator,
            PermissionLevel::Admin,
            PermissionLevel::Owner,
            PermissionLevel::System,
        ]
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionLevel::all()
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown permission level '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(PermissionLevel::None < PermissionLevel::User);
        assert!(PermissionLevel::Moderator < PermissionLevel::Admin);
        assert_eq!(PermissionLevel::default(), PermissionLevel::None);
        assert!(PermissionLevel::Owner < PermissionLevel::System);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!("Admin".parse::<PermissionLevel>(), Ok(PermissionLevel::Admin));
        assert!("root".parse::<PermissionLevel>().is_err());
    }
}
