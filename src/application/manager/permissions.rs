//! Role and user permission tables
//!
//! Authorization is flag based. [`PermissionLevel`](crate::domain::entities::PermissionLevel)
//! only describes severity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::application::errors::PermissionError;

/// Identity that passes every check
pub const SYSTEM_USER: &str = "system";

/// Flag granting every permission
pub const ALL_PERMISSIONS: &str = "*";

/// How unknown role names are treated by `set_user_permissions`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleResolution {
    /// Unknown roles contribute no flags
    #[default]
    Lenient,
    /// Unknown roles are rejected
    Strict,
}

#[derive(Debug, Default, Deserialize)]
struct PermissionSection {
    mode: Option<RoleResolution>,
    #[serde(default)]
    roles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    users: BTreeMap<String, UserGrant>,
}

#[derive(Debug, Default, Deserialize)]
struct UserGrant {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionManager {
    roles: HashMap<String, HashSet<String>>,
    users: HashMap<String, HashSet<String>>,
    resolution: RoleResolution,
}

impl PermissionManager {
    pub fn new(resolution: RoleResolution) -> Self {
        Self {
            roles: HashMap::new(),
            users: HashMap::new(),
            resolution,
        }
    }

    /// Manager preloaded with the stock `user`, `moderator` and `admin` roles
    pub fn with_default_roles(resolution: RoleResolution) -> Self {
        let mut manager = Self::new(resolution);
        manager.define_role("user", ["commands.use"]);
        manager.define_role("moderator", ["commands.use", "messages.manage", "members.moderate"]);
        manager.define_role("admin", [ALL_PERMISSIONS]);
        manager
    }

    /// Build the table from a manager's `permissions` config section
    ///
    /// ```json
    /// { "mode": "strict",
    ///   "roles": { "banker": ["economy.transfer"] },
    ///   "users": { "42": { "roles": ["banker"], "flags": ["economy.audit"] } } }
    /// ```
    pub fn from_config(section: &Value, default_resolution: RoleResolution) -> Result<Self, PermissionError> {
        let section: PermissionSection = if section.is_null() {
            PermissionSection::default()
        } else {
            serde_json::from_value(section.clone())
                .map_err(|e| PermissionError::InvalidConfig(e.to_string()))?
        };

        let mut manager = Self::with_default_roles(section.mode.unwrap_or(default_resolution));
        for (role, flags) in &section.roles {
            manager.define_role(role, flags);
        }
        for (user, grant) in &section.users {
            manager.set_user_permissions(user, grant.roles.as_slice(), grant.flags.as_slice())?;
        }
        Ok(manager)
    }

    pub fn resolution(&self) -> RoleResolution {
        self.resolution
    }

    /// Replace a role's entire flag set
    pub fn define_role<I, S>(&mut self, name: &str, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let flags = flags.into_iter().map(|f| f.as_ref().to_string()).collect();
        self.roles.insert(name.to_string(), flags);
    }

    pub fn role(&self, name: &str) -> Option<&HashSet<String>> {
        self.roles.get(name)
    }

    /// Role names, sorted
    pub fn roles(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Replace a user's flags with the union of `roles` and `extra_flags`
    pub fn set_user_permissions<R, F>(&mut self, user_id: &str, roles: &[R], extra_flags: &[F]) -> Result<(), PermissionError>
    where
        R: AsRef<str>,
        F: AsRef<str>,
    {
        let mut flags = HashSet::new();
        for role in roles {
            let role = role.as_ref();
            match self.roles.get(role) {
                Some(role_flags) => flags.extend(role_flags.iter().cloned()),
                None if self.resolution == RoleResolution::Strict => {
                    return Err(PermissionError::UnknownRole(role.to_string()));
                }
                None => {
                    tracing::debug!(user = %user_id, role = %role, "Ignoring unknown role");
                }
            }
        }
        flags.extend(extra_flags.iter().map(|f| f.as_ref().to_string()));

        self.users.insert(user_id.to_string(), flags);
        Ok(())
    }

    pub fn remove_user(&mut self, user_id: &str) -> bool {
        self.users.remove(user_id).is_some()
    }

    pub fn user_permissions(&self, user_id: &str) -> Option<&HashSet<String>> {
        self.users.get(user_id)
    }

    pub fn has_permission(&self, user_id: &str, flag: &str) -> bool {
        if user_id == SYSTEM_USER {
            return true;
        }
        self.users
            .get(user_id)
            .map(|flags| flags.contains(flag) || flags.contains(ALL_PERMISSIONS))
            .unwrap_or(false)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, user_id: &str, flags: &[S]) -> bool {
        flags.iter().any(|f| self.has_permission(user_id, f.as_ref()))
    }

    pub fn has_all_permissions<S: AsRef<str>>(&self, user_id: &str, flags: &[S]) -> bool {
        flags.iter().all(|f| self.has_permission(user_id, f.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NONE: [&str; 0] = [];

    #[test]
    fn test_system_always_allowed_unknown_always_denied() {
        let perms = PermissionManager::with_default_roles(RoleResolution::Lenient);
        assert!(perms.has_permission(SYSTEM_USER, "anything.at.all"));
        assert!(!perms.has_permission("stranger", "commands.use"));
        assert!(!perms.has_any_permission("stranger", &["commands.use", "x"]));
    }

    #[test]
    fn test_union_of_roles_and_extras() {
        let mut perms = PermissionManager::new(RoleResolution::Lenient);
        perms.define_role("banker", ["economy.transfer", "economy.view"]);
        perms.define_role("host", ["servers.restart"]);
        perms.set_user_permissions("7", &["banker", "host"], &["economy.audit"]).unwrap();

        assert!(perms.has_all_permissions("7", &["economy.transfer", "economy.view", "servers.restart", "economy.audit"]));
        assert!(!perms.has_permission("7", "servers.delete"));
    }

    #[test]
    fn test_assignment_replaces_previous() {
        let mut perms = PermissionManager::with_default_roles(RoleResolution::Lenient);
        perms.set_user_permissions("7", &["moderator"], &NONE).unwrap();
        assert!(perms.has_permission("7", "members.moderate"));

        perms.set_user_permissions("7", &["user"], &NONE).unwrap();
        assert!(!perms.has_permission("7", "members.moderate"));
        assert!(perms.has_permission("7", "commands.use"));
    }

    #[test]
    fn test_bypass_flag() {
        let mut perms = PermissionManager::with_default_roles(RoleResolution::Lenient);
        perms.set_user_permissions("owner", &["admin"], &NONE).unwrap();
        assert!(perms.has_all_permissions("owner", &["servers.delete", "economy.reset"]));
    }

    #[test]
    fn test_define_role_replaces_flags() {
        let mut perms = PermissionManager::new(RoleResolution::Lenient);
        perms.define_role("dj", ["music.play", "music.skip"]);
        perms.define_role("dj", ["music.play"]);
        assert_eq!(perms.role("dj").map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_unknown_role_lenient_vs_strict() {
        let mut lenient = PermissionManager::new(RoleResolution::Lenient);
        lenient.set_user_permissions("1", &["ghost"], &["a"]).unwrap();
        assert!(lenient.has_permission("1", "a"));

        let mut strict = PermissionManager::with_default_roles(RoleResolution::Strict);
        strict.set_user_permissions("1", &["user"], &NONE).unwrap();
        let err = strict.set_user_permissions("1", &["ghost"], &NONE).unwrap_err();
        assert_eq!(err, PermissionError::UnknownRole("ghost".into()));
        // Prior assignment survives a rejected update
        assert!(strict.has_permission("1", "commands.use"));
    }

    #[test]
    fn test_empty_quantifiers() {
        let perms = PermissionManager::new(RoleResolution::Lenient);
        assert!(!perms.has_any_permission("1", &NONE));
        assert!(perms.has_all_permissions("1", &NONE));
    }

    #[test]
    fn test_from_config() {
        let section = json!({
            "mode": "strict",
            "roles": {"banker": ["economy.transfer"]},
            "users": {"42": {"roles": ["banker"], "flags": ["economy.audit"]}}
        });
        let perms = PermissionManager::from_config(&section, RoleResolution::Lenient).unwrap();
        assert_eq!(perms.resolution(), RoleResolution::Strict);
        assert!(perms.has_all_permissions("42", &["economy.transfer", "economy.audit"]));

        let bad = json!({"users": {"1": {"roles": ["ghost"]}}, "mode": "strict"});
        assert!(PermissionManager::from_config(&bad, RoleResolution::Lenient).is_err());
        assert!(PermissionManager::from_config(&json!({"roles": 5}), RoleResolution::Lenient).is_err());
    }
}
