use std::collections::BTreeSet;
use std::sync::Arc;

use crate::authz::adapter::PolicyAdapter;
use crate::authz::errors::AuthzError;
use crate::authz::types::{
    Permission, PolicyFilter, PolicyLoader, PolicyRule, GROUPING_PTYPE, PERMISSION_PTYPE,
};

/// Bootstrap permission set installed by `import_default_policies`.
pub const DEFAULT_POLICIES: &[(&str, &str, &str)] = &[
    ("admin", "*", "*"),
    ("editor", "catalog", "read"),
    ("editor", "catalog", "write"),
    ("editor", "promotions", "read"),
    ("viewer", "catalog", "read"),
];

/// Role and permission management over a `PolicyAdapter`.
///
/// Roles are not stored on their own: a role exists while at least one `p`
/// rule names it in `v0`, and users hold roles through `g` rules.
#[derive(Clone)]
pub struct RoleManager {
    adapter: Arc<dyn PolicyAdapter>,
}

fn require_name(kind: &str, value: &str) -> Result<(), AuthzError> {
    if value.trim().is_empty() {
        return Err(AuthzError::InvalidRule(format!("{kind} name must not be empty")));
    }
    Ok(())
}

impl RoleManager {
    pub fn new(adapter: Arc<dyn PolicyAdapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn PolicyAdapter> {
        &self.adapter
    }

    async fn permission_rules(&self, role: &str) -> Result<Vec<PolicyRule>, AuthzError> {
        let filter = PolicyFilter::new(PERMISSION_PTYPE, 0, &[role])?;
        self.adapter.load_filtered_policy(&filter).await
    }

    pub async fn role_exists(&self, role: &str) -> Result<bool, AuthzError> {
        if role.is_empty() {
            return Ok(false);
        }
        Ok(!self.permission_rules(role).await?.is_empty())
    }

    /// Distinct roles named by permission rules, sorted.
    pub async fn list_roles(&self) -> Result<Vec<String>, AuthzError> {
        let filter = PolicyFilter::new::<&str>(PERMISSION_PTYPE, 0, &[])?;
        let roles: BTreeSet<String> = self
            .adapter
            .load_filtered_policy(&filter)
            .await?
            .into_iter()
            .map(|rule| rule.v0)
            .collect();
        Ok(roles.into_iter().collect())
    }

    pub async fn get_permissions_for_role(
        &self,
        role: &str,
    ) -> Result<Vec<Permission>, AuthzError> {
        if role.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .permission_rules(role)
            .await?
            .iter()
            .map(Permission::from_rule)
            .collect())
    }

    pub async fn get_users_for_role(&self, role: &str) -> Result<Vec<String>, AuthzError> {
        if role.is_empty() {
            return Ok(Vec::new());
        }
        let filter = PolicyFilter::new(GROUPING_PTYPE, 1, &[role])?;
        let users: BTreeSet<String> = self
            .adapter
            .load_filtered_policy(&filter)
            .await?
            .into_iter()
            .map(|rule| rule.v0)
            .collect();
        Ok(users.into_iter().collect())
    }

    /// Roles directly assigned to `user` through grouping rules.
    pub async fn get_roles_for_user(&self, user: &str) -> Result<Vec<String>, AuthzError> {
        if user.is_empty() {
            return Ok(Vec::new());
        }
        let filter = PolicyFilter::new(GROUPING_PTYPE, 0, &[user])?;
        let roles: BTreeSet<String> = self
            .adapter
            .load_filtered_policy(&filter)
            .await?
            .into_iter()
            .map(|rule| rule.v1)
            .collect();
        Ok(roles.into_iter().collect())
    }

    /// Grant `role` to `user`. Returns `false` if the edge already existed.
    pub async fn assign_role_to_user(&self, user: &str, role: &str) -> Result<bool, AuthzError> {
        require_name("user", user)?;
        require_name("role", role)?;

        let edge = PolicyRule::grouping(user, role);
        let existing = self
            .adapter
            .load_filtered_policy(&PolicyFilter::new(GROUPING_PTYPE, 0, &[user, role])?)
            .await?;
        if existing.contains(&edge) {
            return Ok(false);
        }

        match self.adapter.add_policy(&edge).await {
            Ok(()) => {
                tracing::info!(user, role, "Assigned role");
                Ok(true)
            }
            // Lost a race with a concurrent assignment of the same edge.
            Err(AuthzError::PolicyAlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn remove_role_from_user(&self, user: &str, role: &str) -> Result<bool, AuthzError> {
        let removed = self
            .adapter
            .remove_policy(&PolicyRule::grouping(user, role))
            .await?;
        if removed {
            tracing::info!(user, role, "Removed role from user");
        }
        Ok(removed)
    }

    pub async fn add_permission_for_role(
        &self,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<(), AuthzError> {
        require_name("role", role)?;
        self.adapter
            .add_policy(&PolicyRule::permission(role, resource, action))
            .await
    }

    pub async fn remove_permission_for_role(
        &self,
        role: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, AuthzError> {
        self.adapter
            .remove_policy(&PolicyRule::permission(role, resource, action))
            .await
    }

    /// Create `role` with the given permissions in one transaction. Fails
    /// with `RoleAlreadyExists` if the role has any permission, including one
    /// committed by a concurrent call.
    pub async fn create_role(
        &self,
        role: &str,
        permissions: &[Permission],
    ) -> Result<(), AuthzError> {
        require_name("role", role)?;
        let rules: Vec<PolicyRule> = permissions.iter().map(|p| p.to_rule(role)).collect();
        self.adapter.create_role_policies(role, &rules).await?;

        tracing::info!(role, permissions = rules.len(), "Created role");
        Ok(())
    }

    /// Strip every permission of `role` and every user's membership in it,
    /// in one transaction. Safe to re-run.
    pub async fn delete_role(&self, role: &str) -> Result<u64, AuthzError> {
        require_name("role", role)?;

        let filters = [
            PolicyFilter::new(PERMISSION_PTYPE, 0, &[role])?,
            PolicyFilter::new(GROUPING_PTYPE, 1, &[role])?,
        ];
        let removed = self.adapter.remove_filtered_policies(&filters).await?;

        tracing::info!(role, removed, "Deleted role");
        Ok(removed)
    }

    /// Replace the whole policy set with `DEFAULT_POLICIES`.
    pub async fn import_default_policies(&self) -> Result<usize, AuthzError> {
        let rules: Vec<PolicyRule> = DEFAULT_POLICIES
            .iter()
            .map(|(role, resource, action)| PolicyRule::permission(role, resource, action))
            .collect();
        self.adapter.save_policy(&rules).await?;

        tracing::info!(rules = rules.len(), "Imported default policies");
        Ok(rules.len())
    }

    /// Reload `loader` from the store after mutations.
    pub async fn sync(&self, loader: &mut dyn PolicyLoader) -> Result<usize, AuthzError> {
        self.adapter.load_policy_into(loader).await
    }
}
