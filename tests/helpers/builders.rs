use quartermaster::authz::features::{self, FeatureFlag, NewFeatureFlag};
use quartermaster::authz::{Permission, RoleManager};
use sea_orm::DatabaseConnection;

/// Builder for creating test roles and their members
pub struct RoleBuilder {
    role: String,
    permissions: Vec<Permission>,
    members: Vec<String>,
}

impl RoleBuilder {
    pub fn new(role: &str) -> Self {
        Self {
            role: role.to_string(),
            permissions: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn with_permission(mut self, resource: &str, action: &str) -> Self {
        self.permissions.push(Permission::new(resource, action));
        self
    }

    pub fn with_member(mut self, user: &str) -> Self {
        self.members.push(user.to_string());
        self
    }

    pub async fn create(self, roles: &RoleManager) -> String {
        roles
            .create_role(&self.role, &self.permissions)
            .await
            .expect("Failed to create test role");

        for user in &self.members {
            roles
                .assign_role_to_user(user, &self.role)
                .await
                .expect("Failed to assign test role");
        }

        self.role
    }
}

/// Builder for creating test feature flags
pub struct FeatureFlagBuilder {
    input: NewFeatureFlag,
}

impl FeatureFlagBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            input: NewFeatureFlag {
                name: name.to_string(),
                enabled: true,
                ..Default::default()
            },
        }
    }

    pub fn disabled(mut self) -> Self {
        self.input.enabled = false;
        self
    }

    pub fn public(mut self) -> Self {
        self.input.public = true;
        self
    }

    pub fn allow_role(mut self, role: &str) -> Self {
        self.input.allowed_roles.push(role.to_string());
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> FeatureFlag {
        features::upsert_feature_flag(db, self.input)
            .await
            .expect("Failed to create test feature flag")
    }
}
