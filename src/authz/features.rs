use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::authz::errors::AuthzError;
use crate::authz::roles::RoleManager;
use crate::entities;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub public: bool,
    /// Roles allowed to use the feature; empty means no restriction.
    pub allowed_roles: Vec<String>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFeatureFlag {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub public: bool,
    pub allowed_roles: Vec<String>,
}

impl TryFrom<entities::feature_flag::Model> for FeatureFlag {
    type Error = AuthzError;

    fn try_from(model: entities::feature_flag::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            allowed_roles: serde_json::from_str(&model.allowed_roles)?,
            name: model.name,
            description: model.description,
            enabled: model.enabled != 0,
            public: model.public != 0,
            updated_at: model.updated_at,
        })
    }
}

/// Create or replace the flag named `input.name`.
pub async fn upsert_feature_flag(
    db: &DatabaseConnection,
    input: NewFeatureFlag,
) -> Result<FeatureFlag, AuthzError> {
    use entities::feature_flag::{Column, Entity};

    if input.name.trim().is_empty() {
        return Err(AuthzError::InvalidRule(
            "feature flag name must not be empty".into(),
        ));
    }

    let now = Utc::now().timestamp();
    let roles_json = serde_json::to_string(&input.allowed_roles)?;

    let flag = entities::feature_flag::ActiveModel {
        name: Set(input.name.clone()),
        description: Set(input.description.clone()),
        enabled: Set(i64::from(input.enabled)),
        public: Set(i64::from(input.public)),
        allowed_roles: Set(roles_json),
        updated_at: Set(now),
        ..Default::default()
    };

    Entity::insert(flag)
        .on_conflict(
            OnConflict::column(Column::Name)
                .update_columns([
                    Column::Description,
                    Column::Enabled,
                    Column::Public,
                    Column::AllowedRoles,
                    Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    tracing::info!(
        flag = %input.name,
        enabled = input.enabled,
        public = input.public,
        roles = input.allowed_roles.len(),
        "Saved feature flag"
    );

    Ok(FeatureFlag {
        name: input.name,
        description: input.description,
        enabled: input.enabled,
        public: input.public,
        allowed_roles: input.allowed_roles,
        updated_at: now,
    })
}

pub async fn get_feature_flag(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<FeatureFlag>, AuthzError> {
    use entities::feature_flag::{Column, Entity};

    Entity::find()
        .filter(Column::Name.eq(name))
        .one(db)
        .await?
        .map(FeatureFlag::try_from)
        .transpose()
}

pub async fn list_feature_flags(db: &DatabaseConnection) -> Result<Vec<FeatureFlag>, AuthzError> {
    use entities::feature_flag::{Column, Entity};

    Entity::find()
        .order_by_asc(Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(FeatureFlag::try_from)
        .collect()
}

pub async fn delete_feature_flag(db: &DatabaseConnection, name: &str) -> Result<bool, AuthzError> {
    use entities::feature_flag::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::Name.eq(name))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Feature gating on top of persisted flags and grouping rules.
///
/// Decisions follow the RBAC matcher: no restriction allows, otherwise any
/// matching role allows. Missing data always denies.
#[derive(Clone)]
pub struct FeatureGate {
    db: DatabaseConnection,
    roles: RoleManager,
}

impl FeatureGate {
    pub fn new(db: DatabaseConnection, roles: RoleManager) -> Self {
        Self { db, roles }
    }

    pub async fn is_feature_enabled(&self, name: &str) -> Result<bool, AuthzError> {
        Ok(get_feature_flag(&self.db, name)
            .await?
            .map(|flag| flag.enabled)
            .unwrap_or(false))
    }

    pub async fn can_access_feature(&self, user: &str, name: &str) -> Result<bool, AuthzError> {
        let Some(flag) = get_feature_flag(&self.db, name).await? else {
            return Ok(false);
        };
        if !flag.enabled {
            return Ok(false);
        }
        if flag.public || flag.allowed_roles.is_empty() {
            return Ok(true);
        }

        let held = self.roles.get_roles_for_user(user).await?;
        let allowed = held.iter().any(|role| flag.allowed_roles.contains(role));
        tracing::debug!(user, flag = name, allowed, "Evaluated feature access");
        Ok(allowed)
    }
}
