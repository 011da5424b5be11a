//! Relational `PolicyAdapter` on top of SeaORM.
//!
//! Multi-statement operations run in one database transaction. The
//! transaction is committed only on success; every early return drops the
//! guard, which rolls it back.
use async_trait::async_trait;
use sea_orm::sea_query::Condition;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, IsolationLevel, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};

use crate::authz::adapter::{bulk_insert_order, validate_role_rules, validate_rule, PolicyAdapter};
use crate::authz::errors::AuthzError;
use crate::authz::types::{PolicyFilter, PolicyRule, PERMISSION_PTYPE};
use crate::entities::policy_rule::{self, Column, Entity, VALUE_COLUMNS};

/// Rows per multi-row INSERT; keeps bind parameters under SQLite's limit.
const INSERT_CHUNK: usize = 100;

#[derive(Clone)]
pub struct SeaOrmAdapter {
    db: DatabaseConnection,
}

impl SeaOrmAdapter {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Isolation for check-then-insert transactions. SQLite already
    /// serialises writers on its database lock.
    fn check_isolation(&self) -> Option<IsolationLevel> {
        matches!(self.db.get_database_backend(), DbBackend::Postgres)
            .then_some(IsolationLevel::Serializable)
    }
}

impl From<policy_rule::Model> for PolicyRule {
    fn from(model: policy_rule::Model) -> Self {
        PolicyRule::from_slots(
            model.ptype,
            [model.v0, model.v1, model.v2, model.v3, model.v4, model.v5],
        )
    }
}

fn active_model(rule: &PolicyRule) -> policy_rule::ActiveModel {
    policy_rule::ActiveModel {
        id: NotSet,
        ptype: Set(rule.ptype.clone()),
        v0: Set(rule.v0.clone()),
        v1: Set(rule.v1.clone()),
        v2: Set(rule.v2.clone()),
        v3: Set(rule.v3.clone()),
        v4: Set(rule.v4.clone()),
        v5: Set(rule.v5.clone()),
    }
}

/// Condition matching the stored tuple exactly, empty slots included.
fn exact_condition(rule: &PolicyRule) -> Condition {
    let mut cond = Condition::all().add(Column::Ptype.eq(rule.ptype.as_str()));
    for (column, value) in VALUE_COLUMNS.into_iter().zip(rule.slots()) {
        cond = cond.add(column.eq(value));
    }
    cond
}

fn filter_condition(filter: &PolicyFilter) -> Condition {
    let mut cond = Condition::all().add(Column::Ptype.eq(filter.ptype.as_str()));
    for (index, value) in filter.constraints() {
        cond = cond.add(VALUE_COLUMNS[index].eq(value));
    }
    cond
}

fn translate_insert_error(err: DbErr, what: impl FnOnce() -> String) -> AuthzError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AuthzError::PolicyAlreadyExists(what()),
        _ => AuthzError::Db(err),
    }
}

async fn insert_one<C: ConnectionTrait>(conn: &C, rule: &PolicyRule) -> Result<(), AuthzError> {
    Entity::insert(active_model(rule))
        .exec_without_returning(conn)
        .await
        .map_err(|e| translate_insert_error(e, || rule.to_string()))?;
    Ok(())
}

async fn insert_all<C: ConnectionTrait>(conn: &C, rules: &[&PolicyRule]) -> Result<(), AuthzError> {
    for chunk in rules.chunks(INSERT_CHUNK) {
        let models = chunk.iter().map(|rule| active_model(rule));
        Entity::insert_many(models)
            .exec_without_returning(conn)
            .await
            .map_err(|e| {
                translate_insert_error(e, || {
                    let lines: Vec<String> = chunk.iter().map(|r| r.to_string()).collect();
                    format!("one of [{}]", lines.join("; "))
                })
            })?;
    }
    Ok(())
}

async fn delete_exact<C: ConnectionTrait>(conn: &C, rule: &PolicyRule) -> Result<u64, DbErr> {
    let result = Entity::delete_many()
        .filter(exact_condition(rule))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

#[async_trait]
impl PolicyAdapter for SeaOrmAdapter {
    async fn load_policy(&self) -> Result<Vec<PolicyRule>, AuthzError> {
        let models = Entity::find()
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(PolicyRule::from).collect())
    }

    async fn load_filtered_policy(
        &self,
        filter: &PolicyFilter,
    ) -> Result<Vec<PolicyRule>, AuthzError> {
        let models = Entity::find()
            .filter(filter_condition(filter))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(PolicyRule::from).collect())
    }

    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<(), AuthzError> {
        for rule in rules {
            validate_rule(rule)?;
        }

        let txn = self.db.begin().await?;
        let cleared = Entity::delete_many().exec(&txn).await?.rows_affected;
        insert_all(&txn, &bulk_insert_order(rules)).await?;
        txn.commit().await?;

        tracing::info!(cleared, saved = rules.len(), "Replaced policy set");
        Ok(())
    }

    async fn add_policy(&self, rule: &PolicyRule) -> Result<(), AuthzError> {
        validate_rule(rule)?;
        insert_one(&self.db, rule).await?;
        tracing::debug!(rule = %rule, "Added policy");
        Ok(())
    }

    async fn add_policies(&self, rules: &[PolicyRule]) -> Result<(), AuthzError> {
        if rules.is_empty() {
            return Ok(());
        }
        for rule in rules {
            validate_rule(rule)?;
        }

        let txn = self.db.begin().await?;
        let ordered: Vec<&PolicyRule> = rules.iter().collect();
        insert_all(&txn, &ordered).await?;
        txn.commit().await?;

        tracing::info!(added = rules.len(), "Added policies");
        Ok(())
    }

    async fn create_role_policies(
        &self,
        role: &str,
        rules: &[PolicyRule],
    ) -> Result<(), AuthzError> {
        validate_role_rules(role, rules)?;
        let role_filter = PolicyFilter::new(PERMISSION_PTYPE, 0, &[role])?;

        let txn = self.db.begin_with_config(self.check_isolation(), None).await?;
        // Write first: the insert takes the write lock before the role is counted.
        let ordered: Vec<&PolicyRule> = rules.iter().collect();
        match insert_all(&txn, &ordered).await {
            Ok(()) => {}
            Err(AuthzError::PolicyAlreadyExists(_)) => {
                return Err(AuthzError::RoleAlreadyExists(role.to_string()));
            }
            Err(e) => return Err(e),
        }
        let stored = Entity::find()
            .filter(filter_condition(&role_filter))
            .count(&txn)
            .await?;
        if stored != rules.len() as u64 {
            txn.rollback().await?;
            return Err(AuthzError::RoleAlreadyExists(role.to_string()));
        }
        txn.commit().await?;

        tracing::info!(role, permissions = rules.len(), "Inserted role policies");
        Ok(())
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, AuthzError> {
        let removed = delete_exact(&self.db, rule).await?;
        tracing::debug!(rule = %rule, removed, "Removed policy");
        Ok(removed > 0)
    }

    async fn remove_filtered_policies(&self, filters: &[PolicyFilter]) -> Result<u64, AuthzError> {
        let txn = self.db.begin().await?;
        let mut removed = 0;
        for filter in filters {
            removed += Entity::delete_many()
                .filter(filter_condition(filter))
                .exec(&txn)
                .await?
                .rows_affected;
        }
        txn.commit().await?;

        tracing::debug!(filters = filters.len(), removed, "Removed filtered policies");
        Ok(removed)
    }

    async fn update_policy(
        &self,
        old: &PolicyRule,
        new: &PolicyRule,
    ) -> Result<bool, AuthzError> {
        validate_rule(new)?;

        let txn = self.db.begin().await?;
        if delete_exact(&txn, old).await? == 0 {
            txn.rollback().await?;
            return Ok(false);
        }
        insert_one(&txn, new).await?;
        txn.commit().await?;

        tracing::debug!(old = %old, new = %new, "Updated policy");
        Ok(true)
    }

    async fn clear_policy(&self) -> Result<(), AuthzError> {
        let cleared = Entity::delete_many().exec(&self.db).await?.rows_affected;
        tracing::info!(cleared, "Cleared policy set");
        Ok(())
    }
}
