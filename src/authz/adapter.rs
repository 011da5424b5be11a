//! Persistence contract consumed by the policy decision engine.
//!
//! The engine never touches the rule table directly; it goes through a
//! `PolicyAdapter`. `SeaOrmAdapter` is the relational implementation and
//! `MemoryAdapter` an in-process one with the same semantics.
use std::collections::HashSet;

use async_trait::async_trait;

use crate::authz::errors::AuthzError;
use crate::authz::types::{PolicyFilter, PolicyLoader, PolicyRule};

#[async_trait]
pub trait PolicyAdapter: Send + Sync {
    /// Every stored rule, in insertion order.
    async fn load_policy(&self) -> Result<Vec<PolicyRule>, AuthzError>;

    /// Rules matching `filter`.
    async fn load_filtered_policy(
        &self,
        filter: &PolicyFilter,
    ) -> Result<Vec<PolicyRule>, AuthzError>;

    /// Replace the whole rule set atomically. On error the previous set is kept.
    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<(), AuthzError>;

    /// Insert one rule. Fails with `PolicyAlreadyExists` on a duplicate tuple.
    async fn add_policy(&self, rule: &PolicyRule) -> Result<(), AuthzError>;

    /// Insert several rules in one transaction, all or nothing.
    async fn add_policies(&self, rules: &[PolicyRule]) -> Result<(), AuthzError>;

    /// Insert the permission rules of a new role as one unit. Fails with
    /// `RoleAlreadyExists`, writing nothing, if any `p` rule already names
    /// `role`; the check and the insert cannot interleave with another
    /// creation of the same role.
    async fn create_role_policies(&self, role: &str, rules: &[PolicyRule])
        -> Result<(), AuthzError>;

    /// Delete the row whose stored tuple equals `rule` exactly.
    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, AuthzError>;

    /// Delete every rule matching the field window.
    async fn remove_filtered_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<u64, AuthzError> {
        let filter = PolicyFilter::new(ptype, field_index, field_values)?;
        self.remove_filtered_policies(std::slice::from_ref(&filter))
            .await
    }

    /// Apply several filtered removals in one transaction.
    async fn remove_filtered_policies(&self, filters: &[PolicyFilter]) -> Result<u64, AuthzError>;

    /// Swap `old` for `new` atomically. Returns `false`, changing nothing,
    /// when `old` is not stored.
    async fn update_policy(&self, old: &PolicyRule, new: &PolicyRule)
        -> Result<bool, AuthzError>;

    async fn update_filtered_policies(
        &self,
        _filter: &PolicyFilter,
        _new_rules: &[PolicyRule],
    ) -> Result<Vec<PolicyRule>, AuthzError> {
        Err(AuthzError::NotImplemented("update_filtered_policies"))
    }

    /// Delete every rule.
    async fn clear_policy(&self) -> Result<(), AuthzError> {
        self.save_policy(&[]).await
    }

    /// Reset `loader` and feed it one policy line per stored rule.
    async fn load_policy_into(&self, loader: &mut dyn PolicyLoader) -> Result<usize, AuthzError> {
        let rules = self.load_policy().await?;
        loader.clear();
        for rule in &rules {
            loader.load_policy_line(&rule.to_line());
        }
        tracing::debug!(rules = rules.len(), "Loaded policy into engine");
        Ok(rules.len())
    }
}

/// Reject tuples that cannot be stored.
pub(crate) fn validate_rule(rule: &PolicyRule) -> Result<(), AuthzError> {
    if rule.ptype.is_empty() {
        return Err(AuthzError::InvalidRule("ptype must not be empty".into()));
    }
    if rule.values().is_empty() {
        return Err(AuthzError::InvalidRule(format!(
            "rule `{}` has no values",
            rule.ptype
        )));
    }
    Ok(())
}

/// Rules for `create_role_policies`: at least one, all `p` rules for
/// `role`, no repeats.
pub(crate) fn validate_role_rules(role: &str, rules: &[PolicyRule]) -> Result<(), AuthzError> {
    if rules.is_empty() {
        return Err(AuthzError::InvalidRule(format!(
            "role `{role}` needs at least one permission"
        )));
    }
    let mut seen = HashSet::new();
    for rule in rules {
        validate_rule(rule)?;
        if !rule.is_permission() || rule.v0 != role {
            return Err(AuthzError::InvalidRule(format!(
                "rule `{rule}` is not a permission of `{role}`"
            )));
        }
        if !seen.insert(rule) {
            return Err(AuthzError::PolicyAlreadyExists(rule.to_string()));
        }
    }
    Ok(())
}

/// Order rules for bulk insert: permission rules, then groupings, then any
/// other ptype.
pub(crate) fn bulk_insert_order(rules: &[PolicyRule]) -> Vec<&PolicyRule> {
    let mut ordered: Vec<&PolicyRule> = rules.iter().filter(|r| r.is_permission()).collect();
    ordered.extend(rules.iter().filter(|r| r.is_grouping()));
    ordered.extend(
        rules
            .iter()
            .filter(|r| !r.is_permission() && !r.is_grouping()),
    );
    ordered
}
