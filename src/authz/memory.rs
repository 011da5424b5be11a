//! In-memory `PolicyAdapter`.
//!
//! Rules live in a `Vec` guarded by a `tokio::sync::RwLock`. Mutations hold
//! the write lock for their whole duration and validate before touching the
//! vector, so a concurrent `load_policy` only ever sees the state before or
//! after an operation. Nothing is durable.
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::authz::adapter::{
    bulk_insert_order, validate_role_rules, validate_rule, PolicyAdapter,
};
use crate::authz::errors::AuthzError;
use crate::authz::types::{PolicyFilter, PolicyRule};

#[derive(Clone, Default)]
pub struct MemoryAdapter {
    rules: Arc<RwLock<Vec<PolicyRule>>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<PolicyRule>) -> Result<Self, AuthzError> {
        ensure_distinct(&[], &rules)?;
        Ok(Self {
            rules: Arc::new(RwLock::new(rules)),
        })
    }
}

/// Fail if any of `incoming` is already in `existing` or repeated in itself.
fn ensure_distinct(existing: &[PolicyRule], incoming: &[PolicyRule]) -> Result<(), AuthzError> {
    let mut seen: HashSet<&PolicyRule> = existing.iter().collect();
    for rule in incoming {
        validate_rule(rule)?;
        if !seen.insert(rule) {
            return Err(AuthzError::PolicyAlreadyExists(rule.to_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl PolicyAdapter for MemoryAdapter {
    async fn load_policy(&self) -> Result<Vec<PolicyRule>, AuthzError> {
        Ok(self.rules.read().await.clone())
    }

    async fn load_filtered_policy(
        &self,
        filter: &PolicyFilter,
    ) -> Result<Vec<PolicyRule>, AuthzError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<(), AuthzError> {
        ensure_distinct(&[], rules)?;
        let replacement: Vec<PolicyRule> =
            bulk_insert_order(rules).into_iter().cloned().collect();

        let mut guard = self.rules.write().await;
        let cleared = guard.len();
        *guard = replacement;
        tracing::info!(cleared, saved = guard.len(), "Replaced policy set");
        Ok(())
    }

    async fn add_policy(&self, rule: &PolicyRule) -> Result<(), AuthzError> {
        let mut guard = self.rules.write().await;
        ensure_distinct(&guard, std::slice::from_ref(rule))?;
        guard.push(rule.clone());
        Ok(())
    }

    async fn add_policies(&self, rules: &[PolicyRule]) -> Result<(), AuthzError> {
        let mut guard = self.rules.write().await;
        ensure_distinct(&guard, rules)?;
        guard.extend_from_slice(rules);
        Ok(())
    }

    async fn create_role_policies(
        &self,
        role: &str,
        rules: &[PolicyRule],
    ) -> Result<(), AuthzError> {
        validate_role_rules(role, rules)?;
        let mut guard = self.rules.write().await;
        if guard.iter().any(|r| r.is_permission() && r.v0 == role) {
            return Err(AuthzError::RoleAlreadyExists(role.to_string()));
        }
        ensure_distinct(&guard, rules)?;
        guard.extend_from_slice(rules);
        Ok(())
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, AuthzError> {
        let mut guard = self.rules.write().await;
        let before = guard.len();
        guard.retain(|r| r != rule);
        Ok(guard.len() < before)
    }

    async fn remove_filtered_policies(&self, filters: &[PolicyFilter]) -> Result<u64, AuthzError> {
        let mut guard = self.rules.write().await;
        let before = guard.len();
        guard.retain(|r| !filters.iter().any(|f| f.matches(r)));
        Ok((before - guard.len()) as u64)
    }

    async fn update_policy(
        &self,
        old: &PolicyRule,
        new: &PolicyRule,
    ) -> Result<bool, AuthzError> {
        let mut guard = self.rules.write().await;
        let Some(pos) = guard.iter().position(|r| r == old) else {
            return Ok(false);
        };
        if new != old {
            ensure_distinct(&guard, std::slice::from_ref(new))?;
        }
        guard[pos] = new.clone();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_adapter_rejects_duplicates() {
        let adapter = MemoryAdapter::new();
        let rule = PolicyRule::grouping("alice", "admin");
        adapter.add_policy(&rule).await.unwrap();

        let err = adapter.add_policy(&rule).await.unwrap_err();
        assert!(matches!(err, AuthzError::PolicyAlreadyExists(_)));

        let err = adapter
            .save_policy(&[rule.clone(), rule.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::PolicyAlreadyExists(_)));
        assert_eq!(adapter.load_policy().await.unwrap(), vec![rule]);
    }

    #[tokio::test]
    async fn test_memory_adapter_filtered_remove() {
        let adapter = MemoryAdapter::with_rules(vec![
            PolicyRule::permission("editor", "catalog", "read"),
            PolicyRule::permission("viewer", "catalog", "read"),
            PolicyRule::permission("viewer", "guns", "read"),
        ])
        .unwrap();

        let removed = adapter
            .remove_filtered_policy("p", 1, &["catalog".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            adapter.load_policy().await.unwrap(),
            vec![PolicyRule::permission("viewer", "guns", "read")]
        );
    }

    #[tokio::test]
    async fn test_memory_adapter_update_keeps_old_on_conflict() {
        let old = PolicyRule::permission("editor", "catalog", "read");
        let taken = PolicyRule::permission("editor", "catalog", "write");
        let adapter = MemoryAdapter::with_rules(vec![old.clone(), taken.clone()]).unwrap();

        assert!(adapter.update_policy(&old, &taken).await.is_err());
        assert_eq!(adapter.load_policy().await.unwrap(), vec![old, taken]);
    }

    #[tokio::test]
    async fn test_concurrent_loads_never_see_partial_update() {
        let old = PolicyRule::permission("editor", "catalog", "read");
        let new = PolicyRule::permission("editor", "catalog", "write");
        let adapter = MemoryAdapter::with_rules(vec![old.clone()]).unwrap();

        let writer = {
            let adapter = adapter.clone();
            let (old, new) = (old.clone(), new.clone());
            tokio::spawn(async move {
                for _ in 0..200 {
                    assert!(adapter.update_policy(&old, &new).await.unwrap());
                    assert!(adapter.update_policy(&new, &old).await.unwrap());
                }
            })
        };

        let reader = {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let rules = adapter.load_policy().await.unwrap();
                    assert_eq!(rules.len(), 1, "observed {rules:?}");
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(adapter.load_policy().await.unwrap(), vec![old]);
    }
}
