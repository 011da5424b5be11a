//! Bulk policy transfer in the line format shared with the engine:
//! `ptype, v0, v1, ...` with trailing empty fields omitted.
use std::path::Path;

use crate::authz::adapter::PolicyAdapter;
use crate::authz::errors::AuthzError;
use crate::authz::types::PolicyRule;

/// Render every stored rule, one `\n`-terminated line each.
pub async fn export_to_csv(adapter: &dyn PolicyAdapter) -> Result<String, AuthzError> {
    let rules = adapter.load_policy().await?;
    let mut out = String::new();
    for rule in &rules {
        out.push_str(&rule.to_line());
        out.push('\n');
    }
    tracing::debug!(rules = rules.len(), "Exported policy");
    Ok(out)
}

/// Parse policy lines. Blank lines, `#` comments and lines without any
/// value after the ptype are skipped.
pub fn parse_csv(text: &str) -> Result<Vec<PolicyRule>, AuthzError> {
    let mut rules = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let parsed = PolicyRule::parse_line(line).map_err(|e| match e {
            AuthzError::InvalidRule(msg) => {
                AuthzError::InvalidRule(format!("line {}: {msg}", index + 1))
            }
            other => other,
        })?;
        if let Some(rule) = parsed {
            rules.push(rule);
        }
    }
    Ok(rules)
}

/// Insert every rule in `text` in one transaction. Returns the number of
/// rules imported.
pub async fn import_from_csv(adapter: &dyn PolicyAdapter, text: &str) -> Result<usize, AuthzError> {
    let rules = parse_csv(text)?;
    adapter.add_policies(&rules).await?;
    tracing::info!(rules = rules.len(), "Imported policy");
    Ok(rules.len())
}

pub async fn export_to_file(adapter: &dyn PolicyAdapter, path: &Path) -> Result<usize, AuthzError> {
    let text = export_to_csv(adapter).await?;
    tokio::fs::write(path, &text).await?;
    Ok(text.lines().count())
}

pub async fn import_from_file(adapter: &dyn PolicyAdapter, path: &Path) -> Result<usize, AuthzError> {
    let text = tokio::fs::read_to_string(path).await?;
    import_from_csv(adapter, &text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::memory::MemoryAdapter;

    #[tokio::test]
    async fn test_export_format_is_stable() {
        let adapter = MemoryAdapter::with_rules(vec![
            PolicyRule::permission("admin", "*", "*"),
            PolicyRule::grouping("alice", "admin"),
            PolicyRule::new("p", &["editor", "", "read"]).unwrap(),
        ])
        .unwrap();

        let text = export_to_csv(&adapter).await.unwrap();
        assert_eq!(text, "p, admin, *, *\ng, alice, admin\np, editor, , read\n");
    }

    #[test]
    fn test_parse_skips_noise() {
        let text = "\n# seeded\n  p ,viewer, catalog ,read  \n\ng\np,\ng, ,\n   \ng, bob, viewer\n";
        let rules = parse_csv(text).unwrap();
        assert_eq!(
            rules,
            vec![
                PolicyRule::permission("viewer", "catalog", "read"),
                PolicyRule::grouping("bob", "viewer"),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_wide_line() {
        let err = parse_csv("p, a, b\np, 1, 2, 3, 4, 5, 6, 7\n").unwrap_err();
        match err {
            AuthzError::InvalidRule(msg) => assert!(msg.starts_with("line 2"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_import_skips_lines_without_values() {
        let adapter = MemoryAdapter::new();
        let count = import_from_csv(&adapter, "p,\ng, ,\ng, alice, admin\n")
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            adapter.load_policy().await.unwrap(),
            vec![PolicyRule::grouping("alice", "admin")]
        );
    }

    #[tokio::test]
    async fn test_import_is_all_or_nothing() {
        let adapter = MemoryAdapter::with_rules(vec![PolicyRule::grouping("alice", "admin")])
            .unwrap();

        let err = import_from_csv(&adapter, "p, viewer, catalog, read\ng, alice, admin\n")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::PolicyAlreadyExists(_)));
        assert_eq!(
            adapter.load_policy().await.unwrap(),
            vec![PolicyRule::grouping("alice", "admin")]
        );
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.csv");

        let source = MemoryAdapter::with_rules(vec![
            PolicyRule::permission("admin", "*", "*"),
            PolicyRule::grouping("alice", "admin"),
        ])
        .unwrap();
        assert_eq!(export_to_file(&source, &path).await.unwrap(), 2);

        let target = MemoryAdapter::new();
        assert_eq!(import_from_file(&target, &path).await.unwrap(), 2);
        assert_eq!(
            target.load_policy().await.unwrap(),
            source.load_policy().await.unwrap()
        );
    }
}
