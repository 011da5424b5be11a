use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Policy rule `{0}` already exists")]
    #[diagnostic(
        code(quartermaster::authz::policy_exists),
        help("Each (ptype, v0..v5) tuple is stored at most once")
    )]
    PolicyAlreadyExists(String),

    #[error("Role `{0}` already exists")]
    #[diagnostic(
        code(quartermaster::authz::role_exists),
        help("Add permissions to the existing role or delete it first")
    )]
    RoleAlreadyExists(String),

    #[error("Operation `{0}` is not implemented by this adapter")]
    #[diagnostic(code(quartermaster::authz::not_implemented))]
    NotImplemented(&'static str),

    #[error("Invalid policy rule: {0}")]
    #[diagnostic(
        code(quartermaster::authz::invalid_rule),
        help("A rule is a non-empty ptype followed by at most six values, e.g. `p, editor, catalog, read`")
    )]
    InvalidRule(String),

    #[error("Invalid policy filter: {0}")]
    #[diagnostic(
        code(quartermaster::authz::invalid_filter),
        help("Field indexes range from 0 (v0) to 5 (v5)")
    )]
    InvalidFilter(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(quartermaster::authz::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(quartermaster::authz::serde))]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    #[diagnostic(code(quartermaster::authz::io))]
    Io(#[from] std::io::Error),
}
