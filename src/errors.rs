use miette::Diagnostic;
use thiserror::Error;

use crate::authz::AuthzError;

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(quartermaster::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(quartermaster::config))]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    #[diagnostic(code(quartermaster::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authz(#[from] AuthzError),
}
