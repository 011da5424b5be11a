use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

use crate::errors::AppError;
use crate::settings::Database as DbCfg;

pub async fn connect(cfg: &DbCfg) -> Result<DatabaseConnection, AppError> {
    Ok(Database::connect(&cfg.url).await?)
}

/// Connect and bring the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, AppError> {
    let db = connect(cfg).await?;
    Migrator::up(&db, None).await?;
    tracing::debug!("Database schema is up to date");
    Ok(db)
}

/// Apply pending migrations only. Returns how many ran.
pub async fn migrate(db: &DatabaseConnection) -> Result<usize, AppError> {
    let pending = Migrator::get_pending_migrations(db).await?.len();
    Migrator::up(db, None).await?;
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, Statement};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_migrate_reports_pending() {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let cfg = DbCfg {
            url: format!("sqlite://{}?mode=rwc", temp_file.path().display()),
        };

        let db = connect(&cfg).await.expect("Failed to connect");
        assert_eq!(migrate(&db).await.unwrap(), 2);
        assert_eq!(migrate(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_init_creates_schema() {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let cfg = DbCfg {
            url: format!("sqlite://{}?mode=rwc", temp_file.path().display()),
        };

        let db = init(&cfg).await.expect("Failed to init storage");
        let backend = db.get_database_backend();
        let row = db
            .query_one(Statement::from_string(
                backend,
                "SELECT COUNT(*) AS n FROM policy_rules".to_string(),
            ))
            .await
            .expect("policy_rules missing")
            .expect("no row");
        let count: i64 = row.try_get("", "n").unwrap();
        assert_eq!(count, 0);

        assert_eq!(migrate(&db).await.unwrap(), 0);
    }
}
