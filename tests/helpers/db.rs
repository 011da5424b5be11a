use std::sync::Arc;

use migration::MigratorTrait;
use quartermaster::authz::{AuthzService, PolicyAdapter, RoleManager, SeaOrmAdapter};
use sea_orm::{Database, DatabaseConnection};
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// SeaORM-backed adapter over this database
    pub fn adapter(&self) -> Arc<dyn PolicyAdapter> {
        Arc::new(SeaOrmAdapter::new(self.connection.clone()))
    }

    pub fn roles(&self) -> RoleManager {
        RoleManager::new(self.adapter())
    }

    pub fn service(&self) -> AuthzService {
        AuthzService::new(self.connection.clone())
    }
}
