pub mod adapter;
pub mod csv;
pub mod db_adapter;
pub mod errors;
pub mod features;
pub mod memory;
pub mod roles;
pub mod types;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use adapter::PolicyAdapter;
pub use db_adapter::SeaOrmAdapter;
pub use errors::AuthzError;
pub use features::{FeatureFlag, FeatureGate, NewFeatureFlag};
pub use memory::MemoryAdapter;
pub use roles::RoleManager;
pub use types::{Permission, PolicyFilter, PolicyLoader, PolicyRule, PolicySnapshot};

/// Authorization services for one process, built once at startup and
/// passed to whatever needs them.
#[derive(Clone)]
pub struct AuthzService {
    pub adapter: Arc<dyn PolicyAdapter>,
    pub roles: RoleManager,
    pub features: FeatureGate,
}

impl AuthzService {
    pub fn new(db: DatabaseConnection) -> Self {
        let adapter: Arc<dyn PolicyAdapter> = Arc::new(SeaOrmAdapter::new(db.clone()));
        let roles = RoleManager::new(adapter.clone());
        let features = FeatureGate::new(db, roles.clone());
        Self {
            adapter,
            roles,
            features,
        }
    }

    /// Install the default policy set if the store holds no rules.
    /// Returns the number of rules written.
    pub async fn bootstrap_if_empty(&self) -> Result<usize, AuthzError> {
        if !self.adapter.load_policy().await?.is_empty() {
            tracing::debug!("Policy store already populated, skipping bootstrap");
            return Ok(0);
        }
        self.roles.import_default_policies().await
    }
}
