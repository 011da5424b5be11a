pub mod builders;
pub mod db;

pub use builders::{FeatureFlagBuilder, RoleBuilder};
pub use db::TestDb;
