pub mod feature_flag;
pub mod policy_rule;

pub use feature_flag::Entity as FeatureFlag;
pub use policy_rule::Entity as PolicyRule;
