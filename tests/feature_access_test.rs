mod helpers;

use helpers::{FeatureFlagBuilder, RoleBuilder, TestDb};
use quartermaster::authz::features;

#[tokio::test]
async fn test_role_restricted_feature() {
    let test_db = TestDb::new().await;
    let service = test_db.service();

    FeatureFlagBuilder::new("beta")
        .allow_role("tester")
        .create(test_db.connection())
        .await;

    assert!(service.features.is_feature_enabled("beta").await.unwrap());
    assert!(!service.features.can_access_feature("bob", "beta").await.unwrap());

    service.roles.assign_role_to_user("bob", "tester").await.unwrap();
    assert!(service.features.can_access_feature("bob", "beta").await.unwrap());

    service.roles.remove_role_from_user("bob", "tester").await.unwrap();
    assert!(!service.features.can_access_feature("bob", "beta").await.unwrap());
}

#[tokio::test]
async fn test_deleted_role_loses_feature() {
    let test_db = TestDb::new().await;
    let service = test_db.service();

    RoleBuilder::new("tester")
        .with_permission("beta", "use")
        .with_member("bob")
        .create(&service.roles)
        .await;
    FeatureFlagBuilder::new("beta")
        .allow_role("tester")
        .create(test_db.connection())
        .await;
    assert!(service.features.can_access_feature("bob", "beta").await.unwrap());

    service.roles.delete_role("tester").await.unwrap();
    assert!(!service.features.can_access_feature("bob", "beta").await.unwrap());
}

#[tokio::test]
async fn test_flag_states() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let service = test_db.service();

    FeatureFlagBuilder::new("dark").disabled().public().create(db).await;
    FeatureFlagBuilder::new("launch")
        .public()
        .allow_role("tester")
        .create(db)
        .await;
    FeatureFlagBuilder::new("open").create(db).await;

    assert!(!service.features.is_feature_enabled("dark").await.unwrap());
    assert!(!service.features.can_access_feature("bob", "dark").await.unwrap());
    assert!(service.features.can_access_feature("bob", "launch").await.unwrap());
    assert!(service.features.can_access_feature("bob", "open").await.unwrap());
    assert!(!service.features.can_access_feature("bob", "missing").await.unwrap());

    let names: Vec<String> = features::list_feature_flags(db)
        .await
        .unwrap()
        .into_iter()
        .map(|flag| flag.name)
        .collect();
    assert_eq!(names, vec!["dark", "launch", "open"]);
}
