use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let id_col = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => ColumnDef::new(FeatureFlags::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
            _ => ColumnDef::new(FeatureFlags::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
        };

        manager
            .create_table(
                Table::create()
                    .table(FeatureFlags::Table)
                    .if_not_exists()
                    .col(id_col)
                    .col(string_uniq(FeatureFlags::Name))
                    .col(string_null(FeatureFlags::Description))
                    .col(
                        ColumnDef::new(FeatureFlags::Enabled)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FeatureFlags::Public)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    // JSON array of role names; "[]" means unrestricted
                    .col(
                        ColumnDef::new(FeatureFlags::AllowedRoles)
                            .string()
                            .not_null()
                            .default("[]"),
                    )
                    .col(big_integer(FeatureFlags::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FeatureFlags::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FeatureFlags {
    Table,
    Id,
    Name,
    Description,
    Enabled,
    Public,
    AllowedRoles,
    UpdatedAt,
}
