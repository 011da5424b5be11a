use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite only allows AUTOINCREMENT on INTEGER PRIMARY KEY
        let id_col = match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => ColumnDef::new(PolicyRules::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
            _ => ColumnDef::new(PolicyRules::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key()
                .to_owned(),
        };

        manager
            .create_table(
                Table::create()
                    .table(PolicyRules::Table)
                    .if_not_exists()
                    .col(id_col)
                    .col(string(PolicyRules::Ptype))
                    .col(slot(PolicyRules::V0))
                    .col(slot(PolicyRules::V1))
                    .col(slot(PolicyRules::V2))
                    .col(slot(PolicyRules::V3))
                    .col(slot(PolicyRules::V4))
                    .col(slot(PolicyRules::V5))
                    .to_owned(),
            )
            .await?;

        // One row per distinct tuple; also serves ptype/v0 prefix lookups
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .unique()
                    .name("idx_policy_rules_tuple")
                    .table(PolicyRules::Table)
                    .col(PolicyRules::Ptype)
                    .col(PolicyRules::V0)
                    .col(PolicyRules::V1)
                    .col(PolicyRules::V2)
                    .col(PolicyRules::V3)
                    .col(PolicyRules::V4)
                    .col(PolicyRules::V5)
                    .to_owned(),
            )
            .await?;

        // Grouping lookups by role (users holding a role)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_policy_rules_ptype_v1")
                    .table(PolicyRules::Table)
                    .col(PolicyRules::Ptype)
                    .col(PolicyRules::V1)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PolicyRules::Table).to_owned())
            .await
    }
}

fn slot(column: PolicyRules) -> ColumnDef {
    ColumnDef::new(column)
        .string()
        .not_null()
        .default("")
        .to_owned()
}

#[derive(DeriveIden, Clone, Copy)]
enum PolicyRules {
    Table,
    Id,
    Ptype,
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
}
