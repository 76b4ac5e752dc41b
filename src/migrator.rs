use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_promo_codes_table::Migration),
            Box::new(m20250301_000002_create_redemptions_table::Migration),
        ]
    }
}

mod m20250301_000001_create_promo_codes_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_promo_codes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PromoCodes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PromoCodes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PromoCodes::Kind).string().not_null())
                        .col(
                            ColumnDef::new(PromoCodes::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PromoCodes::DiscountType).string().not_null())
                        .col(
                            ColumnDef::new(PromoCodes::ValidFrom)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::ValidUntil)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PromoCodes::MaxUsage).integer().null())
                        .col(
                            ColumnDef::new(PromoCodes::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PromoCodes::OwnerId).uuid().null())
                        .col(
                            ColumnDef::new(PromoCodes::HasBalanceLimit)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(PromoCodes::InitialBalance).decimal().null())
                        .col(
                            ColumnDef::new(PromoCodes::RemainingBalance)
                                .decimal()
                                .null(),
                        )
                        .col(ColumnDef::new(PromoCodes::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(PromoCodes::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            // Get-or-create resolves by owner + kind
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_promo_codes_owner_kind")
                        .table(PromoCodes::Table)
                        .col(PromoCodes::OwnerId)
                        .col(PromoCodes::Kind)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PromoCodes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum PromoCodes {
        Table,
        Id,
        Code,
        Kind,
        DiscountAmount,
        DiscountType,
        ValidFrom,
        ValidUntil,
        MaxUsage,
        UsageCount,
        OwnerId,
        HasBalanceLimit,
        InitialBalance,
        RemainingBalance,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000002_create_redemptions_table {
    use sea_orm_migration::prelude::*;

    use super::m20250301_000001_create_promo_codes_table::PromoCodes;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_redemptions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Redemptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Redemptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Redemptions::CodeId).uuid().not_null())
                        .col(ColumnDef::new(Redemptions::RedeemerId).uuid().not_null())
                        .col(
                            ColumnDef::new(Redemptions::RedeemedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Redemptions::OrderId).uuid().null())
                        .col(
                            ColumnDef::new(Redemptions::RewardIssuedAt)
                                .timestamp()
                                .null(),
                        )
                        // One winner per single-use code: NULLs (unlimited
                        // codes) never collide, populated values do.
                        .col(
                            ColumnDef::new(Redemptions::ExclusiveCodeId)
                                .uuid()
                                .null()
                                .unique_key(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_redemptions_code_id")
                                .from(Redemptions::Table, Redemptions::CodeId)
                                .to(PromoCodes::Table, PromoCodes::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_redemptions_code_id")
                        .table(Redemptions::Table)
                        .col(Redemptions::CodeId)
                        .to_owned(),
                )
                .await?;

            // Post-payment handlers resolve by redeemer, newest first
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_redemptions_redeemer_redeemed_at")
                        .table(Redemptions::Table)
                        .col(Redemptions::RedeemerId)
                        .col(Redemptions::RedeemedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Redemptions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Redemptions {
        Table,
        Id,
        CodeId,
        RedeemerId,
        RedeemedAt,
        OrderId,
        RewardIssuedAt,
        ExclusiveCodeId,
    }
}
