use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::Name).string())
                    .col(ColumnDef::new(Users::Phone).string())
                    .col(
                        ColumnDef::new(Users::Role)
                            .string_len(32)
                            .not_null()
                            .default("CUSTOMER"),
                    )
                    .col(ColumnDef::new(Users::EmailVerifiedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Create addresses table
        manager
            .create_table(
                Table::create()
                    .table(Addresses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Addresses::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Addresses::UserId).integer().not_null())
                    .col(ColumnDef::new(Addresses::FullName).string().not_null())
                    .col(ColumnDef::new(Addresses::Phone).string().not_null())
                    .col(ColumnDef::new(Addresses::Line1).string().not_null())
                    .col(ColumnDef::new(Addresses::Line2).string())
                    .col(ColumnDef::new(Addresses::City).string().not_null())
                    .col(ColumnDef::new(Addresses::State).string().not_null())
                    .col(ColumnDef::new(Addresses::Pincode).string().not_null())
                    .col(
                        ColumnDef::new(Addresses::Country)
                            .string()
                            .not_null()
                            .default("India"),
                    )
                    .col(
                        ColumnDef::new(Addresses::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_addresses_user_id")
                            .from(Addresses::Table, Addresses::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create otp_tokens table
        manager
            .create_table(
                Table::create()
                    .table(OtpTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OtpTokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OtpTokens::Email).string().not_null())
                    .col(ColumnDef::new(OtpTokens::Code).string_len(6).not_null())
                    .col(ColumnDef::new(OtpTokens::UserId).integer())
                    .col(
                        ColumnDef::new(OtpTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OtpTokens::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OtpTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // OTP lookup is always by email + used flag
        manager
            .create_index(
                Index::create()
                    .name("idx_otp_tokens_email")
                    .table(OtpTokens::Table)
                    .col(OtpTokens::Email)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OtpTokens::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Addresses::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Name,
    Phone,
    Role,
    EmailVerifiedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Addresses {
    Table,
    Id,
    UserId,
    FullName,
    Phone,
    Line1,
    Line2,
    City,
    State,
    Pincode,
    Country,
    IsDefault,
}

#[derive(DeriveIden)]
enum OtpTokens {
    Table,
    Id,
    Email,
    Code,
    UserId,
    ExpiresAt,
    Used,
    CreatedAt,
}
