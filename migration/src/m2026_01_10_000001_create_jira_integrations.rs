//! Migration to create the jira_integrations table.
//!
//! One row per user, holding the encrypted OAuth token pair and the
//! metadata of the Jira Cloud site the tokens were granted for.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JiraIntegrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JiraIntegrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JiraIntegrations::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(JiraIntegrations::AccessTokenCiphertext)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JiraIntegrations::RefreshTokenCiphertext)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JiraIntegrations::TokenType)
                            .text()
                            .not_null()
                            .default("Bearer"),
                    )
                    .col(
                        ColumnDef::new(JiraIntegrations::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JiraIntegrations::CloudId).text().not_null())
                    .col(ColumnDef::new(JiraIntegrations::SiteUrl).text().not_null())
                    .col(
                        ColumnDef::new(JiraIntegrations::SiteName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JiraIntegrations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(JiraIntegrations::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(JiraIntegrations::ScopesVersion)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(JiraIntegrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(JiraIntegrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One integration per user, enforced at the storage layer.
        manager
            .create_index(
                Index::create()
                    .name("idx_jira_integrations_user_id")
                    .table(JiraIntegrations::Table)
                    .col(JiraIntegrations::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_jira_integrations_user_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(JiraIntegrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum JiraIntegrations {
    Table,
    Id,
    UserId,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    TokenType,
    ExpiresAt,
    CloudId,
    SiteUrl,
    SiteName,
    IsActive,
    LastSyncAt,
    ScopesVersion,
    CreatedAt,
    UpdatedAt,
}
