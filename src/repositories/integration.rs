//! Jira integration repository for database operations
//!
//! This module provides the IntegrationRepository struct which encapsulates
//! SeaORM operations for the jira_integrations table. Tokens are sealed on
//! the way in and opened on the way out; ciphertext never leaves this layer
//! in decrypted form except through [`IntegrationRepository::open_tokens`].

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CryptoError, CryptoKey, open_token, seal_token};
use crate::models::integration::{self, CURRENT_SCOPES_VERSION, Entity as JiraIntegration};

/// Fields persisted when a link completes or re-completes.
#[derive(Debug, Clone)]
pub struct LinkedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub cloud_id: String,
    pub site_url: String,
    pub site_name: String,
}

/// Repository for jira_integrations database operations
#[derive(Debug, Clone)]
pub struct IntegrationRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Crypto key for token sealing
    pub crypto_key: CryptoKey,
}

impl IntegrationRepository {
    /// Creates a new IntegrationRepository instance
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Finds the integration owned by a user
    pub async fn find_by_user(&self, user_id: &Uuid) -> Result<Option<integration::Model>> {
        Ok(JiraIntegration::find()
            .filter(integration::Column::UserId.eq(*user_id))
            .one(&*self.db)
            .await?)
    }

    /// Upserts the integration for a user after a completed OAuth exchange.
    ///
    /// Re-linking overwrites tokens, expiry and site metadata on the existing
    /// row rather than creating a second record; the unique index on
    /// `user_id` backs this invariant at the storage layer.
    pub async fn upsert_linked(
        &self,
        user_id: &Uuid,
        tokens: LinkedTokens,
    ) -> Result<integration::Model> {
        let access_cipher = seal_token(&self.crypto_key, &tokens.access_token)
            .map_err(|e| anyhow!("Token sealing failed: {}", e))?;
        let refresh_cipher = seal_token(&self.crypto_key, &tokens.refresh_token)
            .map_err(|e| anyhow!("Token sealing failed: {}", e))?;

        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        if let Some(existing) = self.find_by_user(user_id).await? {
            let mut model: integration::ActiveModel = existing.into();
            model.access_token_ciphertext = Set(access_cipher);
            model.refresh_token_ciphertext = Set(refresh_cipher);
            model.token_type = Set(tokens.token_type);
            model.expires_at = Set(tokens.expires_at.into());
            model.cloud_id = Set(tokens.cloud_id);
            model.site_url = Set(tokens.site_url);
            model.site_name = Set(tokens.site_name);
            model.is_active = Set(true);
            model.scopes_version = Set(CURRENT_SCOPES_VERSION);
            model.updated_at = Set(now);
            return Ok(model.update(&*self.db).await?);
        }

        let id = Uuid::new_v4();
        let active = integration::ActiveModel {
            id: Set(id),
            user_id: Set(*user_id),
            access_token_ciphertext: Set(access_cipher),
            refresh_token_ciphertext: Set(refresh_cipher),
            token_type: Set(tokens.token_type),
            expires_at: Set(tokens.expires_at.into()),
            cloud_id: Set(tokens.cloud_id),
            site_url: Set(tokens.site_url),
            site_name: Set(tokens.site_name),
            is_active: Set(true),
            last_sync_at: Set(None),
            scopes_version: Set(CURRENT_SCOPES_VERSION),
            created_at: Set(now),
            updated_at: Set(now),
        };
        active.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = JiraIntegration::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("integration not persisted"))
    }

    /// Replaces the token pair and expiry after a successful refresh
    pub async fn update_tokens(
        &self,
        id: &Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<integration::Model> {
        let access_cipher = seal_token(&self.crypto_key, access_token)
            .map_err(|e| anyhow!("Token sealing failed: {}", e))?;
        let refresh_cipher = seal_token(&self.crypto_key, refresh_token)
            .map_err(|e| anyhow!("Token sealing failed: {}", e))?;

        let existing = self.get_by_id(id).await?;
        let mut model: integration::ActiveModel = existing.into();
        model.access_token_ciphertext = Set(access_cipher);
        model.refresh_token_ciphertext = Set(refresh_cipher);
        model.expires_at = Set(expires_at.into());
        model.is_active = Set(true);
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Flags the integration as unusable until the user re-authenticates
    pub async fn mark_inactive(&self, id: &Uuid) -> Result<integration::Model> {
        let existing = self.get_by_id(id).await?;
        let mut model: integration::ActiveModel = existing.into();
        model.is_active = Set(false);
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Records a successful data pull
    pub async fn touch_last_sync(&self, id: &Uuid) -> Result<integration::Model> {
        let existing = self.get_by_id(id).await?;
        let mut model: integration::ActiveModel = existing.into();
        model.last_sync_at = Set(Some(Utc::now().into()));
        model.updated_at = Set(Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    /// Hard-deletes the integration for a user; returns whether one existed
    pub async fn delete_by_user(&self, user_id: &Uuid) -> Result<bool> {
        let result = JiraIntegration::delete_many()
            .filter(integration::Column::UserId.eq(*user_id))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Opens the sealed token pair of an integration
    pub fn open_tokens(
        &self,
        integration: &integration::Model,
    ) -> Result<(String, String), CryptoError> {
        let access = open_token(&self.crypto_key, &integration.access_token_ciphertext)
            .inspect_err(|_| {
                tracing::error!(
                    user_id = %integration.user_id,
                    integration_id = %integration.id,
                    "Access token decryption failed"
                );
            })?;
        let refresh = open_token(&self.crypto_key, &integration.refresh_token_ciphertext)
            .inspect_err(|_| {
                tracing::error!(
                    user_id = %integration.user_id,
                    integration_id = %integration.id,
                    "Refresh token decryption failed"
                );
            })?;

        Ok((access, refresh))
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<integration::Model> {
        JiraIntegration::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Integration '{}' not found", id))
    }
}
