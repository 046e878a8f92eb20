//! Database-backed account directory and root key storage.

use crate::entity::{api_key, oauth2_user, project_member};
use crate::error::StoreError;
use crate::oauth2::secret::random_bytes;
use crate::oauth2::store::{RootKey, RootKeyStore, User, UserDirectory};
use async_trait::async_trait;
use base64::Engine;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone)]
pub struct DbUserDirectory {
    db: Arc<DatabaseConnection>,
}

impl DbUserDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(oauth2_user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .map(User::from))
    }

    async fn is_project_member(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(
            project_member::Entity::find_by_id((project_id.to_string(), user_id.to_string()))
                .one(self.db.as_ref())
                .await?
                .is_some(),
        )
    }
}

#[derive(Clone)]
pub struct DbRootKeyStore {
    db: Arc<DatabaseConnection>,
}

impl DbRootKeyStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RootKeyStore for DbRootKeyStore {
    async fn get_or_create(
        &self,
        project_id: &str,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<RootKey, StoreError> {
        let existing = api_key::Entity::find()
            .filter(api_key::Column::ProjectId.eq(project_id))
            .filter(api_key::Column::UserId.eq(user_id))
            .order_by_asc(api_key::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?;
        if let Some(model) = existing {
            return RootKey::try_from(model);
        }

        let secret = random_bytes()
            .map_err(|e| StoreError::Corrupt(format!("cannot generate root key: {e}")))?;
        let model = api_key::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            project_id: Set(project_id.to_string()),
            user_id: Set(user_id.to_string()),
            secret: Set(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(secret)),
            created_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;
        tracing::info!(key_id = %model.id, project_id, user_id, "created root key");
        RootKey::try_from(model)
    }

    async fn get(&self, key_id: &str) -> Result<Option<RootKey>, StoreError> {
        api_key::Entity::find_by_id(key_id)
            .one(self.db.as_ref())
            .await?
            .map(RootKey::try_from)
            .transpose()
    }
}
