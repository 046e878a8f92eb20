//! Database-backed OAuth2 client registrar.

use crate::entity::oauth2_client;
use crate::error::StoreError;
use crate::oauth2::store::{Client, ClientStore};
use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use std::sync::Arc;
use time::OffsetDateTime;

/// Database-backed client registrar for OAuth2.
#[derive(Clone)]
pub struct DbRegistrar {
    db: Arc<DatabaseConnection>,
}

impl DbRegistrar {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Register a client. The secret is hashed before it is stored.
    pub async fn register(
        &self,
        id: &str,
        name: &str,
        secret: &str,
        redirect_uris: &[String],
    ) -> Result<Client, StoreError> {
        let secret_hash = crate::oauth2::secret::hash_secret(secret)
            .map_err(|e| StoreError::Corrupt(format!("cannot hash client secret: {e}")))?;
        let redirect_uris = serde_json::to_string(redirect_uris)
            .map_err(|e| StoreError::Corrupt(format!("cannot encode redirect URIs: {e}")))?;
        let now = OffsetDateTime::now_utc();
        let model = oauth2_client::ActiveModel {
            id: Set(id.to_string()),
            secret_hash: Set(secret_hash),
            name: Set(name.to_string()),
            redirect_uris: Set(redirect_uris),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;
        tracing::info!(client_id = %model.id, "registered OAuth2 client");
        Ok(model.into())
    }
}

#[async_trait]
impl ClientStore for DbRegistrar {
    async fn lookup(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(oauth2_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?
            .map(Client::from))
    }
}
