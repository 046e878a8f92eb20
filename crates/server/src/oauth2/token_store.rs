//! SeaORM implementation of the token store.
//!
//! Redemption and rotation run inside a transaction whose first statement is
//! a conditional delete/update. Its `rows_affected` decides the winner when
//! the same code or refresh token is presented concurrently.

use crate::entity::{oauth2_authorization, oauth2_token};
use crate::error::StoreError;
use crate::oauth2::store::{AuthorizationCode, TokenInfo, TokenStore, access_token_hash};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait, sea_query::Expr,
};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct DbTokenStore {
    db: Arc<DatabaseConnection>,
}

impl DbTokenStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn token_model(token: &TokenInfo) -> oauth2_token::ActiveModel {
    oauth2_token::ActiveModel {
        id: Set(token.id.clone()),
        access_token_hash: Set(token.access_token_hash.clone()),
        refresh_token: Set(token.refresh_token.clone()),
        client_id: Set(token.client_id.clone()),
        user_id: Set(token.user_id.clone()),
        scope: Set(token.scope.clone()),
        access_token_expires_at: Set(token.access_expires_at),
        refresh_token_expires_at: Set(token.refresh_expires_at),
        created_at: Set(token.created_at),
        revoked_at: Set(token.revoked_at),
    }
}

async fn insert_token<C: ConnectionTrait>(conn: &C, token: &TokenInfo) -> Result<(), StoreError> {
    token_model(token).insert(conn).await?;
    Ok(())
}

#[async_trait]
impl TokenStore for DbTokenStore {
    async fn save_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        oauth2_authorization::ActiveModel {
            code: Set(code.code.clone()),
            client_id: Set(code.client_id.clone()),
            user_id: Set(code.user_id.clone()),
            redirect_uri: Set(code.redirect_uri.clone()),
            scope: Set(code.scope.clone()),
            expires_at: Set(code.expires_at),
            created_at: Set(code.created_at),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(())
    }

    async fn get_by_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let Some(found) = oauth2_authorization::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await?
            .map(AuthorizationCode::from)
        else {
            return Ok(None);
        };

        if found.is_expired(now) {
            // Lazy eviction; a concurrent redemption may already have removed it.
            oauth2_authorization::Entity::delete_by_id(code)
                .exec(self.db.as_ref())
                .await?;
            return Ok(None);
        }
        Ok(Some(found))
    }

    async fn redeem_code(&self, code: &str, token: &TokenInfo) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        let consumed = oauth2_authorization::Entity::delete_many()
            .filter(oauth2_authorization::Column::Code.eq(code))
            .exec(&txn)
            .await?;
        if consumed.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }

        insert_token(&txn, token).await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn save_token(&self, token: &TokenInfo) -> Result<(), StoreError> {
        insert_token(self.db.as_ref(), token).await
    }

    async fn get_by_access(
        &self,
        access_token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<TokenInfo>, StoreError> {
        let token = oauth2_token::Entity::find()
            .filter(oauth2_token::Column::AccessTokenHash.eq(access_token_hash(access_token)))
            .one(self.db.as_ref())
            .await?
            .map(TokenInfo::from);
        Ok(token.filter(|t| !t.is_revoked() && !t.is_access_expired(now)))
    }

    async fn get_by_refresh(
        &self,
        refresh_token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<TokenInfo>, StoreError> {
        let token = oauth2_token::Entity::find()
            .filter(oauth2_token::Column::RefreshToken.eq(refresh_token))
            .one(self.db.as_ref())
            .await?
            .map(TokenInfo::from);
        Ok(token.filter(|t| !t.is_revoked() && !t.is_refresh_expired(now)))
    }

    async fn rotate_refresh(
        &self,
        old_refresh: &str,
        token: &TokenInfo,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        let revoked = oauth2_token::Entity::update_many()
            .col_expr(oauth2_token::Column::RevokedAt, Expr::value(now))
            .filter(oauth2_token::Column::RefreshToken.eq(old_refresh))
            .filter(oauth2_token::Column::RevokedAt.is_null())
            .exec(&txn)
            .await?;
        if revoked.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }

        insert_token(&txn, token).await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn revoke(
        &self,
        token: &str,
        client_id: &str,
        prefer_refresh: bool,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let by_access = oauth2_token::Column::AccessTokenHash.eq(access_token_hash(token));
        let by_refresh = oauth2_token::Column::RefreshToken.eq(token);
        let (first, second) = if prefer_refresh {
            (by_refresh, by_access)
        } else {
            (by_access, by_refresh)
        };

        let mut found = oauth2_token::Entity::find()
            .filter(first)
            .one(self.db.as_ref())
            .await?;
        if found.is_none() {
            found = oauth2_token::Entity::find()
                .filter(second)
                .one(self.db.as_ref())
                .await?;
        }

        let Some(found) = found else {
            return Ok(false);
        };
        if found.client_id != client_id || found.revoked_at.is_some() {
            return Ok(false);
        }

        let mut active: oauth2_token::ActiveModel = found.into();
        active.revoked_at = Set(Some(now));
        active.update(self.db.as_ref()).await?;
        Ok(true)
    }
}
