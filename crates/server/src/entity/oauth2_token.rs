//! OAuth2 Token entity - access and refresh tokens.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// base64url SHA-256 of the access token
    #[sea_orm(unique)]
    pub access_token_hash: String,
    #[sea_orm(unique)]
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub user_id: String,
    #[sea_orm(column_type = "Text")]
    pub scope: String,
    /// `None` for tokens issued without a time bound
    pub access_token_expires_at: Option<OffsetDateTime>,
    pub refresh_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
