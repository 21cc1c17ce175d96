use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Single-use login codes. `used` flips irreversibly on a successful verify;
/// issuing a new code deletes the previous unused ones for the same email.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "otp_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub email: String,
    /// 6 decimal digits
    pub code: String,
    pub user_id: Option<i32>,
    pub expires_at: DateTimeWithTimeZone,
    pub used: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
