//! SeaORM Entity for catalog products.
//!
//! Stock is only ever decremented through a conditional update
//! (`stock = stock - qty WHERE stock >= qty`), never a plain write.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// URL slug derived from the name, unique
    pub slug: String,
    pub description: Option<String>,
    pub sku: String,
    pub price: Decimal,
    /// Struck-through list price, shown when higher than `price`
    pub compare_at_price: Option<Decimal>,
    pub stock: i32,
    pub low_stock_threshold: i32,
    pub category_id: i32,
    pub is_active: bool,
    pub is_featured: bool,
    /// Tag strings as a JSON array
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::categories::Entity",
        from = "Column::CategoryId",
        to = "super::categories::Column::Id"
    )]
    Category,
    #[sea_orm(has_many = "super::product_images::Entity")]
    Images,
}

impl Related<super::categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::product_images::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
