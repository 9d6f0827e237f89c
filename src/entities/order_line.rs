use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use super::cart::CartLine;

/// Frozen snapshot of one cart line at the moment an order was placed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub title: String,
    pub slug: String,
    pub thumbnail: String,
    pub sku: String,
    pub capacity: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub selling_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub original_price: Decimal,
    pub discount: i32,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    pub type_id: i64,
    #[sea_orm(nullable)]
    pub flavour_id: Option<i64>,
    #[sea_orm(nullable)]
    pub occasion_id: Option<i64>,
    #[sea_orm(nullable)]
    pub message: Option<String>,
    pub eggless: bool,
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    /// Snapshot a cart line for the given order.
    pub fn from_cart_line(order_id: i64, line: &CartLine) -> Self {
        Self {
            order_id: Set(order_id),
            product_id: Set(line.product_id),
            title: Set(line.title.clone()),
            slug: Set(line.slug.clone()),
            thumbnail: Set(line.thumbnail.clone()),
            sku: Set(line.sku.clone()),
            capacity: Set(line.capacity.clone()),
            selling_price: Set(line.selling_price),
            original_price: Set(line.original_price),
            discount: Set(line.discount),
            quantity: Set(line.quantity),
            total: Set(line.total),
            type_id: Set(line.type_id),
            flavour_id: Set(line.flavour_id),
            occasion_id: Set(line.occasion_id),
            message: Set(line.message.clone()),
            eggless: Set(line.eggless),
            is_cancelled: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
    }
}
