use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

use super::shared::{AppliedCoupon, Currency, Tax, TaxType};
use super::{product, product_variant};

/// Shopping cart aggregate. One live row per user or anonymous session;
/// line items live in a document-style Json column so the aggregate is
/// read and written as a unit, like the store it was modeled on.
///
/// Pricing policy fields (`minimum_for_free`, `apply_delivery_charges`,
/// `currency`, `tax_type`, `tax`) are frozen from Settings at creation so
/// later global changes do not retroactively reprice an in-progress cart.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    #[sea_orm(nullable, unique)]
    pub anonymous_id: Option<String>,
    #[sea_orm(nullable, unique)]
    pub user_id: Option<i64>,
    #[sea_orm(column_type = "Json")]
    pub lines: CartLines,
    pub count: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub sub_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub tax_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub delivery_charges: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub grand_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub pay_total: Decimal,
    #[sea_orm(column_type = "Json")]
    pub coupon: AppliedCoupon,
    pub is_wallet_used: bool,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub wallet_amount: Decimal,
    #[sea_orm(nullable)]
    pub address_id: Option<i64>,
    #[sea_orm(nullable)]
    pub slot_key: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub minimum_for_free: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub apply_delivery_charges: Decimal,
    #[sea_orm(column_type = "Json")]
    pub currency: Currency,
    pub tax_type: TaxType,
    #[sea_orm(column_type = "Json")]
    pub tax: Tax,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Ordered set of cart lines (insertion order of distinct SKUs).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct CartLines(pub Vec<CartLine>);

impl CartLines {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CartLine> {
        self.0.iter()
    }
}

/// One product-variant-quantity entry, denormalized for display and for
/// coupon scoping (`type_id`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub title: String,
    pub slug: String,
    pub thumbnail: String,
    pub sku: String,
    pub capacity: String,
    pub selling_price: Decimal,
    pub original_price: Decimal,
    pub discount: i32,
    pub quantity: i32,
    pub total: Decimal,
    pub type_id: i64,
    pub flavour_id: Option<i64>,
    pub occasion_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub eggless: bool,
    /// Set only while reporting a reconciliation result; cleared whenever
    /// the line is rewritten by a cart mutation.
    #[serde(default)]
    pub out_of_stock: bool,
}

impl CartLine {
    /// Build a fresh line from catalog state.
    pub fn build(
        product: &product::Model,
        variant: &product_variant::Model,
        quantity: i32,
        eggless: bool,
    ) -> Self {
        Self {
            product_id: product.id,
            title: product.title.clone(),
            slug: product.slug.clone(),
            thumbnail: product.thumbnail.clone(),
            sku: variant.sku.clone(),
            capacity: variant.capacity.clone(),
            selling_price: variant.selling_price,
            original_price: variant.original_price,
            discount: variant.discount,
            quantity,
            total: variant.selling_price * Decimal::from(quantity),
            type_id: product.type_id,
            flavour_id: product.flavour_id,
            occasion_id: product.occasion_id,
            message: None,
            eggless,
            out_of_stock: false,
        }
    }

    /// Rewrite the line against current variant pricing at the given
    /// quantity, picking up any price drift since it was added.
    pub fn refreshed(&self, variant: &product_variant::Model, quantity: i32) -> Self {
        Self {
            sku: variant.sku.clone(),
            capacity: variant.capacity.clone(),
            selling_price: variant.selling_price,
            original_price: variant.original_price,
            discount: variant.discount,
            quantity,
            total: variant.selling_price * Decimal::from(quantity),
            out_of_stock: false,
            ..self.clone()
        }
    }
}
