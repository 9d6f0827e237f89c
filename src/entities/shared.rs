use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Store currency, snapshotted into carts and orders at creation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Currency {
    pub code: String,
    pub symbol: String,
}

impl Default for Currency {
    fn default() -> Self {
        Self {
            code: "USD".to_string(),
            symbol: "$".to_string(),
        }
    }
}

/// Named tax rate, snapshotted alongside [`TaxType`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Tax {
    pub title: String,
    pub percent: Decimal,
}

/// Whether tax is embedded in the selling price or charged on top of it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "UPPERCASE")]
pub enum TaxType {
    #[sea_orm(string_value = "included")]
    Included,
    #[sea_orm(string_value = "excluded")]
    Excluded,
}

/// Coupon applied to a cart: the code plus the already-computed absolute
/// discount amount (not the coupon's raw percentage).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct AppliedCoupon {
    pub code: Option<String>,
    pub discount: Decimal,
}

impl AppliedCoupon {
    pub fn clear(&mut self) {
        self.code = None;
        self.discount = Decimal::ZERO;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}
