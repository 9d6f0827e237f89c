use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entities::{cart::CartLines, coupon, Coupon, CouponKind, CouponModel};
use crate::errors::{ServiceError, ServiceResult};
use crate::services::pricing::round2;

/// Coupon lookup and discount evaluation. Codes are matched
/// case-insensitively; validity windows are exclusive on both ends.
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Look up an active coupon by code and check its validity window.
    pub async fn verify_code(&self, code: &str) -> ServiceResult<CouponModel> {
        let normalized = code.trim().to_lowercase();
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(normalized))
            .filter(coupon::Column::Active.eq(true))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::InvalidCoupon)?;
        ensure_window(&coupon, Utc::now())?;
        Ok(coupon)
    }

    /// Verify the code and compute the absolute discount it grants over
    /// the given lines. Checkout calls this again right before order
    /// creation, so a coupon that expired while sitting in the cart
    /// aborts the checkout instead of silently applying.
    pub async fn discount_for(&self, code: &str, lines: &CartLines) -> ServiceResult<Decimal> {
        let coupon = self.verify_code(code).await?;
        scoped_discount(&coupon, lines)
    }
}

/// The coupon is usable only strictly inside (start_date, end_date).
fn ensure_window(coupon: &CouponModel, now: DateTime<Utc>) -> ServiceResult<()> {
    if now <= coupon.start_date || now >= coupon.end_date {
        return Err(ServiceError::CouponExpired);
    }
    Ok(())
}

/// Discount over the lines whose `type_id` matches the coupon's scope.
/// Percentage coupons are capped at `max_discount`; amount coupons never
/// exceed the scoped subtotal itself.
pub(crate) fn scoped_discount(coupon: &CouponModel, lines: &CartLines) -> ServiceResult<Decimal> {
    let scoped: Decimal = lines
        .iter()
        .filter(|line| line.type_id == coupon.product_type)
        .map(|line| line.total)
        .sum();
    if scoped.is_zero() || scoped < coupon.min_amount {
        return Err(ServiceError::CouponNotApplicable);
    }
    let discount = match coupon.kind {
        CouponKind::Percentage => {
            round2(scoped * coupon.discount / dec!(100)).min(coupon.max_discount)
        }
        CouponKind::Amount => coupon.discount.min(scoped),
    };
    Ok(discount)
}
