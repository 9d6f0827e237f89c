use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait, Unchanged,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::entities::{
    address, cart,
    cart::{CartLine, CartLines},
    Address, AppliedCoupon, Cart, CartModel, Setting,
};
use crate::errors::{ServiceError, ServiceResult};
use crate::events::{Event, EventSender};
use crate::services::availability::{AvailabilityService, Reconciliation};
use crate::services::catalog::CatalogService;
use crate::services::coupons::CouponService;
use crate::services::pricing;
use crate::services::sequences;
use crate::services::slots::SlotService;
use crate::services::wallet::WalletService;

/// Set a line to an absolute quantity. Zero removes the line.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertLineRequest {
    pub product_id: i64,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(range(min = 0, max = 50))]
    pub quantity: i32,
    #[serde(default)]
    pub eggless: bool,
}

/// Cart lifecycle and mutation. One live cart per user or anonymous
/// session; every mutation reprices before persisting so stored totals
/// are never stale.
pub struct CartService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<CatalogService>,
    availability: Arc<AvailabilityService>,
    coupons: Arc<CouponService>,
    wallet: Arc<WalletService>,
    slots: Arc<SlotService>,
    events: EventSender,
}

impl CartService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<CatalogService>,
        availability: Arc<AvailabilityService>,
        coupons: Arc<CouponService>,
        wallet: Arc<WalletService>,
        slots: Arc<SlotService>,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            catalog,
            availability,
            coupons,
            wallet,
            slots,
            events,
        }
    }

    async fn find(
        &self,
        user_id: Option<i64>,
        anonymous_id: Option<&str>,
    ) -> ServiceResult<Option<CartModel>> {
        if let Some(user_id) = user_id {
            Ok(Cart::find()
                .filter(cart::Column::UserId.eq(user_id))
                .one(&*self.db)
                .await?)
        } else if let Some(anonymous_id) = anonymous_id {
            Ok(Cart::find()
                .filter(cart::Column::AnonymousId.eq(anonymous_id))
                .one(&*self.db)
                .await?)
        } else {
            Err(ServiceError::ValidationError(
                "a user or anonymous cart id is required".to_string(),
            ))
        }
    }

    /// Return the caller's cart, creating an empty one on first touch.
    /// Creation snapshots the current store policy into the cart.
    pub async fn get_or_create(
        &self,
        user_id: Option<i64>,
        anonymous_id: Option<&str>,
    ) -> ServiceResult<CartModel> {
        if let Some(cart) = self.find(user_id, anonymous_id).await? {
            return Ok(cart);
        }
        match self.create(user_id, anonymous_id).await {
            Ok(cart) => Ok(cart),
            // Lost a creation race against another request for the same
            // identity; the row that won the unique index wins.
            Err(create_err) => match self.find(user_id, anonymous_id).await? {
                Some(cart) => Ok(cart),
                None => Err(create_err),
            },
        }
    }

    async fn create(
        &self,
        user_id: Option<i64>,
        anonymous_id: Option<&str>,
    ) -> ServiceResult<CartModel> {
        if user_id.is_none() && anonymous_id.is_none() {
            return Err(ServiceError::ValidationError(
                "a user or anonymous cart id is required".to_string(),
            ));
        }
        let settings = Setting::find()
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::InternalError("store settings not seeded".to_string()))?;
        let txn = self.db.begin().await?;
        let id = sequences::next_id(&txn, sequences::CART).await?;
        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(id),
            anonymous_id: Set(anonymous_id.map(str::to_string)),
            user_id: Set(user_id),
            lines: Set(CartLines::default()),
            count: Set(0),
            sub_total: Set(Decimal::ZERO),
            tax_price: Set(Decimal::ZERO),
            delivery_charges: Set(Decimal::ZERO),
            grand_total: Set(Decimal::ZERO),
            pay_total: Set(Decimal::ZERO),
            coupon: Set(AppliedCoupon::default()),
            is_wallet_used: Set(false),
            wallet_amount: Set(Decimal::ZERO),
            address_id: Set(None),
            slot_key: Set(None),
            minimum_for_free: Set(settings.minimum_for_free),
            apply_delivery_charges: Set(settings.delivery_charges),
            currency: Set(settings.currency),
            tax_type: Set(settings.tax_type),
            tax: Set(settings.tax),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;
        info!(cart_id = cart.id, "created cart");
        Ok(cart)
    }

    /// Current cart, reconciled against the catalog so the client sees
    /// up-to-date prices and any lines that have gone out of stock.
    pub async fn current(
        &self,
        user_id: Option<i64>,
        anonymous_id: Option<&str>,
    ) -> ServiceResult<CartModel> {
        let cart = self.get_or_create(user_id, anonymous_id).await?;
        if cart.lines.is_empty() {
            return Ok(cart);
        }
        let reconciled = self.availability.reconcile(&cart.lines).await?;
        self.store_lines(cart, reconciled.lines).await
    }

    /// Reconcile without side effects on adjustments: returns whether
    /// every line is still fulfillable, persisting refreshed lines.
    pub async fn check(
        &self,
        user_id: Option<i64>,
        anonymous_id: Option<&str>,
    ) -> ServiceResult<(CartModel, bool)> {
        let cart = self.get_or_create(user_id, anonymous_id).await?;
        if cart.lines.is_empty() {
            return Ok((cart, true));
        }
        let Reconciliation { ok, lines } = self.availability.reconcile(&cart.lines).await?;
        let cart = self.store_lines(cart, lines).await?;
        Ok((cart, ok))
    }

    /// Add, change or remove one line. The quantity is absolute, not a
    /// delta; zero removes the line. Any applied coupon or wallet amount
    /// is dropped because the basket it was computed for changed.
    pub async fn upsert_line(
        &self,
        user_id: Option<i64>,
        anonymous_id: Option<&str>,
        request: UpsertLineRequest,
    ) -> ServiceResult<CartModel> {
        request.validate()?;
        let (product, variants) = self
            .catalog
            .get_active_with_variants(request.product_id)
            .await?
            .ok_or(ServiceError::ProductUnavailable)?;
        let variant = variants
            .iter()
            .find(|v| v.sku == request.sku)
            .ok_or(ServiceError::ProductUnavailable)?;
        if request.quantity > 0 {
            if variant.stock == 0 {
                return Err(ServiceError::ProductUnavailable);
            }
            if request.quantity > variant.stock {
                return Err(ServiceError::InsufficientStock {
                    name: product.title.clone(),
                    stock: variant.stock,
                });
            }
        }

        let mut cart = self.get_or_create(user_id, anonymous_id).await?;
        let mut lines = cart.lines.0;
        let existing = lines
            .iter()
            .position(|l| l.product_id == request.product_id && l.sku == request.sku);
        match (existing, request.quantity) {
            (Some(i), 0) => {
                lines.remove(i);
            }
            (None, 0) => {}
            (Some(i), quantity) => {
                // Keep the cake message across quantity changes.
                let message = lines[i].message.clone();
                let mut line = CartLine::build(&product, variant, quantity, request.eggless);
                line.message = message;
                lines[i] = line;
            }
            (None, quantity) => {
                lines.push(CartLine::build(&product, variant, quantity, request.eggless));
            }
        }
        cart.lines = CartLines(lines);
        cart.coupon.clear();
        cart.is_wallet_used = false;
        cart.wallet_amount = Decimal::ZERO;
        let cart = self.reprice_and_persist(cart).await?;
        self.events.send_or_log(Event::CartUpdated(cart.id)).await;
        Ok(cart)
    }

    /// Fold an anonymous cart into the user's cart at login. The union
    /// is keyed by product id and the user's line wins a conflict.
    pub async fn merge_anonymous(
        &self,
        user_id: i64,
        anonymous_id: &str,
    ) -> ServiceResult<CartModel> {
        let anonymous = self.find(None, Some(anonymous_id)).await?;
        let owned = self.find(Some(user_id), None).await?;
        match (owned, anonymous) {
            (None, None) => self.get_or_create(Some(user_id), None).await,
            (Some(cart), None) => Ok(cart),
            (None, Some(anonymous)) => {
                // Adopt the anonymous cart wholesale.
                let adopted = cart::ActiveModel {
                    id: Unchanged(anonymous.id),
                    anonymous_id: Set(None),
                    user_id: Set(Some(user_id)),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                }
                .update(&*self.db)
                .await?;
                Ok(adopted)
            }
            (Some(mut owned), Some(anonymous)) => {
                let mut lines = owned.lines.0;
                for line in anonymous.lines.iter() {
                    let conflict = lines.iter().any(|l| l.product_id == line.product_id);
                    if !conflict {
                        lines.push(line.clone());
                    }
                }
                Cart::delete_by_id(anonymous.id).exec(&*self.db).await?;
                owned.lines = CartLines(lines);
                owned.coupon.clear();
                owned.is_wallet_used = false;
                owned.wallet_amount = Decimal::ZERO;
                self.reprice_and_persist(owned).await
            }
        }
    }

    /// Apply a coupon to a non-empty cart. The discount is evaluated
    /// against the current lines and clamped so it never exceeds what
    /// the user would otherwise pay.
    pub async fn apply_coupon(&self, user_id: i64, code: &str) -> ServiceResult<CartModel> {
        let mut cart = self.require_user_cart(user_id).await?;
        let discount = self.coupons.discount_for(code, &cart.lines).await?;

        // Reprice once without the coupon to learn the payable amount
        // the discount must be clamped to.
        cart.coupon = AppliedCoupon {
            code: Some(code.trim().to_lowercase()),
            discount: Decimal::ZERO,
        };
        pricing::reprice(&mut cart);
        cart.coupon.discount = discount.min(cart.pay_total);
        let cart = self.reprice_and_persist(cart).await?;
        self.events
            .send_or_log(Event::CouponApplied {
                cart_id: cart.id,
                code: code.trim().to_lowercase(),
            })
            .await;
        Ok(cart)
    }

    pub async fn remove_coupon(&self, user_id: i64) -> ServiceResult<CartModel> {
        let mut cart = self.require_user_cart(user_id).await?;
        cart.coupon.clear();
        self.reprice_and_persist(cart).await
    }

    /// Put the user's wallet balance toward the cart, capped at the
    /// grand total.
    pub async fn apply_wallet(&self, user_id: i64) -> ServiceResult<CartModel> {
        let mut cart = self.require_user_cart(user_id).await?;
        let balance = self.wallet.balance(user_id).await?;
        if balance <= Decimal::ZERO {
            return Err(ServiceError::InsufficientWalletBalance);
        }
        cart.is_wallet_used = true;
        cart.wallet_amount = balance;
        self.reprice_and_persist(cart).await
    }

    pub async fn remove_wallet(&self, user_id: i64) -> ServiceResult<CartModel> {
        let mut cart = self.require_user_cart(user_id).await?;
        cart.is_wallet_used = false;
        cart.wallet_amount = Decimal::ZERO;
        self.reprice_and_persist(cart).await
    }

    /// Select a delivery address the user owns.
    pub async fn set_address(&self, user_id: i64, address_id: i64) -> ServiceResult<CartModel> {
        let owned = Address::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;
        if owned.is_none() {
            return Err(ServiceError::AddressNotFound);
        }
        let mut cart = self.require_user_cart(user_id).await?;
        cart.address_id = Some(address_id);
        self.reprice_and_persist(cart).await
    }

    /// Select a delivery slot; the key must name an open window.
    pub async fn set_slot(&self, user_id: i64, slot_key: &str) -> ServiceResult<CartModel> {
        self.slots.verify(slot_key, Utc::now()).await?;
        let mut cart = self.require_user_cart(user_id).await?;
        cart.slot_key = Some(slot_key.to_string());
        self.reprice_and_persist(cart).await
    }

    /// Attach a cake message to the line with the given SKU.
    pub async fn set_message(
        &self,
        user_id: i64,
        sku: &str,
        message: &str,
    ) -> ServiceResult<CartModel> {
        let mut cart = self.require_user_cart(user_id).await?;
        let line = cart
            .lines
            .0
            .iter_mut()
            .find(|l| l.sku == sku)
            .ok_or_else(|| ServiceError::NotFound("Cart item".to_string()))?;
        line.message = if message.is_empty() {
            None
        } else {
            Some(message.to_string())
        };
        self.reprice_and_persist(cart).await
    }

    /// The user's cart, which must exist and hold at least one line.
    pub async fn require_user_cart(&self, user_id: i64) -> ServiceResult<CartModel> {
        match self.find(Some(user_id), None).await? {
            Some(cart) if !cart.lines.is_empty() => Ok(cart),
            _ => Err(ServiceError::EmptyCart),
        }
    }

    async fn store_lines(&self, mut cart: CartModel, lines: CartLines) -> ServiceResult<CartModel> {
        cart.lines = lines;
        self.reprice_and_persist(cart).await
    }

    pub(crate) async fn reprice_and_persist(&self, mut cart: CartModel) -> ServiceResult<CartModel> {
        pricing::reprice(&mut cart);
        let updated = cart::ActiveModel {
            id: Unchanged(cart.id),
            lines: Set(cart.lines),
            count: Set(cart.count),
            sub_total: Set(cart.sub_total),
            tax_price: Set(cart.tax_price),
            delivery_charges: Set(cart.delivery_charges),
            grand_total: Set(cart.grand_total),
            pay_total: Set(cart.pay_total),
            coupon: Set(cart.coupon),
            is_wallet_used: Set(cart.is_wallet_used),
            wallet_amount: Set(cart.wallet_amount),
            address_id: Set(cart.address_id),
            slot_key: Set(cart.slot_key),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(updated)
    }
}
