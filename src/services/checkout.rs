use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::{info, warn};

use crate::entities::{
    address, order, order_line, user, Address, Cart, OrderStatus, OrderUser, PaymentMethod,
    PaymentStatus, User,
};
use crate::errors::{ServiceError, ServiceResult};
use crate::events::{Event, EventSender};
use crate::services::availability::AvailabilityService;
use crate::services::carts::CartService;
use crate::services::catalog::CatalogService;
use crate::services::coupons::CouponService;
use crate::services::orders::OrderService;
use crate::services::payments::{PaymentProvider, PaymentState};
use crate::services::pricing;
use crate::services::sequences;
use crate::services::slots::SlotService;
use crate::services::wallet::WalletService;

/// What the client must do next after an order was created.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Cash on delivery: nothing left to do.
    Placed { order_id: i64 },
    /// Card on web: redirect to the hosted payment page.
    RedirectToPayment { order_id: i64, session_id: String },
    /// Card on mobile: confirm the intent in-app.
    CollectPayment {
        order_id: i64,
        client_secret: String,
    },
}

/// Turns a validated cart into an order.
///
/// All checks run before anything is written; the writes themselves
/// (order, lines, stock, wallet, cart removal) happen in one
/// transaction, so a failed stock guard leaves no partial order behind.
/// Payment initiation runs after commit; its failure leaves a pending,
/// still-payable order.
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    carts: Arc<CartService>,
    availability: Arc<AvailabilityService>,
    coupons: Arc<CouponService>,
    wallet: Arc<WalletService>,
    catalog: Arc<CatalogService>,
    slots: Arc<SlotService>,
    orders: Arc<OrderService>,
    payments: Arc<dyn PaymentProvider>,
    events: EventSender,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: Arc<CartService>,
        availability: Arc<AvailabilityService>,
        coupons: Arc<CouponService>,
        wallet: Arc<WalletService>,
        catalog: Arc<CatalogService>,
        slots: Arc<SlotService>,
        orders: Arc<OrderService>,
        payments: Arc<dyn PaymentProvider>,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            carts,
            availability,
            coupons,
            wallet,
            catalog,
            slots,
            orders,
            payments,
            events,
        }
    }

    pub async fn place_order(
        &self,
        user_id: i64,
        method: PaymentMethod,
        is_web: bool,
    ) -> ServiceResult<CheckoutOutcome> {
        let mut cart = self.carts.require_user_cart(user_id).await?;

        // Final availability pass. A dead line aborts the checkout; the
        // flags are persisted so the client can show which lines failed.
        let reconciled = self.availability.reconcile(&cart.lines).await?;
        cart.lines = reconciled.lines;
        if !reconciled.ok {
            self.carts.reprice_and_persist(cart).await?;
            return Err(ServiceError::ProductUnavailable);
        }

        let address_id = cart.address_id.ok_or(ServiceError::AddressNotFound)?;
        let address = Address::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::AddressNotFound)?;

        let slot_key = cart.slot_key.clone().ok_or(ServiceError::SlotUnavailable)?;
        let slot = self.slots.verify(&slot_key, Utc::now()).await?;

        // Re-evaluate the coupon against the reconciled lines; a coupon
        // that expired in the meantime aborts rather than misprices.
        if let Some(code) = cart.coupon.code.clone() {
            cart.coupon.discount = self.coupons.discount_for(&code, &cart.lines).await?;
        }
        pricing::reprice(&mut cart);

        if cart.is_wallet_used && cart.wallet_amount > Decimal::ZERO {
            let balance = self.wallet.balance(user_id).await?;
            if balance < cart.wallet_amount {
                return Err(ServiceError::InsufficientWalletBalance);
            }
        }

        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        let txn = self.db.begin().await?;
        let order_id = sequences::next_id(&txn, sequences::ORDER).await?;
        let now = Utc::now();
        // A fully wallet-covered cash order has nothing left to collect.
        let payment_status = if method == PaymentMethod::Cod && cart.pay_total.is_zero() {
            PaymentStatus::Success
        } else {
            PaymentStatus::Pending
        };
        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            user: Set(OrderUser::from(&user)),
            delivery_address: Set((&address).into()),
            slot: Set(slot),
            count: Set(cart.count),
            sub_total: Set(cart.sub_total),
            tax_price: Set(cart.tax_price),
            delivery_charges: Set(cart.delivery_charges),
            grand_total: Set(cart.grand_total),
            pay_total: Set(cart.pay_total),
            coupon: Set(cart.coupon.clone()),
            currency: Set(cart.currency.clone()),
            tax_type: Set(cart.tax_type),
            tax: Set(cart.tax.clone()),
            method: Set(method),
            status: Set(OrderStatus::Pending),
            payment_status: Set(payment_status),
            payment_id: Set(None),
            is_web: Set(Some(is_web)),
            is_wallet_used: Set(cart.is_wallet_used),
            wallet_amount: Set(cart.wallet_amount),
            is_assigned: Set(false),
            delivery_accepted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        for line in cart.lines.iter() {
            order_line::ActiveModel::from_cart_line(order_id, line)
                .insert(&txn)
                .await?;
        }
        for line in cart.lines.iter() {
            let taken = self
                .catalog
                .decrement_stock(&txn, line.product_id, &line.sku, line.quantity)
                .await?;
            if !taken {
                // Raced another checkout between reconcile and here.
                txn.rollback().await?;
                warn!(order_id, sku = %line.sku, "stock guard failed, checkout rolled back");
                return Err(ServiceError::ProductUnavailable);
            }
        }
        if cart.is_wallet_used && cart.wallet_amount > Decimal::ZERO {
            self.wallet
                .debit(&txn, user_id, order_id, cart.wallet_amount, "order payment")
                .await?;
        }
        User::update_many()
            .col_expr(
                user::Column::Purchased,
                Expr::col(user::Column::Purchased).add(1),
            )
            .filter(user::Column::Id.eq(user_id))
            .exec(&txn)
            .await?;
        Cart::delete_by_id(cart.id).exec(&txn).await?;
        txn.commit().await?;
        info!(order_id, user_id, ?method, "order placed");

        self.events
            .send_or_log(Event::OrderPlaced { order_id, user_id })
            .await;
        for line in cart.lines.iter() {
            self.events
                .send_or_log(Event::StockDecremented {
                    product_id: line.product_id,
                    sku: line.sku.clone(),
                    quantity: line.quantity,
                })
                .await;
        }
        if cart.is_wallet_used && cart.wallet_amount > Decimal::ZERO {
            self.events
                .send_or_log(Event::WalletDebited { user_id, order_id })
                .await;
        }

        match method {
            PaymentMethod::Cod => {
                self.orders
                    .notify(user_id, order_id, OrderStatus::Pending)
                    .await;
                Ok(CheckoutOutcome::Placed { order_id })
            }
            PaymentMethod::Card => {
                self.initiate_card_payment(&cart, order_id, &user, is_web)
                    .await
            }
        }
    }

    async fn initiate_card_payment(
        &self,
        cart: &crate::entities::CartModel,
        order_id: i64,
        user: &user::Model,
        is_web: bool,
    ) -> ServiceResult<CheckoutOutcome> {
        let amount_minor = (cart.pay_total * dec!(100))
            .round()
            .to_i64()
            .ok_or_else(|| {
                ServiceError::InternalError("pay total does not fit in minor units".to_string())
            })?;
        let currency = cart.currency.code.clone();
        if is_web {
            let session = self
                .payments
                .create_session(amount_minor, &currency, order_id, user.id)
                .await?;
            self.orders
                .update_payment(order_id, &session.id, true)
                .await?;
            Ok(CheckoutOutcome::RedirectToPayment {
                order_id,
                session_id: session.id,
            })
        } else {
            let intent = self
                .payments
                .create_intent(
                    amount_minor,
                    &currency,
                    &format!("Order #{}", order_id),
                    Some(&user.email),
                )
                .await?;
            self.orders
                .update_payment(order_id, &intent.id, false)
                .await?;
            Ok(CheckoutOutcome::CollectPayment {
                order_id,
                client_secret: intent.client_secret,
            })
        }
    }

    /// Poll the provider for a pending card payment and record the
    /// outcome on the order.
    pub async fn payment_status(
        &self,
        user_id: i64,
        payment_id: &str,
    ) -> ServiceResult<(crate::entities::OrderModel, PaymentStatus)> {
        let order = self.orders.find_by_payment(user_id, payment_id).await?;
        let state = if order.is_web == Some(true) {
            self.payments.session_status(payment_id).await?
        } else {
            self.payments.intent_status(payment_id).await?
        };
        let status = match state {
            PaymentState::Succeeded => PaymentStatus::Success,
            PaymentState::Failed => PaymentStatus::Failed,
            PaymentState::Processing => PaymentStatus::Pending,
        };
        if status != PaymentStatus::Pending && status != order.payment_status {
            let order = self.orders.record_payment_status(order.id, status).await?;
            return Ok((order, status));
        }
        Ok((order, status))
    }
}
