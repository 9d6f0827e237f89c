use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, Unchanged,
};
use tracing::{info, warn};

use crate::entities::{
    order, order_line, Order, OrderLine, OrderLineModel, OrderModel, OrderStatus, PaymentMethod,
    PaymentStatus, User,
};
use crate::errors::{ServiceError, ServiceResult};
use crate::events::{Event, EventSender};
use crate::services::catalog::CatalogService;
use crate::services::push::PushSender;
use crate::services::wallet::WalletService;

/// What a status change obliges beyond flipping the column. Cancellation
/// is the only transition with side effects; all of them run in the same
/// transaction as the status write, except the notification which goes
/// out after commit.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    CancelLines,
    RestoreStock,
    RefundWallet { amount: Decimal },
    NotifyCustomer { status: OrderStatus },
}

/// Validate a status change and name its side effects.
///
/// Allowed: Pending -> Confirmed -> OnTheWay -> Delivered, with
/// Cancelled reachable from every non-terminal state. A cancelled order
/// refunds the wallet amount, plus the paid amount for card orders.
pub fn transition(order: &OrderModel, next: OrderStatus) -> ServiceResult<Vec<SideEffect>> {
    use OrderStatus::*;
    let allowed = matches!(
        (order.status, next),
        (Pending, Confirmed) | (Confirmed, OnTheWay) | (OnTheWay, Delivered)
    ) || (next == Cancelled && !order.status.is_terminal());
    if !allowed {
        return Err(ServiceError::InvalidStatus(format!(
            "cannot move order from {:?} to {:?}",
            order.status, next
        )));
    }
    let mut effects = Vec::new();
    if next == Cancelled {
        effects.push(SideEffect::CancelLines);
        effects.push(SideEffect::RestoreStock);
        let refund = match order.method {
            PaymentMethod::Cod => order.wallet_amount,
            PaymentMethod::Card => order.wallet_amount + order.pay_total,
        };
        if refund > Decimal::ZERO {
            effects.push(SideEffect::RefundWallet { amount: refund });
        }
    }
    effects.push(SideEffect::NotifyCustomer { status: next });
    Ok(effects)
}

fn notification_copy(order_id: i64, status: OrderStatus) -> (&'static str, String) {
    match status {
        OrderStatus::Pending => ("Order placed", format!("Your order #{} has been placed.", order_id)),
        OrderStatus::Confirmed => (
            "Order confirmed",
            format!("Your order #{} has been confirmed.", order_id),
        ),
        OrderStatus::OnTheWay => (
            "Order on the way",
            format!("Your order #{} is on its way.", order_id),
        ),
        OrderStatus::Delivered => (
            "Order delivered",
            format!("Your order #{} has been delivered.", order_id),
        ),
        OrderStatus::Cancelled => (
            "Order cancelled",
            format!("Your order #{} has been cancelled.", order_id),
        ),
    }
}

/// Order queries and lifecycle changes after placement.
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<CatalogService>,
    wallet: Arc<WalletService>,
    push: Arc<dyn PushSender>,
    events: EventSender,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<CatalogService>,
        wallet: Arc<WalletService>,
        push: Arc<dyn PushSender>,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            catalog,
            wallet,
            push,
            events,
        }
    }

    pub async fn list_for_user(&self, user_id: i64) -> ServiceResult<Vec<OrderModel>> {
        Ok(Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn detail_for_user(
        &self,
        user_id: i64,
        order_id: i64,
    ) -> ServiceResult<(OrderModel, Vec<OrderLineModel>)> {
        let order = self.owned_order(user_id, order_id).await?;
        let lines = order.find_related(OrderLine).all(&*self.db).await?;
        Ok((order, lines))
    }

    async fn owned_order(&self, user_id: i64, order_id: i64) -> ServiceResult<OrderModel> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;
        if order.user_id != user_id {
            return Err(ServiceError::NotFound("Order".to_string()));
        }
        Ok(order)
    }

    /// Move the order to a new status, executing cancellation side
    /// effects transactionally with the status write.
    pub async fn update_status(
        &self,
        order_id: i64,
        next: OrderStatus,
    ) -> ServiceResult<OrderModel> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;
        let effects = transition(&order, next)?;
        let lines = order.find_related(OrderLine).all(&*self.db).await?;

        let txn = self.db.begin().await?;
        for effect in &effects {
            match effect {
                SideEffect::CancelLines => {
                    OrderLine::update_many()
                        .col_expr(order_line::Column::IsCancelled, Expr::value(true))
                        .filter(order_line::Column::OrderId.eq(order_id))
                        .exec(&txn)
                        .await?;
                }
                SideEffect::RestoreStock => {
                    for line in &lines {
                        if !line.is_cancelled {
                            self.catalog
                                .increment_stock(&txn, line.product_id, &line.sku, line.quantity)
                                .await?;
                        }
                    }
                }
                SideEffect::RefundWallet { amount } => {
                    self.wallet
                        .credit(&txn, order.user_id, order_id, *amount, "order cancelled")
                        .await?;
                }
                SideEffect::NotifyCustomer { .. } => {}
            }
        }
        let updated = order::ActiveModel {
            id: Unchanged(order_id),
            status: Set(next),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&txn)
        .await?;
        txn.commit().await?;
        info!(order_id, from = ?order.status, to = ?next, "order status changed");

        self.events
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: order.status.to_string(),
                new_status: next.to_string(),
            })
            .await;
        if effects.contains(&SideEffect::RestoreStock) {
            for line in &lines {
                if !line.is_cancelled {
                    self.events
                        .send_or_log(Event::StockRestored {
                            product_id: line.product_id,
                            quantity: line.quantity,
                        })
                        .await;
                }
            }
        }
        if effects
            .iter()
            .any(|e| matches!(e, SideEffect::RefundWallet { .. }))
        {
            self.events
                .send_or_log(Event::WalletCredited {
                    user_id: order.user_id,
                    order_id,
                })
                .await;
        }
        self.notify(order.user_id, order_id, next).await;
        Ok(updated)
    }

    /// Customers may cancel their own order only while it is pending.
    pub async fn cancel_by_user(&self, user_id: i64, order_id: i64) -> ServiceResult<OrderModel> {
        let order = self.owned_order(user_id, order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "order can no longer be cancelled".to_string(),
            ));
        }
        self.update_status(order_id, OrderStatus::Cancelled).await
    }

    pub async fn find_by_payment(
        &self,
        user_id: i64,
        payment_id: &str,
    ) -> ServiceResult<OrderModel> {
        let order = Order::find()
            .filter(order::Column::PaymentId.eq(payment_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order".to_string()))?;
        if order.user_id != user_id {
            return Err(ServiceError::NotFound("Order".to_string()));
        }
        Ok(order)
    }

    pub async fn update_payment(
        &self,
        order_id: i64,
        payment_id: &str,
        is_web: bool,
    ) -> ServiceResult<OrderModel> {
        Ok(order::ActiveModel {
            id: Unchanged(order_id),
            payment_id: Set(Some(payment_id.to_string())),
            is_web: Set(Some(is_web)),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?)
    }

    pub async fn record_payment_status(
        &self,
        order_id: i64,
        payment_status: PaymentStatus,
    ) -> ServiceResult<OrderModel> {
        let updated = order::ActiveModel {
            id: Unchanged(order_id),
            payment_status: Set(payment_status),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        self.events
            .send_or_log(Event::OrderPaymentUpdated {
                order_id,
                payment_status: payment_status.to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Switch an unpaid card order to cash on delivery, for users who
    /// abandon the payment flow.
    pub async fn convert_to_cod(&self, user_id: i64, order_id: i64) -> ServiceResult<OrderModel> {
        let order = self.owned_order(user_id, order_id).await?;
        if order.method != PaymentMethod::Card
            || order.payment_status == PaymentStatus::Success
            || order.status != OrderStatus::Pending
        {
            return Err(ServiceError::InvalidOperation(
                "order cannot be converted to cash on delivery".to_string(),
            ));
        }
        Ok(order::ActiveModel {
            id: Unchanged(order_id),
            method: Set(PaymentMethod::Cod),
            payment_status: Set(PaymentStatus::Pending),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?)
    }

    /// Best-effort push to the user's registered device.
    pub(crate) async fn notify(&self, user_id: i64, order_id: i64, status: OrderStatus) {
        let user = match User::find_by_id(user_id).one(&*self.db).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                warn!(user_id, error = %e, "skipping notification");
                return;
            }
        };
        if let Some(player_id) = user.player_id {
            let (title, message) = notification_copy(order_id, status);
            if let Err(e) = self.push.notify(&player_id, title, &message).await {
                warn!(order_id, error = %e, "push notification failed");
            }
        }
    }
}
