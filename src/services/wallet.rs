use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};

use crate::entities::{user, wallet_entry, User, WalletEntryType};
use crate::errors::{ServiceError, ServiceResult};

/// Wallet balance and ledger. Every balance change writes a ledger entry
/// in the same transaction, so the entries always sum to the balance
/// delta since account creation.
pub struct WalletService {
    db: Arc<DatabaseConnection>,
}

impl WalletService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn balance(&self, user_id: i64) -> ServiceResult<Decimal> {
        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;
        Ok(user.wallet_amount)
    }

    /// Take `amount` from the user's balance. The update is guarded on
    /// `wallet_amount >= amount`; a failed guard means the balance
    /// changed since it was checked and the debit is refused.
    pub async fn debit<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        order_id: i64,
        amount: Decimal,
        reason: &str,
    ) -> ServiceResult<()> {
        let result = User::update_many()
            .col_expr(
                user::Column::WalletAmount,
                Expr::col(user::Column::WalletAmount).sub(amount),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::WalletAmount.gte(amount))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientWalletBalance);
        }
        self.record(conn, user_id, order_id, amount, WalletEntryType::Debited, reason)
            .await
    }

    /// Add `amount` to the user's balance (refund path).
    pub async fn credit<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        order_id: i64,
        amount: Decimal,
        reason: &str,
    ) -> ServiceResult<()> {
        let result = User::update_many()
            .col_expr(
                user::Column::WalletAmount,
                Expr::col(user::Column::WalletAmount).add(amount),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(user_id))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("User".to_string()));
        }
        self.record(conn, user_id, order_id, amount, WalletEntryType::Credited, reason)
            .await
    }

    async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        order_id: i64,
        amount: Decimal,
        entry_type: WalletEntryType,
        reason: &str,
    ) -> ServiceResult<()> {
        wallet_entry::ActiveModel {
            user_id: Set(user_id),
            order_id: Set(order_id),
            amount: Set(amount),
            entry_type: Set(entry_type),
            reason: Set(Some(reason.to_string())),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        Ok(())
    }
}
