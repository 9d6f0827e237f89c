use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::entities::sequence;
use crate::errors::{ServiceError, ServiceResult};

pub const CART: &str = "CART";
pub const ORDER: &str = "ORDER";

/// Allocate the next id from the named counter row.
///
/// Callers must pass a transaction: the increment takes a row lock that
/// is held until commit, so the follow-up read observes this caller's
/// value and no one else's.
pub async fn next_id<C: ConnectionTrait>(conn: &C, key: &str) -> ServiceResult<i64> {
    let result = sequence::Entity::update_many()
        .col_expr(
            sequence::Column::Value,
            Expr::col(sequence::Column::Value).add(1),
        )
        .filter(sequence::Column::Id.eq(key))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::InternalError(format!(
            "sequence {} is not seeded",
            key
        )));
    }
    let row = sequence::Entity::find_by_id(key)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::InternalError(format!("sequence {} missing", key)))?;
    Ok(row.value)
}
