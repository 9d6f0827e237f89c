use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use tracing::warn;

use crate::entities::{product, product_variant, Product, ProductModel, ProductVariant,
    ProductVariantModel};
use crate::errors::ServiceResult;

/// Read access to the catalog plus the two stock mutations the order
/// flow needs. Stock is only ever changed by relative, guarded updates
/// so concurrent checkouts cannot oversell.
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetch one active product with its variants.
    pub async fn get_active_with_variants(
        &self,
        product_id: i64,
    ) -> ServiceResult<Option<(ProductModel, Vec<ProductVariantModel>)>> {
        let mut found = Product::find_by_id(product_id)
            .filter(product::Column::Active.eq(true))
            .find_with_related(ProductVariant)
            .all(&*self.db)
            .await?;
        Ok(found.pop())
    }

    /// Fetch products for the given ids, with variants. Inactive rows are
    /// included; reconciliation filters on `active` itself.
    pub async fn get_by_ids(
        &self,
        ids: &[i64],
    ) -> ServiceResult<Vec<(ProductModel, Vec<ProductVariantModel>)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .find_with_related(ProductVariant)
            .all(&*self.db)
            .await?)
    }

    /// Atomically take `quantity` units off a variant's stock. Returns
    /// false when the guard (`stock >= quantity`) did not hold; nothing
    /// is changed in that case.
    pub async fn decrement_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
        sku: &str,
        quantity: i32,
    ) -> ServiceResult<bool> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(quantity),
            )
            .col_expr(
                product_variant::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(product_variant::Column::ProductId.eq(product_id))
            .filter(product_variant::Column::Sku.eq(sku))
            .filter(product_variant::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Return `quantity` units to a variant's stock (cancellation path).
    pub async fn increment_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: i64,
        sku: &str,
        quantity: i32,
    ) -> ServiceResult<()> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(quantity),
            )
            .col_expr(
                product_variant::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(product_variant::Column::ProductId.eq(product_id))
            .filter(product_variant::Column::Sku.eq(sku))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            // Variant was deleted since the order was placed; the refund
            // still goes through, the stock just has nowhere to return to.
            warn!(product_id, sku, "stock restore found no variant");
        }
        Ok(())
    }
}
