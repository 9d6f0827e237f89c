use std::sync::Arc;

use crate::entities::{cart::CartLines, ProductModel, ProductVariantModel};
use crate::errors::ServiceResult;
use crate::services::catalog::CatalogService;

/// Outcome of reconciling cart lines against current catalog state.
/// `ok` is false when any line changed in a way the user has not
/// accepted yet: a dead product, exhausted stock, or a quantity clamp.
pub struct Reconciliation {
    pub ok: bool,
    pub lines: CartLines,
}

/// Rewrite cart lines against a catalog snapshot.
///
/// A line whose product is missing or inactive or whose SKU is gone is
/// kept as-is but flagged `out_of_stock` so the client can show the user
/// exactly which items died. A zero-stock line is refreshed to quantity
/// zero and flagged. Live lines pick up current prices; a quantity above
/// stock is clamped and fails the reconciliation until the user sees the
/// reduced cart and retries.
pub fn reconcile_lines(
    lines: &CartLines,
    catalog: &[(ProductModel, Vec<ProductVariantModel>)],
) -> Reconciliation {
    let mut ok = true;
    let mut out = Vec::with_capacity(lines.0.len());
    for line in lines.iter() {
        let variant = catalog
            .iter()
            .find(|(product, _)| product.id == line.product_id && product.active)
            .and_then(|(_, variants)| variants.iter().find(|v| v.sku == line.sku));
        match variant {
            Some(variant) if variant.stock > 0 => {
                if line.quantity > variant.stock {
                    ok = false;
                }
                let quantity = line.quantity.min(variant.stock);
                out.push(line.refreshed(variant, quantity));
            }
            Some(variant) => {
                ok = false;
                let mut dead = line.refreshed(variant, 0);
                dead.out_of_stock = true;
                out.push(dead);
            }
            None => {
                ok = false;
                let mut dead = line.clone();
                dead.out_of_stock = true;
                out.push(dead);
            }
        }
    }
    Reconciliation {
        ok,
        lines: CartLines(out),
    }
}

/// Loads the catalog slice a cart references and reconciles against it.
pub struct AvailabilityService {
    catalog: Arc<CatalogService>,
}

impl AvailabilityService {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }

    pub async fn reconcile(&self, lines: &CartLines) -> ServiceResult<Reconciliation> {
        if lines.is_empty() {
            return Ok(Reconciliation {
                ok: true,
                lines: CartLines::default(),
            });
        }
        let mut ids: Vec<i64> = lines.iter().map(|line| line.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let catalog = self.catalog.get_by_ids(&ids).await?;
        Ok(reconcile_lines(lines, &catalog))
    }
}
