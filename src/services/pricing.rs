use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::entities::{cart, TaxType};

/// Round to 2 decimal places, midpoint away from zero. All derived money
/// values pass through here so totals agree digit for digit with what
/// clients display.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Recompute every derived money field on the cart from its lines and
/// already-applied adjustments. This is the only place totals are
/// computed; callers mutate lines, coupon or wallet fields and then
/// reprice before persisting.
///
/// grand_total = sub_total + delivery_charges + tax_price - coupon.discount
/// pay_total   = grand_total - wallet_amount
pub fn reprice(cart: &mut cart::Model) {
    let mut count = 0;
    let mut sub_total = Decimal::ZERO;
    for line in cart.lines.iter() {
        count += line.quantity;
        sub_total += line.total;
    }
    cart.count = count;
    cart.sub_total = round2(sub_total);

    // Free delivery only strictly above the threshold. An empty cart
    // carries no charges at all.
    cart.delivery_charges = if cart.lines.is_empty() || cart.sub_total > cart.minimum_for_free {
        Decimal::ZERO
    } else {
        cart.apply_delivery_charges
    };

    cart.tax_price = match cart.tax_type {
        TaxType::Excluded => round2(cart.sub_total * cart.tax.percent / dec!(100)),
        TaxType::Included => Decimal::ZERO,
    };

    let grand =
        cart.sub_total + cart.delivery_charges + cart.tax_price - cart.coupon.discount;
    cart.grand_total = round2(grand.max(Decimal::ZERO));

    if cart.is_wallet_used {
        // The applied wallet amount can never exceed what is owed.
        cart.wallet_amount = cart.wallet_amount.min(cart.grand_total);
    } else {
        cart.wallet_amount = Decimal::ZERO;
    }
    cart.pay_total = round2(cart.grand_total - cart.wallet_amount);
}
