mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use cakeshop_api::entities::{CouponKind, TaxType};
use cakeshop_api::errors::ServiceError;
use cakeshop_api::services::carts::UpsertLineRequest;

use common::TestApp;

fn add_line(product_id: i64, sku: &str, quantity: i32) -> UpsertLineRequest {
    UpsertLineRequest {
        product_id,
        sku: sku.to_string(),
        quantity,
        eggless: false,
    }
}

#[tokio::test]
async fn adding_lines_reprices_the_cart() {
    let app = TestApp::new().await;
    app.configure_store(dec!(2000), dec!(50), TaxType::Excluded, dec!(5))
        .await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;

    let cart = app
        .services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 2))
        .await
        .unwrap();

    assert_eq!(cart.count, 2);
    assert_eq!(cart.sub_total, dec!(1000));
    assert_eq!(cart.delivery_charges, dec!(50));
    assert_eq!(cart.tax_price, dec!(50.00));
    assert_eq!(cart.grand_total, dec!(1100.00));
    assert_eq!(cart.pay_total, dec!(1100.00));
}

#[tokio::test]
async fn quantity_is_absolute_and_zero_removes() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;

    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 2))
        .await
        .unwrap();
    let cart = app
        .services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 3))
        .await
        .unwrap();
    assert_eq!(cart.lines.0.len(), 1);
    assert_eq!(cart.lines.0[0].quantity, 3);

    let cart = app
        .services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 0))
        .await
        .unwrap();
    assert!(cart.lines.is_empty());
    assert_eq!(cart.grand_total, Decimal::ZERO);
}

#[tokio::test]
async fn adding_more_than_stock_is_refused() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 3, dec!(500)).await;

    let err = app
        .services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 5))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { stock: 3, .. });
}

#[tokio::test]
async fn unknown_product_or_sku_is_unavailable() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 3, dec!(500)).await;

    assert_matches!(
        app.services
            .carts
            .upsert_line(Some(1), None, add_line(99, "CK-99", 1))
            .await,
        Err(ServiceError::ProductUnavailable)
    );
    assert_matches!(
        app.services
            .carts
            .upsert_line(Some(1), None, add_line(10, "CK-99", 1))
            .await,
        Err(ServiceError::ProductUnavailable)
    );
}

#[tokio::test]
async fn anonymous_carts_work_and_merge_into_user_cart() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;
    app.seed_product(20, 1, "CK-20", 10, dec!(300)).await;

    // Anonymous visitor fills a cart.
    app.services
        .carts
        .upsert_line(None, Some("anon-1"), add_line(10, "CK-10", 1))
        .await
        .unwrap();
    app.services
        .carts
        .upsert_line(None, Some("anon-1"), add_line(20, "CK-20", 2))
        .await
        .unwrap();

    // The user already has the first product at a different quantity.
    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 4))
        .await
        .unwrap();

    let merged = app
        .services
        .carts
        .merge_anonymous(1, "anon-1")
        .await
        .unwrap();
    assert_eq!(merged.user_id, Some(1));
    assert_eq!(merged.lines.0.len(), 2);
    // The user's line wins the conflict.
    let kept = merged
        .lines
        .iter()
        .find(|l| l.product_id == 10)
        .unwrap();
    assert_eq!(kept.quantity, 4);

    // The anonymous cart is gone.
    let anon = app
        .services
        .carts
        .get_or_create(None, Some("anon-1"))
        .await
        .unwrap();
    assert!(anon.lines.is_empty());
}

#[tokio::test]
async fn adopting_an_anonymous_cart_without_user_cart() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;

    app.services
        .carts
        .upsert_line(None, Some("anon-2"), add_line(10, "CK-10", 2))
        .await
        .unwrap();
    let merged = app
        .services
        .carts
        .merge_anonymous(1, "anon-2")
        .await
        .unwrap();
    assert_eq!(merged.user_id, Some(1));
    assert_eq!(merged.anonymous_id, None);
    assert_eq!(merged.lines.0.len(), 1);
}

#[tokio::test]
async fn coupon_apply_and_remove() {
    let app = TestApp::new().await;
    app.configure_store(dec!(2000), dec!(50), TaxType::Excluded, dec!(5))
        .await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;
    app.seed_coupon("WELCOME10", CouponKind::Percentage, dec!(10), dec!(80), 1)
        .await;

    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 2))
        .await
        .unwrap();
    let cart = app
        .services
        .carts
        .apply_coupon(1, "WELCOME10")
        .await
        .unwrap();
    // 10% of 1000 is 100, capped at 80.
    assert_eq!(cart.coupon.code.as_deref(), Some("welcome10"));
    assert_eq!(cart.coupon.discount, dec!(80));
    assert_eq!(cart.grand_total, dec!(1020.00));

    let cart = app.services.carts.remove_coupon(1).await.unwrap();
    assert_eq!(cart.coupon.code, None);
    assert_eq!(cart.grand_total, dec!(1100.00));
}

#[tokio::test]
async fn coupon_scoped_to_other_category_is_rejected() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;
    app.seed_coupon("PASTRY5", CouponKind::Amount, dec!(50), dec!(50), 2)
        .await;

    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 1))
        .await
        .unwrap();
    assert_matches!(
        app.services.carts.apply_coupon(1, "PASTRY5").await,
        Err(ServiceError::CouponNotApplicable)
    );
}

#[tokio::test]
async fn mutating_lines_drops_coupon_and_wallet() {
    let app = TestApp::new().await;
    app.seed_user(1, dec!(300)).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;
    app.seed_coupon("WELCOME10", CouponKind::Percentage, dec!(10), dec!(80), 1)
        .await;

    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 2))
        .await
        .unwrap();
    app.services.carts.apply_coupon(1, "WELCOME10").await.unwrap();
    let cart = app.services.carts.apply_wallet(1).await.unwrap();
    assert!(cart.is_wallet_used);
    assert!(cart.coupon.code.is_some());

    let cart = app
        .services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 1))
        .await
        .unwrap();
    assert_eq!(cart.coupon.code, None);
    assert!(!cart.is_wallet_used);
    assert_eq!(cart.wallet_amount, Decimal::ZERO);
}

#[tokio::test]
async fn wallet_application_caps_at_grand_total() {
    let app = TestApp::new().await;
    app.configure_store(dec!(2000), dec!(50), TaxType::Included, Decimal::ZERO)
        .await;
    app.seed_user(1, dec!(5000)).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;

    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 1))
        .await
        .unwrap();
    let cart = app.services.carts.apply_wallet(1).await.unwrap();
    assert_eq!(cart.grand_total, dec!(550.00));
    assert_eq!(cart.wallet_amount, dec!(550.00));
    assert_eq!(cart.pay_total, Decimal::ZERO);

    let cart = app.services.carts.remove_wallet(1).await.unwrap();
    assert_eq!(cart.pay_total, dec!(550.00));
}

#[tokio::test]
async fn empty_wallet_cannot_be_applied() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;
    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 1))
        .await
        .unwrap();
    assert_matches!(
        app.services.carts.apply_wallet(1).await,
        Err(ServiceError::InsufficientWalletBalance)
    );
}

#[tokio::test]
async fn address_must_belong_to_the_user() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_user(2, Decimal::ZERO).await;
    let other = app.seed_address(2).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;
    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 1))
        .await
        .unwrap();

    assert_matches!(
        app.services.carts.set_address(1, other.id).await,
        Err(ServiceError::AddressNotFound)
    );
    let own = app.seed_address(1).await;
    let cart = app.services.carts.set_address(1, own.id).await.unwrap();
    assert_eq!(cart.address_id, Some(own.id));
}

#[tokio::test]
async fn unknown_slot_key_is_rejected() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;
    app.seed_slots().await;
    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 1))
        .await
        .unwrap();

    assert_matches!(
        app.services.carts.set_slot(1, "midnight").await,
        Err(ServiceError::SlotUnavailable)
    );
    let cart = app.services.carts.set_slot(1, "am").await.unwrap();
    assert_eq!(cart.slot_key.as_deref(), Some("am"));
}

#[tokio::test]
async fn cake_message_attaches_to_a_line() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_product(10, 1, "CK-10", 10, dec!(500)).await;
    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 1))
        .await
        .unwrap();

    let cart = app
        .services
        .carts
        .set_message(1, "CK-10", "Happy Birthday Maya")
        .await
        .unwrap();
    assert_eq!(
        cart.lines.0[0].message.as_deref(),
        Some("Happy Birthday Maya")
    );
    assert_matches!(
        app.services.carts.set_message(1, "CK-99", "hi").await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn check_flags_lines_that_went_out_of_stock() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    let (_, variant) = app.seed_product(10, 1, "CK-10", 5, dec!(500)).await;
    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 2))
        .await
        .unwrap();

    let (_, ok) = app.services.carts.check(Some(1), None).await.unwrap();
    assert!(ok);

    app.set_stock(variant.id, 0).await;
    let (cart, ok) = app.services.carts.check(Some(1), None).await.unwrap();
    assert!(!ok);
    assert!(cart.lines.0[0].out_of_stock);
    // The dead line is zeroed out and no longer counts toward totals.
    assert_eq!(cart.lines.0[0].quantity, 0);
    assert_eq!(cart.sub_total, Decimal::ZERO);
}
