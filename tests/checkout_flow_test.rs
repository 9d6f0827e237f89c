mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use cakeshop_api::entities::{
    order_line, wallet_entry, Cart, Order, OrderLine, OrderStatus, PaymentMethod, PaymentStatus,
    ProductVariant, TaxType, User, WalletEntry, WalletEntryType,
};
use cakeshop_api::errors::ServiceError;
use cakeshop_api::services::carts::UpsertLineRequest;
use cakeshop_api::services::checkout::CheckoutOutcome;
use cakeshop_api::services::payments::PaymentState;

use common::TestApp;

fn add_line(product_id: i64, sku: &str, quantity: i32) -> UpsertLineRequest {
    UpsertLineRequest {
        product_id,
        sku: sku.to_string(),
        quantity,
        eggless: false,
    }
}

/// Seed a user with a ready-to-place cart and return the variant id.
async fn ready_cart(app: &TestApp, wallet: Decimal) -> i64 {
    app.configure_store(dec!(2000), dec!(50), TaxType::Excluded, dec!(5))
        .await;
    app.seed_user(1, wallet).await;
    let address = app.seed_address(1).await;
    app.seed_slots().await;
    let (_, variant) = app.seed_product(10, 1, "CK-10", 5, dec!(500)).await;

    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 2))
        .await
        .unwrap();
    app.services.carts.set_address(1, address.id).await.unwrap();
    app.services.carts.set_slot(1, "am").await.unwrap();
    variant.id
}

#[tokio::test]
async fn cod_checkout_creates_the_order_and_clears_the_cart() {
    let app = TestApp::new().await;
    let variant_id = ready_cart(&app, Decimal::ZERO).await;

    let outcome = app
        .services
        .checkout
        .place_order(1, PaymentMethod::Cod, false)
        .await
        .unwrap();
    let order_id = match outcome {
        CheckoutOutcome::Placed { order_id } => order_id,
        other => panic!("expected a placed order, got {:?}", other),
    };
    assert_eq!(app.payments.total_calls(), 0);

    let order = Order::find_by_id(order_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.grand_total, dec!(1100.00));
    assert_eq!(order.pay_total, dec!(1100.00));
    assert_eq!(order.slot.key, "am");

    let lines = OrderLine::find()
        .filter(order_line::Column::OrderId.eq(order_id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 2);

    // Stock was taken, the cart is gone, the purchase counter moved.
    let variant = ProductVariant::find_by_id(variant_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(variant.stock, 3);
    assert_eq!(Cart::find().count(&*app.db).await.unwrap(), 0);
    let user = User::find_by_id(1).one(&*app.db).await.unwrap().unwrap();
    assert_eq!(user.purchased, 1);
}

#[tokio::test]
async fn fully_wallet_covered_cod_order_is_paid_immediately() {
    let app = TestApp::new().await;
    ready_cart(&app, dec!(5000)).await;
    app.services.carts.apply_wallet(1).await.unwrap();

    let outcome = app
        .services
        .checkout
        .place_order(1, PaymentMethod::Cod, false)
        .await
        .unwrap();
    let order_id = match outcome {
        CheckoutOutcome::Placed { order_id } => order_id,
        other => panic!("expected a placed order, got {:?}", other),
    };
    // No gateway involvement for a zero payable amount.
    assert_eq!(app.payments.total_calls(), 0);

    let order = Order::find_by_id(order_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Success);
    assert_eq!(order.wallet_amount, dec!(1100.00));
    assert_eq!(order.pay_total, Decimal::ZERO);

    // Wallet debited with a ledger entry.
    let user = User::find_by_id(1).one(&*app.db).await.unwrap().unwrap();
    assert_eq!(user.wallet_amount, dec!(3900.00));
    let entries = WalletEntry::find()
        .filter(wallet_entry::Column::OrderId.eq(order_id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, WalletEntryType::Debited);
    assert_eq!(entries[0].amount, dec!(1100.00));
}

#[tokio::test]
async fn dead_line_aborts_checkout_without_creating_an_order() {
    let app = TestApp::new().await;
    let variant_id = ready_cart(&app, Decimal::ZERO).await;
    app.set_stock(variant_id, 0).await;

    assert_matches!(
        app.services
            .checkout
            .place_order(1, PaymentMethod::Cod, false)
            .await,
        Err(ServiceError::ProductUnavailable)
    );
    assert_eq!(Order::find().count(&*app.db).await.unwrap(), 0);

    // The cart survives with the failing line flagged.
    let cart = app
        .services
        .carts
        .get_or_create(Some(1), None)
        .await
        .unwrap();
    assert!(cart.lines.0[0].out_of_stock);
}

#[tokio::test]
async fn quantity_clamp_blocks_checkout_until_retried() {
    let app = TestApp::new().await;
    let variant_id = ready_cart(&app, Decimal::ZERO).await;
    // Stock drops below the requested quantity of 2.
    app.set_stock(variant_id, 1).await;

    assert_matches!(
        app.services
            .checkout
            .place_order(1, PaymentMethod::Cod, false)
            .await,
        Err(ServiceError::ProductUnavailable)
    );
    assert_eq!(Order::find().count(&*app.db).await.unwrap(), 0);

    // The persisted cart shows the clamped quantity; a retry against it
    // goes through at what the user has now seen.
    let cart = app.services.carts.current(Some(1), None).await.unwrap();
    assert_eq!(cart.lines.0[0].quantity, 1);
    assert!(!cart.lines.0[0].out_of_stock);

    let outcome = app
        .services
        .checkout
        .place_order(1, PaymentMethod::Cod, false)
        .await
        .unwrap();
    let order_id = match outcome {
        CheckoutOutcome::Placed { order_id } => order_id,
        other => panic!("expected a placed order, got {:?}", other),
    };
    let lines = OrderLine::find()
        .filter(order_line::Column::OrderId.eq(order_id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(lines[0].quantity, 1);
}

#[tokio::test]
async fn empty_cart_cannot_be_placed() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    assert_matches!(
        app.services
            .checkout
            .place_order(1, PaymentMethod::Cod, false)
            .await,
        Err(ServiceError::EmptyCart)
    );
}

#[tokio::test]
async fn missing_address_and_slot_abort_in_order() {
    let app = TestApp::new().await;
    app.seed_user(1, Decimal::ZERO).await;
    app.seed_slots().await;
    app.seed_product(10, 1, "CK-10", 5, dec!(500)).await;
    app.services
        .carts
        .upsert_line(Some(1), None, add_line(10, "CK-10", 1))
        .await
        .unwrap();

    assert_matches!(
        app.services
            .checkout
            .place_order(1, PaymentMethod::Cod, false)
            .await,
        Err(ServiceError::AddressNotFound)
    );

    let address = app.seed_address(1).await;
    app.services.carts.set_address(1, address.id).await.unwrap();
    assert_matches!(
        app.services
            .checkout
            .place_order(1, PaymentMethod::Cod, false)
            .await,
        Err(ServiceError::SlotUnavailable)
    );
}

#[tokio::test]
async fn spent_wallet_balance_aborts_checkout() {
    let app = TestApp::new().await;
    ready_cart(&app, dec!(200)).await;
    app.services.carts.apply_wallet(1).await.unwrap();
    // Balance shrank after the wallet was applied to the cart.
    app.set_wallet(1, dec!(50)).await;

    assert_matches!(
        app.services
            .checkout
            .place_order(1, PaymentMethod::Cod, false)
            .await,
        Err(ServiceError::InsufficientWalletBalance)
    );
    assert_eq!(Order::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
async fn card_checkout_on_web_creates_a_session() {
    let app = TestApp::new().await;
    ready_cart(&app, Decimal::ZERO).await;

    let outcome = app
        .services
        .checkout
        .place_order(1, PaymentMethod::Card, true)
        .await
        .unwrap();
    let (order_id, session_id) = match outcome {
        CheckoutOutcome::RedirectToPayment {
            order_id,
            session_id,
        } => (order_id, session_id),
        other => panic!("expected a payment redirect, got {:?}", other),
    };
    assert_eq!(app.payments.sessions_created.load(std::sync::atomic::Ordering::SeqCst), 1);

    let order = Order::find_by_id(order_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_id.as_deref(), Some(session_id.as_str()));
    assert_eq!(order.is_web, Some(true));
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    // Polling after the customer paid marks the order.
    app.payments.set_state(PaymentState::Succeeded);
    let (order, status) = app
        .services
        .checkout
        .payment_status(1, &session_id)
        .await
        .unwrap();
    assert_eq!(status, PaymentStatus::Success);
    assert_eq!(order.payment_status, PaymentStatus::Success);
}

#[tokio::test]
async fn card_checkout_on_mobile_returns_a_client_secret() {
    let app = TestApp::new().await;
    ready_cart(&app, Decimal::ZERO).await;

    let outcome = app
        .services
        .checkout
        .place_order(1, PaymentMethod::Card, false)
        .await
        .unwrap();
    let client_secret = match outcome {
        CheckoutOutcome::CollectPayment { client_secret, .. } => client_secret,
        other => panic!("expected an in-app payment, got {:?}", other),
    };
    assert!(client_secret.contains("secret"));
}

#[tokio::test]
async fn gateway_failure_leaves_a_pending_payable_order() {
    let app = TestApp::new().await;
    let variant_id = ready_cart(&app, Decimal::ZERO).await;
    app.payments.set_fail(true);

    assert_matches!(
        app.services
            .checkout
            .place_order(1, PaymentMethod::Card, true)
            .await,
        Err(ServiceError::PaymentInitiationFailed(_))
    );

    // The order itself was committed before the gateway call.
    let orders = Order::find().all(&*app.db).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert_eq!(orders[0].payment_status, PaymentStatus::Pending);
    assert_eq!(orders[0].payment_id, None);
    let variant = ProductVariant::find_by_id(variant_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(variant.stock, 3);

    // The abandoned card order can fall back to cash on delivery.
    app.payments.set_fail(false);
    let order = app
        .services
        .orders
        .convert_to_cod(1, orders[0].id)
        .await
        .unwrap();
    assert_eq!(order.method, PaymentMethod::Cod);
}
