//! Service layer. Pure computation (pricing, reconciliation, status
//! transitions) lives in free functions; the structs around them own
//! database access and cross-service wiring.

pub mod availability;
pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod push;
pub mod sequences;
pub mod slots;
pub mod wallet;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::info;

use crate::config::AppConfig;
use crate::events::EventSender;

use availability::AvailabilityService;
use carts::CartService;
use catalog::CatalogService;
use checkout::CheckoutService;
use coupons::CouponService;
use orders::OrderService;
use payments::{DisabledPaymentProvider, PaymentProvider, StripeProvider};
use push::{NoopPush, OneSignalPush, PushSender};
use slots::SlotService;
use wallet::WalletService;

/// Everything the handlers call, wired once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub availability: Arc<AvailabilityService>,
    pub coupons: Arc<CouponService>,
    pub slots: Arc<SlotService>,
    pub wallet: Arc<WalletService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    pub fn build(db: Arc<DatabaseConnection>, config: &AppConfig, events: EventSender) -> Self {
        let payments: Arc<dyn PaymentProvider> = match &config.stripe_secret_key {
            Some(key) => Arc::new(StripeProvider::new(
                key.clone(),
                config.website_base_url.clone(),
            )),
            None => {
                info!("no payment gateway configured, card checkout disabled");
                Arc::new(DisabledPaymentProvider)
            }
        };
        let push: Arc<dyn PushSender> = match (&config.push_app_id, &config.push_secret_key) {
            (Some(app_id), Some(secret)) => {
                Arc::new(OneSignalPush::new(app_id.clone(), secret.clone()))
            }
            _ => Arc::new(NoopPush),
        };
        Self::build_with(db, events, payments, push)
    }

    /// Wiring with explicit provider implementations; tests install
    /// their own payment and push doubles through this.
    pub fn build_with(
        db: Arc<DatabaseConnection>,
        events: EventSender,
        payments: Arc<dyn PaymentProvider>,
        push: Arc<dyn PushSender>,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let availability = Arc::new(AvailabilityService::new(catalog.clone()));
        let coupons = Arc::new(CouponService::new(db.clone()));
        let slots = Arc::new(SlotService::new(db.clone()));
        let wallet = Arc::new(WalletService::new(db.clone()));
        let carts = Arc::new(CartService::new(
            db.clone(),
            catalog.clone(),
            availability.clone(),
            coupons.clone(),
            wallet.clone(),
            slots.clone(),
            events.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            catalog.clone(),
            wallet.clone(),
            push,
            events.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            db,
            carts.clone(),
            availability.clone(),
            coupons.clone(),
            wallet.clone(),
            catalog.clone(),
            slots.clone(),
            orders.clone(),
            payments,
            events,
        ));
        Self {
            catalog,
            availability,
            coupons,
            slots,
            wallet,
            carts,
            orders,
            checkout,
        }
    }
}
