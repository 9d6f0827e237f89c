use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set, Unchanged,
};
use tokio::sync::mpsc;

use axum::Router;

use cakeshop_api::config::AppConfig;
use cakeshop_api::db;
use cakeshop_api::entities::{
    address, coupon, delivery_slot, product, product_variant, setting, user, CouponKind,
    SlotTiming, Tax, TaxType,
};
use cakeshop_api::errors::{ServiceError, ServiceResult};
use cakeshop_api::events::EventSender;
use cakeshop_api::services::payments::{
    PaymentIntent, PaymentProvider, PaymentSession, PaymentState,
};
use cakeshop_api::services::push::NoopPush;
use cakeshop_api::services::AppServices;

/// Test harness over an in-memory SQLite database with a stubbed
/// payment gateway. One connection only: each pooled connection of an
/// in-memory SQLite database would otherwise see its own empty schema.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub payments: Arc<StubPayments>,
    pub state: Arc<cakeshop_api::AppState>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut options = ConnectOptions::new("sqlite::memory:".to_string());
        options.max_connections(1).min_connections(1);
        let pool = Database::connect(options)
            .await
            .expect("failed to open test database");
        db::init_schema(&pool)
            .await
            .expect("failed to initialize test schema");
        let db = Arc::new(pool);

        let (tx, rx) = mpsc::channel(64);
        let event_sender = EventSender::new(tx);
        let event_task = tokio::spawn(cakeshop_api::events::process_events(rx));

        let payments = Arc::new(StubPayments::new());
        let services = AppServices::build_with(
            db.clone(),
            event_sender.clone(),
            payments.clone(),
            Arc::new(NoopPush),
        );
        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 18080,
            environment: "test".into(),
            log_level: "info".into(),
            log_json: false,
            website_base_url: "http://localhost:3000".into(),
            stripe_secret_key: None,
            push_app_id: None,
            push_secret_key: None,
        };
        let state = Arc::new(cakeshop_api::AppState {
            db: db.clone(),
            config,
            event_sender,
            services: services.clone(),
        });
        Self {
            db,
            services,
            payments,
            state,
            _event_task: event_task,
        }
    }

    /// Full API router over this app's state.
    pub fn router(&self) -> Router {
        cakeshop_api::handlers::api_router().with_state(self.state.clone())
    }

    /// Rewrite the store policy. Call before creating carts: carts
    /// snapshot the policy at creation.
    pub async fn configure_store(
        &self,
        minimum_for_free: Decimal,
        delivery_charges: Decimal,
        tax_type: TaxType,
        tax_percent: Decimal,
    ) {
        setting::ActiveModel {
            id: Unchanged(1),
            minimum_for_free: Set(minimum_for_free),
            delivery_charges: Set(delivery_charges),
            tax_type: Set(tax_type),
            tax: Set(Tax {
                title: "GST".into(),
                percent: tax_percent,
            }),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&*self.db)
        .await
        .expect("failed to update settings");
    }

    pub async fn seed_user(&self, id: i64, wallet: Decimal) -> user::Model {
        let now = Utc::now();
        user::ActiveModel {
            id: Set(id),
            first_name: Set("Maya".into()),
            last_name: Set("Iyer".into()),
            email: Set(format!("user{}@example.com", id)),
            mobile_number: Set("5550100".into()),
            wallet_amount: Set(wallet),
            purchased: Set(0),
            player_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed user")
    }

    pub async fn seed_address(&self, user_id: i64) -> address::Model {
        address::ActiveModel {
            user_id: Set(user_id),
            name: Set("Maya Iyer".into()),
            address: Set("12 Lake View".into()),
            flat: Set("4B".into()),
            street: Set("Mill Road".into()),
            mobile_number: Set("5550100".into()),
            address_type: Set("home".into()),
            location: Set(None),
            country: Set("US".into()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed address")
    }

    pub async fn seed_product(
        &self,
        id: i64,
        type_id: i64,
        sku: &str,
        stock: i32,
        price: Decimal,
    ) -> (product::Model, product_variant::Model) {
        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(id),
            title: Set(format!("Cake {}", id)),
            slug: Set(format!("cake-{}", id)),
            thumbnail: Set(format!("cake-{}.jpg", id)),
            type_id: Set(type_id),
            flavour_id: Set(None),
            occasion_id: Set(None),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product");
        let variant = product_variant::ActiveModel {
            product_id: Set(id),
            sku: Set(sku.to_string()),
            capacity: Set("1kg".into()),
            stock: Set(stock),
            selling_price: Set(price),
            original_price: Set(price),
            discount: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed variant");
        (product, variant)
    }

    pub async fn set_stock(&self, variant_id: i64, stock: i32) {
        product_variant::ActiveModel {
            id: Unchanged(variant_id),
            stock: Set(stock),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&*self.db)
        .await
        .expect("failed to set stock");
    }

    pub async fn set_wallet(&self, user_id: i64, balance: Decimal) {
        user::ActiveModel {
            id: Unchanged(user_id),
            wallet_amount: Set(balance),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&*self.db)
        .await
        .expect("failed to set wallet");
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        kind: CouponKind,
        discount: Decimal,
        max_discount: Decimal,
        product_type: i64,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(now.timestamp_subsec_micros() as i64),
            code: Set(code.to_lowercase()),
            kind: Set(kind),
            discount: Set(discount),
            min_amount: Set(dec!(100)),
            max_discount: Set(max_discount),
            start_date: Set(now - Duration::days(1)),
            end_date: Set(now + Duration::days(1)),
            product_type: Set(product_type),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed coupon")
    }

    /// Open every weekday with a single morning window keyed `am`.
    pub async fn seed_slots(&self) {
        for day in 1..=7 {
            delivery_slot::ActiveModel {
                id: Set(day),
                is_open: Set(true),
                timings: Set(delivery_slot::SlotTimings(vec![SlotTiming {
                    key: "am".into(),
                    display: "9 AM - 12 PM".into(),
                    open: 9 * 60,
                    close: 12 * 60,
                    is_open: true,
                }])),
            }
            .insert(&*self.db)
            .await
            .expect("failed to seed slot");
        }
    }
}

/// Payment gateway double: counts calls and answers with a canned
/// state, or fails every call when `fail` is set.
pub struct StubPayments {
    pub sessions_created: AtomicUsize,
    pub intents_created: AtomicUsize,
    pub fail: Mutex<bool>,
    pub state: Mutex<PaymentState>,
}

impl StubPayments {
    pub fn new() -> Self {
        Self {
            sessions_created: AtomicUsize::new(0),
            intents_created: AtomicUsize::new(0),
            fail: Mutex::new(false),
            state: Mutex::new(PaymentState::Processing),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn set_state(&self, state: PaymentState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn total_calls(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst) + self.intents_created.load(Ordering::SeqCst)
    }

    fn check_fail(&self) -> ServiceResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(ServiceError::PaymentInitiationFailed(
                "gateway unavailable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for StubPayments {
    async fn create_session(
        &self,
        _amount_minor: i64,
        _currency: &str,
        order_id: i64,
        _user_id: i64,
    ) -> ServiceResult<PaymentSession> {
        self.check_fail()?;
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentSession {
            id: format!("cs_test_{}", order_id),
        })
    }

    async fn create_intent(
        &self,
        _amount_minor: i64,
        _currency: &str,
        _description: &str,
        _receipt_email: Option<&str>,
    ) -> ServiceResult<PaymentIntent> {
        self.check_fail()?;
        let n = self.intents_created.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            id: format!("pi_test_{}", n),
            client_secret: format!("pi_test_{}_secret", n),
        })
    }

    async fn session_status(&self, _session_id: &str) -> ServiceResult<PaymentState> {
        Ok(*self.state.lock().unwrap())
    }

    async fn intent_status(&self, _intent_id: &str) -> ServiceResult<PaymentState> {
        Ok(*self.state.lock().unwrap())
    }
}
