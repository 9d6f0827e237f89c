use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Index;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, Schema, Set,
};
use tracing::info;

use crate::entities::{
    self, product_variant, sequence, setting, shared, Setting,
};
use crate::services::sequences;

/// Open a connection pool against the configured database.
pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    info!("database connection established");
    Ok(db)
}

/// Create any missing tables and indexes, then seed the rows the
/// services assume exist (id counters, the settings row).
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    macro_rules! create_table {
        ($entity:expr) => {{
            let mut statement = schema.create_table_from_entity($entity);
            statement.if_not_exists();
            db.execute(backend.build(&statement)).await?;
        }};
    }

    create_table!(entities::Setting);
    create_table!(entities::Sequence);
    create_table!(entities::User);
    create_table!(entities::Address);
    create_table!(entities::Product);
    create_table!(entities::ProductVariant);
    create_table!(entities::Coupon);
    create_table!(entities::DeliverySlot);
    create_table!(entities::Cart);
    create_table!(entities::Order);
    create_table!(entities::OrderLine);
    create_table!(entities::WalletEntry);

    // SKUs repeat across products; the pair is what identifies a variant.
    let mut index = Index::create();
    index
        .name("idx_product_variants_product_sku")
        .table(entities::ProductVariant)
        .col(product_variant::Column::ProductId)
        .col(product_variant::Column::Sku)
        .unique()
        .if_not_exists();
    db.execute(backend.build(&index)).await?;

    seed_sequence(db, sequences::CART).await?;
    seed_sequence(db, sequences::ORDER).await?;
    seed_settings(db).await?;
    Ok(())
}

async fn seed_sequence(db: &DatabaseConnection, key: &str) -> Result<(), DbErr> {
    if sequence::Entity::find_by_id(key).one(db).await?.is_none() {
        sequence::ActiveModel {
            id: Set(key.to_string()),
            value: Set(0),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

async fn seed_settings(db: &DatabaseConnection) -> Result<(), DbErr> {
    if Setting::find().one(db).await?.is_none() {
        setting::ActiveModel {
            id: Set(1),
            minimum_for_free: Set(dec!(1000)),
            delivery_charges: Set(dec!(50)),
            currency: Set(shared::Currency::default()),
            tax_type: Set(shared::TaxType::Included),
            tax: Set(shared::Tax::default()),
            updated_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;
        info!("seeded default store settings");
    }
    Ok(())
}
