use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Delivery slot configuration for one weekday. The primary key is the
/// ISO weekday (1 = Monday .. 7 = Sunday); each timing window carries a
/// stable key clients reference when choosing a slot.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_slots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub is_open: bool,
    #[sea_orm(column_type = "Json")]
    pub timings: SlotTimings,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct SlotTimings(pub Vec<SlotTiming>);

/// One bookable window within a weekday. `open`/`close` are minute
/// offsets from that day's midnight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTiming {
    pub key: String,
    pub display: String,
    pub open: i32,
    pub close: i32,
    pub is_open: bool,
}
