use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};

use crate::entities::{delivery_slot, DeliverySlot, DeliverySlotModel, OrderSlot, SlotTiming};
use crate::errors::{ServiceError, ServiceResult};

/// Weekly delivery slot lookup. A slot key names one timing window on
/// one weekday; verifying it resolves the key to concrete start and end
/// times on the next occurrence of that weekday.
pub struct SlotService {
    db: Arc<DatabaseConnection>,
}

impl SlotService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> ServiceResult<Vec<DeliverySlotModel>> {
        Ok(DeliverySlot::find()
            .order_by_asc(delivery_slot::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Check the key names an open window on an open day and resolve it
    /// to dates. Fails with [`ServiceError::SlotUnavailable`] otherwise.
    pub async fn verify(&self, key: &str, now: DateTime<Utc>) -> ServiceResult<OrderSlot> {
        for slot in self.list().await? {
            if !slot.is_open {
                continue;
            }
            if let Some(timing) = slot.timings.0.iter().find(|t| t.key == key) {
                if !timing.is_open {
                    return Err(ServiceError::SlotUnavailable);
                }
                return Ok(resolve_slot(slot.id, timing, now));
            }
        }
        Err(ServiceError::SlotUnavailable)
    }
}

/// Resolve a weekday slot to the next occurrence of that weekday,
/// strictly after today. Ordering today for the same weekday lands a
/// full week out; same-day delivery is never offered.
fn resolve_slot(slot_day: i32, timing: &SlotTiming, now: DateTime<Utc>) -> OrderSlot {
    let today = now.weekday().number_from_monday() as i64;
    let mut ahead = slot_day as i64 - today;
    if ahead <= 0 {
        ahead += 7;
    }
    let midnight = (now + Duration::days(ahead))
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc();
    OrderSlot {
        key: timing.key.clone(),
        date: midnight,
        start_time: midnight + Duration::minutes(timing.open as i64),
        end_time: midnight + Duration::minutes(timing.close as i64),
    }
}
