use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use sakay_backend::{RowFilter, RowStore, SortOrder};
use sakay_types::{Booking, GeoPoint, QueryError, StoreError};

use crate::rows::decode_booking;

pub const BOOKINGS_TABLE: &str = "bookings";

/// Façade over the bookings table. Bookings give `Message::ride_id` a
/// referent; geolocation acquisition stays with the caller.
#[derive(Clone)]
pub struct BookingRepository {
    store: Arc<dyn RowStore>,
}

impl BookingRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Booking>, QueryError> {
        let filter = RowFilter::new().order_by("created_at", SortOrder::Descending);
        let rows = self.store.select(BOOKINGS_TABLE, &filter).await?;
        rows.iter().map(decode_booking).collect()
    }

    pub async fn create(
        &self,
        rider_id: Uuid,
        location: GeoPoint,
        rating: Option<f32>,
    ) -> Result<Booking, StoreError> {
        if rider_id.is_nil() {
            return Err(StoreError::Validation("missing rider id".into()));
        }

        let mut row = json!({ "rider_id": rider_id, "location": location });
        if let Some(rating) = rating {
            row["rating"] = json!(rating);
        }

        let stored = self
            .store
            .insert(BOOKINGS_TABLE, row)
            .await
            .map_err(StoreError::Query)?;
        decode_booking(&stored).map_err(StoreError::Query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sakay_testkit::MemoryRowStore;

    #[tokio::test]
    async fn test_create_then_list() {
        let store = Arc::new(MemoryRowStore::new());
        let repo = BookingRepository::new(store.clone());
        let rider = Uuid::from_u128(1);
        let point = GeoPoint { latitude: 8.9475, longitude: 125.5406 };

        let booking = repo.create(rider, point, Some(4.8)).await.unwrap();
        assert!(booking.id > 0);
        assert_eq!(booking.rider_id, rider);
        assert_eq!(booking.rating, Some(4.8));

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, booking.id);
    }

    #[tokio::test]
    async fn test_create_rejects_nil_rider() {
        let store = Arc::new(MemoryRowStore::new());
        let repo = BookingRepository::new(store);
        let point = GeoPoint { latitude: 0.0, longitude: 0.0 };

        let err = repo.create(Uuid::nil(), point, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
