//! Async access to the synchronous SQLite handle.
//!
//! Callers queue for the connection for at most the configured request
//! timeout. An operation that got the connection always runs to completion,
//! so a `Timeout` means nothing was applied.

use std::sync::Arc;
use std::time::Duration;

use sewa_store::Database;
use tokio::sync::Mutex;

use crate::error::ServiceError;

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
    timeout: Duration,
}

impl Store {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            timeout,
        }
    }

    /// Run `op` against the database on the blocking pool.
    ///
    /// Fails with [`ServiceError::Timeout`] when the connection could not be
    /// taken within the timeout; `op` has not run in that case.
    pub async fn call<T, F>(&self, op: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> sewa_store::Result<T> + Send + 'static,
    {
        let mut guard = match tokio::time::timeout(self.timeout, self.db.clone().lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Store call timed out");
                return Err(ServiceError::Timeout);
            }
        };

        tokio::task::spawn_blocking(move || op(&mut guard).map_err(ServiceError::from))
            .await
            .map_err(|join| ServiceError::Internal(format!("store task failed: {join}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{book, harness};
    use sewa_shared::BookingStatus;
    use sewa_store::StatusUpdate;

    fn with_timeout(store: &Store, timeout: Duration) -> Store {
        Store {
            db: store.db.clone(),
            timeout,
        }
    }

    /// Keep the connection busy for `hold` on a background task.
    async fn occupy(store: &Store, hold: Duration) -> tokio::task::JoinHandle<Result<(), ServiceError>> {
        let busy = store.clone();
        let task = tokio::spawn(async move {
            busy.call(move |_db| {
                std::thread::sleep(hold);
                Ok(())
            })
            .await
        });
        // Let the background call take the lock first.
        tokio::time::sleep(Duration::from_millis(20)).await;
        task
    }

    #[tokio::test]
    async fn test_timed_out_call_never_applies() {
        let h = harness();
        let booking = book(&h).await;
        let impatient = with_timeout(&h.store, Duration::from_millis(30));

        let busy = occupy(&h.store, Duration::from_millis(200)).await;

        let id = booking.id;
        let result = impatient
            .call(move |db| db.update_booking_status(id, BookingStatus::Pending, BookingStatus::Confirmed))
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout)));

        busy.await.unwrap().unwrap();
        let stored = h.store.call(move |db| db.get_booking(id)).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_started_call_runs_past_timeout() {
        let h = harness();
        let booking = book(&h).await;
        let impatient = with_timeout(&h.store, Duration::from_millis(20));

        let id = booking.id;
        let result = impatient
            .call(move |db| {
                std::thread::sleep(Duration::from_millis(100));
                db.update_booking_status(id, BookingStatus::Pending, BookingStatus::Confirmed)
            })
            .await;
        assert!(matches!(result, Ok(StatusUpdate::Applied(_))));

        let stored = h.store.call(move |db| db.get_booking(id)).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_not_found_maps_through() {
        let store = Store::new(Database::open_in_memory().unwrap(), Duration::from_secs(5));
        let result = store
            .call(|db| db.get_booking(sewa_shared::BookingId::new()))
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
