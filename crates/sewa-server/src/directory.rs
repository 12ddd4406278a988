//! Read-only listing lookups.
//!
//! Listing management is owned elsewhere; bookings only need to resolve a
//! listing and one of its packages by id.

use async_trait::async_trait;
use sewa_shared::{ListingId, PackageId};
use sewa_store::{Listing, Package, StoreError};

use crate::error::ServiceError;
use crate::store::Store;

#[async_trait]
pub trait ListingDirectory: Send + Sync {
    /// An active listing, or `None`.
    async fn listing(&self, id: ListingId) -> Result<Option<Listing>, ServiceError>;

    async fn package(&self, id: PackageId) -> Result<Option<Package>, ServiceError>;
}

/// Directory backed by the listing tables of the local database.
pub struct StoreDirectory {
    store: Store,
}

impl StoreDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

fn optional<T>(result: sewa_store::Result<T>) -> sewa_store::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ListingDirectory for StoreDirectory {
    async fn listing(&self, id: ListingId) -> Result<Option<Listing>, ServiceError> {
        let listing = self.store.call(move |db| optional(db.get_listing(id))).await?;
        Ok(listing.filter(|l| l.is_active))
    }

    async fn package(&self, id: PackageId) -> Result<Option<Package>, ServiceError> {
        self.store.call(move |db| optional(db.get_package(id))).await
    }
}
