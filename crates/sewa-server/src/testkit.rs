//! Shared fixtures for service and router tests.
//!
//! Three users: `u1` (sita, customer), `u2` (raju, seller and owner of the
//! "Wedding photography" listing) and `u3` (hari, customer, unrelated).

use std::sync::Arc;
use std::time::Duration;

use sewa_shared::{BookingId, ListingId, PackageId, Principal};
use sewa_store::{Booking, Database};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::bookings::CreateBookingRequest;
use crate::config::ServerConfig;
use crate::notify::tests::RecordingNotifier;
use crate::notify::Notice;
use crate::seed::{self, Seed};
use crate::store::Store;

pub(crate) struct Harness {
    pub state: AppState,
    pub store: Store,
    pub u1: Principal,
    pub u2: Principal,
    pub u3: Principal,
    pub listing: ListingId,
    pub package: PackageId,
    /// Package of another listing of `u2`.
    pub other_package: PackageId,
    pub inactive_listing: ListingId,
    pub inactive_package: PackageId,
    pub notices: mpsc::UnboundedReceiver<Notice>,
}

pub(crate) fn harness() -> Harness {
    harness_with(ServerConfig::default())
}

/// Harness over a custom configuration. The request timeout applies to the store.
pub(crate) fn harness_with(config: ServerConfig) -> Harness {
    let ids: Vec<String> = (0..9).map(|_| BookingId::new().to_string()).collect();
    let raw = serde_json::json!({
        "users": [
            {"id": ids[0], "username": "sita", "role": "customer", "phone": "9800000001", "token": "tok-u1"},
            {"id": ids[1], "username": "raju", "role": "seller", "phone": "9800000002", "token": "tok-u2"},
            {"id": ids[2], "username": "hari", "role": "customer", "token": "tok-u3"}
        ],
        "listings": [
            {"id": ids[3], "owner_id": ids[1], "title": "Wedding photography", "packages": [
                {"id": ids[4], "tier": "basic", "title": "Half day", "price": 1000, "delivery_days": 7}
            ]},
            {"id": ids[5], "owner_id": ids[1], "title": "Logo design", "packages": [
                {"id": ids[6], "tier": "premium", "title": "Three concepts", "price": 2500, "delivery_days": 5}
            ]},
            {"id": ids[7], "owner_id": ids[1], "title": "Old gig", "is_active": false, "packages": [
                {"id": ids[8], "tier": "standard", "title": "Retired", "price": 300, "delivery_days": 2}
            ]}
        ]
    });
    let seed: Seed = serde_json::from_value(raw).unwrap();

    let db = Database::open_in_memory().unwrap();
    let tokens = seed::apply(&db, &seed).unwrap();
    let principal = |token: &str| {
        use crate::auth::IdentityProvider;
        tokens.authenticate(token).unwrap()
    };
    let (u1, u2, u3) = (principal("tok-u1"), principal("tok-u2"), principal("tok-u3"));

    let (notifier, notices) = RecordingNotifier::new();
    let store = Store::new(db, config.request_timeout);
    let state = AppState::new(store.clone(), Arc::new(tokens), notifier, config);

    let listing = &seed.listings;
    Harness {
        state,
        store,
        u1,
        u2,
        u3,
        listing: listing[0].id,
        package: listing[0].packages[0].id,
        other_package: listing[1].packages[0].id,
        inactive_listing: listing[2].id,
        inactive_package: listing[2].packages[0].id,
        notices,
    }
}

/// `u1` books the basic package of `u2`'s listing for 2025-06-01.
pub(crate) async fn book(h: &Harness) -> Booking {
    h.state
        .bookings
        .create_booking(
            &h.u1,
            CreateBookingRequest {
                listing_id: Some(h.listing),
                package_id: Some(h.package),
                preferred_date: Some("2025-06-01".into()),
                message: String::new(),
            },
        )
        .await
        .unwrap()
}

/// Wait for `n` notices.
pub(crate) async fn recv_notices(rx: &mut mpsc::UnboundedReceiver<Notice>, n: usize) -> Vec<Notice> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let notice = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("notice not delivered in time")
            .expect("notifier dropped");
        out.push(notice);
    }
    out
}
