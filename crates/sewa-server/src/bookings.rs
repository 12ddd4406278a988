//! Booking lifecycle: creation, owner-driven status transitions, scoped
//! queries and payment marking.

use std::sync::Arc;

use serde::Deserialize;
use sewa_shared::{parse_preferred_date, BookingId, BookingStatus, ListingId, PackageId, Principal};
use sewa_store::{Booking, NewBooking, PaidMark, Participants, StatusUpdate};
use tracing::{info, warn};

use crate::auth::require_seller;
use crate::directory::ListingDirectory;
use crate::error::ServiceError;
use crate::notify::{Notice, NotificationDispatcher};
use crate::store::Store;

/// Body of `POST /api/bookings`. Fields are optional so that a missing one is
/// reported as an invalid argument rather than a decoding failure.
#[derive(Debug, Default, Deserialize)]
pub struct CreateBookingRequest {
    pub listing_id: Option<ListingId>,
    pub package_id: Option<PackageId>,
    pub preferred_date: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Something both parties of a booking are told about.
#[derive(Debug, Clone)]
enum BookingEvent {
    Created { listing_title: String },
    StatusChanged(BookingStatus),
    Paid,
}

impl BookingEvent {
    /// Texts for (buyer, seller).
    fn texts(&self, booking: BookingId, buyer_name: &str) -> (String, String) {
        match self {
            BookingEvent::Created { listing_title } => (
                format!("Booking sent for {listing_title}"),
                format!("New booking from {buyer_name}"),
            ),
            BookingEvent::StatusChanged(status) => {
                let text = format!("Booking #{booking} is now {status}");
                (text.clone(), text)
            }
            BookingEvent::Paid => (
                format!("Payment successful! Booking #{booking}"),
                format!("New paid booking from {buyer_name}"),
            ),
        }
    }
}

pub struct BookingService {
    store: Store,
    directory: Arc<dyn ListingDirectory>,
    notifications: NotificationDispatcher,
}

impl BookingService {
    pub fn new(
        store: Store,
        directory: Arc<dyn ListingDirectory>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            directory,
            notifications,
        }
    }

    pub async fn create_booking(
        &self,
        buyer: &Principal,
        req: CreateBookingRequest,
    ) -> Result<Booking, ServiceError> {
        let listing_id = req
            .listing_id
            .ok_or_else(|| ServiceError::InvalidArgument("listing_id is required".into()))?;
        let package_id = req
            .package_id
            .ok_or_else(|| ServiceError::InvalidArgument("package_id is required".into()))?;
        let raw_date = req
            .preferred_date
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ServiceError::InvalidArgument("preferred_date is required".into()))?;
        let preferred_date =
            parse_preferred_date(raw_date).map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

        let listing = self
            .directory
            .listing(listing_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Listing not found".into()))?;
        let package = self
            .directory
            .package(package_id)
            .await?
            .filter(|p| p.listing_id == listing.id)
            .ok_or_else(|| ServiceError::NotFound("Package not found for this listing".into()))?;

        if listing.owner_id == buyer.id {
            return Err(ServiceError::Forbidden("You cannot book your own listing".into()));
        }

        let new = NewBooking {
            buyer_id: buyer.id,
            seller_id: listing.owner_id,
            listing_id: listing.id,
            package_id: package.id,
            package_tier: package.tier,
            price: package.price,
            preferred_date,
            message: req.message,
        };
        let booking = self.store.call(move |db| db.insert_booking(&new)).await?;

        info!(
            booking = %booking.id,
            buyer = %buyer.id,
            listing = %listing.id,
            tier = booking.package_tier.as_str(),
            "Booking created"
        );
        self.notify(
            &booking,
            BookingEvent::Created {
                listing_title: listing.title,
            },
        );
        Ok(booking)
    }

    /// Move a booking along its lifecycle on behalf of the listing owner.
    pub async fn transition_status(
        &self,
        actor: &Principal,
        id: BookingId,
        requested: &str,
    ) -> Result<Booking, ServiceError> {
        let next: BookingStatus = requested
            .parse()
            .ok()
            .filter(|s| *s != BookingStatus::Pending)
            .ok_or_else(|| {
                ServiceError::InvalidArgument(
                    "status must be one of confirmed, completed, cancelled".into(),
                )
            })?;

        let expected = self.check_transition(actor, id, next).await?;
        self.apply_transition(id, expected, next).await
    }

    /// Authorize `actor` and validate `next` against the stored status.
    /// Returns the status the change was validated against.
    async fn check_transition(
        &self,
        actor: &Principal,
        id: BookingId,
        next: BookingStatus,
    ) -> Result<BookingStatus, ServiceError> {
        let current = self.store.call(move |db| db.get_booking(id)).await?;
        if current.seller_id != actor.id {
            return Err(ServiceError::Forbidden(
                "Only the listing owner can change this booking".into(),
            ));
        }
        if !current.status.can_transition_to(next) {
            return Err(ServiceError::InvalidState(format!(
                "Cannot move a {} booking to {next}",
                current.status
            )));
        }
        Ok(current.status)
    }

    /// Swap `expected` for `next`. Loses with `InvalidState` when another
    /// change landed first.
    async fn apply_transition(
        &self,
        id: BookingId,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> Result<Booking, ServiceError> {
        match self
            .store
            .call(move |db| db.update_booking_status(id, expected, next))
            .await?
        {
            StatusUpdate::Applied(booking) => {
                info!(booking = %id, from = %expected, to = %next, "Booking status changed");
                self.notify(&booking, BookingEvent::StatusChanged(next));
                Ok(booking)
            }
            StatusUpdate::Stale(now) => Err(ServiceError::InvalidState(format!(
                "Booking changed concurrently and is now {now}"
            ))),
        }
    }

    pub async fn list_for_buyer(&self, principal: &Principal) -> Result<Vec<Booking>, ServiceError> {
        let buyer = principal.id;
        self.store.call(move |db| db.list_bookings_for_buyer(buyer)).await
    }

    pub async fn list_for_seller(&self, principal: &Principal) -> Result<Vec<Booking>, ServiceError> {
        require_seller(principal)?;
        let seller = principal.id;
        self.store.call(move |db| db.list_bookings_for_seller(seller)).await
    }

    /// Detail view, restricted to the two participants.
    pub async fn get_booking(
        &self,
        principal: &Principal,
        id: BookingId,
    ) -> Result<Booking, ServiceError> {
        let booking = self.store.call(move |db| db.get_booking(id)).await?;
        if !booking.participants().contains(principal.id) {
            return Err(ServiceError::Forbidden("Not a participant of this booking".into()));
        }
        Ok(booking)
    }

    pub async fn participants(&self, id: BookingId) -> Result<Participants, ServiceError> {
        self.store.call(move |db| db.booking_participants(id)).await
    }

    /// Record an external payment. Replays of the same transaction id return
    /// the booking unchanged.
    pub async fn mark_paid(&self, id: BookingId, transaction_id: &str) -> Result<Booking, ServiceError> {
        let tx = transaction_id.to_string();
        match self.store.call(move |db| db.mark_booking_paid(id, &tx)).await? {
            PaidMark::Recorded(booking) => {
                info!(booking = %id, transaction = %transaction_id, "Booking marked paid");
                self.notify(&booking, BookingEvent::Paid);
                Ok(booking)
            }
            PaidMark::AlreadyRecorded(booking) => Ok(booking),
            PaidMark::Conflict { existing } => {
                warn!(
                    booking = %id,
                    transaction = %transaction_id,
                    existing = %existing,
                    "Payment conflicts with an earlier transaction"
                );
                Err(ServiceError::Conflict(
                    "Booking is already paid under another transaction".into(),
                ))
            }
            PaidMark::NotPayable(status) => Err(ServiceError::InvalidState(format!(
                "A {status} booking cannot be paid"
            ))),
        }
    }

    /// Tell both parties about `event` in the background. Parties without a
    /// phone number are skipped.
    fn notify(&self, booking: &Booking, event: BookingEvent) {
        let store = self.store.clone();
        let dispatcher = self.notifications.clone();
        let booking_id = booking.id;
        let ids = [booking.buyer_id, booking.seller_id];

        tokio::spawn(async move {
            let users = match store.call(move |db| db.get_users(&ids)).await {
                Ok(users) => users,
                Err(e) => {
                    warn!(booking = %booking_id, error = %e, "Skipping notifications");
                    return;
                }
            };
            let mut users = users.into_iter();
            let buyer = users.next().flatten();
            let seller = users.next().flatten();

            let buyer_name = buyer.as_ref().map(|u| u.username.as_str()).unwrap_or("a customer");
            let (to_buyer, to_seller) = event.texts(booking_id, buyer_name);

            let mut notices = Vec::with_capacity(2);
            if let Some(phone) = buyer.as_ref().and_then(|u| u.phone.clone()) {
                notices.push(Notice::new(phone, to_buyer));
            }
            if let Some(phone) = seller.as_ref().and_then(|u| u.phone.clone()) {
                notices.push(Notice::new(phone, to_seller));
            }
            dispatcher.dispatch(notices);
        });
    }
}
