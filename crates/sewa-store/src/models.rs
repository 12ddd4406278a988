//! Domain model structs persisted in the service database.
//!
//! Every struct derives `Serialize` and `Deserialize` so the HTTP layer can
//! build its responses from them directly.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sewa_shared::{
    BookingId, BookingStatus, ListingId, MessageId, PackageId, PackageTier, Role, UserId,
};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Profile of a principal known to the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    /// Notification target; users without a phone are not notified.
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Listing directory
// ---------------------------------------------------------------------------

/// A freelancer's published service offering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    pub id: ListingId,
    pub owner_id: UserId,
    pub title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A priced tier under a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    pub listing_id: ListingId,
    pub tier: PackageTier,
    pub title: String,
    /// Whole currency units.
    pub price: i64,
    pub delivery_days: u32,
}

// ---------------------------------------------------------------------------
// Booking
// ---------------------------------------------------------------------------

/// One customer's request to engage a freelancer for a listing and package.
///
/// `buyer_id`, `seller_id`, `listing_id` and the package snapshot never change
/// after insertion; only `status`, `paid`, `transaction_id` and `updated_at` do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: BookingId,
    pub buyer_id: UserId,
    /// Owner of the listing when the booking was made.
    pub seller_id: UserId,
    pub listing_id: ListingId,
    /// `None` once the package has been deleted from the directory.
    pub package_id: Option<PackageId>,
    pub package_tier: PackageTier,
    /// Package price at booking time, whole currency units.
    pub price: i64,
    pub preferred_date: NaiveDate,
    pub message: String,
    pub status: BookingStatus,
    pub paid: bool,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn participants(&self) -> Participants {
        Participants {
            buyer: self.buyer_id,
            seller: self.seller_id,
        }
    }
}

/// The only two principals authorized for a booking and its conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participants {
    pub buyer: UserId,
    pub seller: UserId,
}

impl Participants {
    pub fn contains(&self, user: UserId) -> bool {
        self.buyer == user || self.seller == user
    }

    /// The other party, or `None` when `user` is not a participant.
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if user == self.buyer {
            Some(self.seller)
        } else if user == self.seller {
            Some(self.buyer)
        } else {
            None
        }
    }
}

/// Fields supplied when a booking is created.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub listing_id: ListingId,
    pub package_id: PackageId,
    pub package_tier: PackageTier,
    pub price: i64,
    pub preferred_date: NaiveDate,
    pub message: String,
}

/// Result of a status compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied(Booking),
    /// The stored status was no longer the expected one.
    Stale(BookingStatus),
}

/// Result of recording an external payment against a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaidMark {
    Recorded(Booking),
    /// Same transaction id seen before; nothing changed.
    AlreadyRecorded(Booking),
    /// Already paid under another transaction id.
    Conflict { existing: String },
    /// The booking is in a status that no longer accepts payment.
    NotPayable(BookingStatus),
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One chat utterance scoped to a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub booking_id: BookingId,
    /// Authoritative sort key within the booking.
    pub seq: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    /// Display timestamp, non-decreasing along `seq`.
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

// ---------------------------------------------------------------------------
// Conversation (derived)
// ---------------------------------------------------------------------------

/// Per-requester view over one booking's thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub booking_id: BookingId,
    pub listing_title: String,
    pub other_user_id: UserId,
    pub other_username: Option<String>,
    pub last_message: Option<LastMessage>,
    /// Unread messages addressed to the requester.
    pub unread_count: u32,
    pub booking_created_at: DateTime<Utc>,
}

impl ConversationSummary {
    /// Sort key: last activity, or booking creation for empty threads.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.booking_created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    pub seq: i64,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = sewa_shared::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(sewa_shared::ParseError::PaymentStatus(other.to_string())),
        }
    }
}

/// A gateway transaction opened for a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub transaction_id: String,
    pub booking_id: BookingId,
    /// Minor units, buyer fee included.
    pub amount: i64,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterpart() {
        let p = Participants {
            buyer: UserId::new(),
            seller: UserId::new(),
        };
        assert_eq!(p.counterpart(p.buyer), Some(p.seller));
        assert_eq!(p.counterpart(p.seller), Some(p.buyer));
        assert_eq!(p.counterpart(UserId::new()), None);
        assert!(p.contains(p.buyer));
        assert!(!p.contains(UserId::new()));
    }
}
