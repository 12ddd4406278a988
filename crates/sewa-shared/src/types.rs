use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CHANNEL_PREFIX, DATE_FORMAT};
use crate::error::ParseError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ParseError::Id(s.to_string()))
            }
        }
    };
}

uuid_id!(
    /// Identity of an authenticated principal.
    UserId
);
uuid_id!(
    /// A freelancer's published service offering.
    ListingId
);
uuid_id!(
    /// A priced tier under a listing.
    PackageId
);
uuid_id!(
    /// A booking. Also the identity of its conversation and channel.
    BookingId
);
uuid_id!(MessageId);

impl BookingId {
    /// Name of the real-time channel carrying this booking's conversation.
    pub fn to_channel_name(&self) -> String {
        format!("{CHANNEL_PREFIX}{}", self.0)
    }

    /// Resolve a booking id from a channel name such as `chat/<uuid>`.
    pub fn from_channel_name(name: &str) -> Result<Self, ParseError> {
        name.trim_end_matches('/')
            .strip_prefix(CHANNEL_PREFIX)
            .and_then(|rest| Uuid::parse_str(rest).ok())
            .map(Self)
            .ok_or_else(|| ParseError::Channel(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Seller,
    /// Buys and sells.
    Both,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Seller => "seller",
            Role::Both => "both",
            Role::Admin => "admin",
        }
    }

    /// Whether this role may act as a freelancer.
    pub fn can_sell(&self) -> bool {
        matches!(self, Role::Seller | Role::Both)
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "seller" | "freelancer" => Ok(Role::Seller),
            "both" => Ok(Role::Both),
            "admin" => Ok(Role::Admin),
            _ => Err(ParseError::Role(s.to_string())),
        }
    }
}

/// An authenticated caller, as produced by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Booking state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Adjacency of the booking lifecycle.
    ///
    /// `pending -> {confirmed, cancelled}`, `confirmed -> {completed, cancelled}`.
    /// Terminal states have no outgoing edges.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }

    /// Statuses during which an external payment may be recorded.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            _ => Err(ParseError::BookingStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageTier {
    Basic,
    Standard,
    Premium,
}

impl PackageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageTier::Basic => "basic",
            PackageTier::Standard => "standard",
            PackageTier::Premium => "premium",
        }
    }
}

impl FromStr for PackageTier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(PackageTier::Basic),
            "standard" => Ok(PackageTier::Standard),
            "premium" => Ok(PackageTier::Premium),
            _ => Err(ParseError::PackageTier(s.to_string())),
        }
    }
}

/// Parse a preferred booking date (`YYYY-MM-DD`).
pub fn parse_preferred_date(raw: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| ParseError::Date(raw.to_string()))
}

/// Render an amount in minor units (paisa) as `"123.45"`.
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parse `"123"`, `"123.4"` or `"123.45"` into minor units.
pub fn parse_minor_units(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    if whole.is_empty() || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_adjacency() {
        use BookingStatus::*;
        let all = [Pending, Confirmed, Completed, Cancelled];
        let allowed = [
            (Pending, Confirmed),
            (Pending, Cancelled),
            (Confirmed, Completed),
            (Confirmed, Cancelled),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for status in [BookingStatus::Completed, BookingStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.accepts_payment());
        }
        assert!(BookingStatus::Pending.accepts_payment());
        assert!(BookingStatus::Confirmed.accepts_payment());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Confirmed".parse::<BookingStatus>().unwrap(), BookingStatus::Confirmed);
        assert_eq!("canceled".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!("rejected".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_role_can_sell() {
        assert!(Role::Seller.can_sell());
        assert!(Role::Both.can_sell());
        assert!(!Role::Customer.can_sell());
        assert!(!Role::Admin.can_sell());
        assert_eq!("freelancer".parse::<Role>().unwrap(), Role::Seller);
    }

    #[test]
    fn test_channel_name() {
        let id = BookingId::new();
        let name = id.to_channel_name();
        assert!(name.starts_with("chat/"));
        assert_eq!(BookingId::from_channel_name(&name).unwrap(), id);
        assert_eq!(BookingId::from_channel_name(&format!("{name}/")).unwrap(), id);
        assert!(BookingId::from_channel_name("chat/42").is_err());
        assert!(BookingId::from_channel_name("room/abc").is_err());
    }

    #[test]
    fn test_preferred_date() {
        let date = parse_preferred_date("2025-06-01").unwrap();
        assert_eq!(date.to_string(), "2025-06-01");
        assert!(parse_preferred_date("2025-02-30").is_err());
        assert!(parse_preferred_date("tomorrow").is_err());
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(format_minor_units(10500), "105.00");
        assert_eq!(format_minor_units(5), "0.05");
        assert_eq!(parse_minor_units("105"), Some(10500));
        assert_eq!(parse_minor_units("105.5"), Some(10550));
        assert_eq!(parse_minor_units("105.05"), Some(10505));
        assert_eq!(parse_minor_units("1.234"), None);
        assert_eq!(parse_minor_units("abc"), None);
    }
}
