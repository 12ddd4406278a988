use thiserror::Error;

/// Failures turning untrusted text into a domain value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown booking status: {0}")]
    BookingStatus(String),

    #[error("Unknown payment status: {0}")]
    PaymentStatus(String),

    #[error("Unknown role: {0}")]
    Role(String),

    #[error("Unknown package tier: {0}")]
    PackageTier(String),

    #[error("Invalid identifier: {0}")]
    Id(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    Date(String),

    #[error("Invalid channel name: {0}")]
    Channel(String),
}
