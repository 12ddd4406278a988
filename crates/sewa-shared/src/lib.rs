//! # sewa-shared
//!
//! Types shared by the store and the server: identifiers, principals and
//! roles, the booking state machine, and the real-time chat frame protocol.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ParseError;
pub use types::*;
