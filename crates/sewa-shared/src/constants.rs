/// Prefix of every real-time channel name (`chat/{booking_id}`).
pub const CHANNEL_PREFIX: &str = "chat/";

/// Upper bound on a single chat message body, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Shown in conversation summaries for threads without any message.
pub const NO_MESSAGES_YET: &str = "No messages yet";

/// Buyer-side service fee added on top of the package price, in percent.
pub const BUYER_FEE_PERCENT: i64 = 5;

/// Format accepted for a booking's preferred date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Capacity of the outbound frame queue of one real-time connection.
pub const CONNECTION_QUEUE_CAPACITY: usize = 256;
