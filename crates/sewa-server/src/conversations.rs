//! Booking-scoped conversations.
//!
//! Every message, whether it arrives over REST or a socket, is stored through
//! [`ConversationService::post_message`], which is also the only place that
//! broadcasts to the booking's live channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sewa_shared::constants::{MAX_MESSAGE_CHARS, NO_MESSAGES_YET};
use sewa_shared::protocol::ChatFrame;
use sewa_shared::{BookingId, Principal, UserId};
use sewa_store::{ConversationSummary, Message, Participants};
use tracing::debug;

use crate::error::ServiceError;
use crate::hub::ChannelHub;
use crate::store::Store;

/// One entry of a user's inbox.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConversationView {
    pub booking_id: BookingId,
    pub listing_title: String,
    pub other_user: OtherParticipant,
    /// Body of the newest message, or a placeholder for empty threads.
    pub last_message: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_sender_id: Option<UserId>,
    pub unread_count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OtherParticipant {
    pub id: UserId,
    pub username: Option<String>,
}

impl From<ConversationSummary> for ConversationView {
    fn from(summary: ConversationSummary) -> Self {
        let (last_message, last_message_at, last_sender_id) = match summary.last_message {
            Some(last) => (last.body, Some(last.created_at), Some(last.sender_id)),
            None => (NO_MESSAGES_YET.to_string(), None, None),
        };
        Self {
            booking_id: summary.booking_id,
            listing_title: summary.listing_title,
            other_user: OtherParticipant {
                id: summary.other_user_id,
                username: summary.other_username,
            },
            last_message,
            last_message_at,
            last_sender_id,
            unread_count: summary.unread_count,
        }
    }
}

/// Wire form of a stored message.
pub fn chat_frame(message: &Message, sender_name: &str) -> ChatFrame {
    ChatFrame {
        id: message.id,
        booking_id: message.booking_id,
        seq: message.seq,
        sender_id: message.sender_id,
        user: sender_name.to_string(),
        message: message.body.clone(),
        timestamp: message.created_at,
    }
}

fn validate_body(body: &str) -> Result<(), ServiceError> {
    if body.trim().is_empty() {
        return Err(ServiceError::InvalidArgument(
            "Message body must not be empty".into(),
        ));
    }
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ServiceError::InvalidArgument(format!(
            "Message body exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(())
}

pub struct ConversationService {
    store: Store,
    hub: ChannelHub,
}

impl ConversationService {
    pub fn new(store: Store, hub: ChannelHub) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &ChannelHub {
        &self.hub
    }

    /// The booking's participants, if `user` is one of them.
    async fn authorize(&self, user: UserId, booking_id: BookingId) -> Result<Participants, ServiceError> {
        let participants = self
            .store
            .call(move |db| db.booking_participants(booking_id))
            .await?;
        if participants.contains(user) {
            Ok(participants)
        } else {
            Err(ServiceError::Forbidden(
                "Not a participant of this booking".into(),
            ))
        }
    }

    /// Store a message from `sender` and push it to the booking's channel.
    pub async fn post_message(
        &self,
        sender: &Principal,
        booking_id: BookingId,
        body: &str,
    ) -> Result<Message, ServiceError> {
        let participants = self.authorize(sender.id, booking_id).await?;
        validate_body(body)?;

        let receiver = participants
            .counterpart(sender.id)
            .ok_or_else(|| ServiceError::Forbidden("Not a participant of this booking".into()))?;
        let sender_id = sender.id;
        let body = body.to_string();

        let mut stored = None;
        let store = self.store.clone();
        self.hub
            .append(booking_id, async {
                let message = store
                    .call(move |db| db.append_message(booking_id, sender_id, receiver, &body))
                    .await?;
                let frame = chat_frame(&message, &sender.username);
                stored = Some(message);
                Ok(frame)
            })
            .await?;

        let message = stored.ok_or_else(|| ServiceError::Internal("message not stored".into()))?;
        debug!(booking = %booking_id, seq = message.seq, sender = %sender_id, "Message stored");
        Ok(message)
    }

    /// The full thread, ascending. Messages addressed to `requester` are
    /// marked read first.
    pub async fn list_messages(
        &self,
        requester: &Principal,
        booking_id: BookingId,
    ) -> Result<Vec<Message>, ServiceError> {
        self.authorize(requester.id, booking_id).await?;
        let reader = requester.id;
        let (messages, marked) = self
            .store
            .call(move |db| db.read_messages_for_booking(booking_id, reader))
            .await?;
        if marked > 0 {
            debug!(booking = %booking_id, reader = %reader, marked, "Messages marked read");
        }
        Ok(messages)
    }

    pub async fn list_conversations(
        &self,
        requester: &Principal,
    ) -> Result<Vec<ConversationView>, ServiceError> {
        let user = requester.id;
        let summaries = self.store.call(move |db| db.list_conversations(user)).await?;
        Ok(summaries.into_iter().map(ConversationView::from).collect())
    }
}
