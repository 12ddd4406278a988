//! Real-time chat sockets at `/ws/chat/{booking_id}`.
//!
//! Each socket moves through [`ConnectionState`]: anonymous callers are closed
//! straight away, participants are subscribed to the booking's channel, and
//! any other authenticated caller stays connected but unsubscribed with every
//! inbound frame dropped. Participation is checked again for every frame.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use sewa_shared::constants::CONNECTION_QUEUE_CAPACITY;
use sewa_shared::protocol::{ChatFrame, InboundFrame, OutboundFrame};
use sewa_shared::{BookingId, Principal};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bookings::BookingService;
use crate::conversations::{chat_frame, ConversationService};
use crate::error::ServiceError;
use crate::hub::ConnectionId;

/// How long a closing connection may take to flush its queue.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authorizing,
    Open,
    Closed,
}

/// One accepted socket.
#[derive(Debug)]
pub struct ChatConnection {
    pub id: ConnectionId,
    pub principal: Principal,
    /// `None` when the requested channel name did not name a booking.
    pub booking_id: Option<BookingId>,
    pub subscribed: bool,
    state: ConnectionState,
}

impl ChatConnection {
    fn new(principal: Principal, booking_id: Option<BookingId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal,
            booking_id,
            subscribed: false,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn advance(&mut self, next: ConnectionState) {
        debug!(connection = %self.id, from = ?self.state, to = ?next, "Connection state");
        self.state = next;
    }
}

/// What became of one inbound frame.
#[derive(Debug, PartialEq)]
pub enum InboundOutcome {
    /// Stored and sent to every subscriber.
    Broadcast(ChatFrame),
    /// Reported to the originating connection only.
    Rejected(OutboundFrame),
    /// Ignored without a reply.
    Dropped,
}

pub struct Gateway {
    bookings: Arc<BookingService>,
    conversations: Arc<ConversationService>,
    idle_timeout: Duration,
}

impl Gateway {
    pub fn new(
        bookings: Arc<BookingService>,
        conversations: Arc<ConversationService>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            bookings,
            conversations,
            idle_timeout,
        }
    }

    /// Decide whether a new connection joins the booking's channel.
    ///
    /// A failed lookup marks the connection closed.
    pub async fn authorize(&self, conn: &mut ChatConnection) -> Result<(), ServiceError> {
        conn.advance(ConnectionState::Authorizing);

        if let Some(booking_id) = conn.booking_id {
            match self.bookings.participants(booking_id).await {
                Ok(participants) if participants.contains(conn.principal.id) => {
                    conn.subscribed = true;
                }
                Ok(_) | Err(ServiceError::NotFound(_)) => {}
                Err(e) => {
                    warn!(connection = %conn.id, booking = %booking_id, error = %e, "Participant lookup failed");
                    conn.advance(ConnectionState::Closed);
                    return Err(e);
                }
            }
        }

        if !conn.subscribed {
            debug!(
                connection = %conn.id,
                user = %conn.principal.id,
                "Connection open without channel membership"
            );
        }
        conn.advance(ConnectionState::Open);
        Ok(())
    }

    /// Handle one text frame from an open connection.
    pub async fn handle_inbound(&self, conn: &ChatConnection, text: &str) -> InboundOutcome {
        let Some(booking_id) = conn.booking_id else {
            return InboundOutcome::Dropped;
        };

        match self.bookings.participants(booking_id).await {
            Ok(participants) if participants.contains(conn.principal.id) => {}
            Ok(_) | Err(ServiceError::NotFound(_)) => {
                debug!(connection = %conn.id, booking = %booking_id, "Dropping frame from non-participant");
                return InboundOutcome::Dropped;
            }
            Err(e) => {
                warn!(connection = %conn.id, booking = %booking_id, error = %e, "Participant re-check failed");
                // Only connections admitted as participants learn about it.
                return if conn.subscribed {
                    InboundOutcome::Rejected(OutboundFrame::error(e.public_message()))
                } else {
                    InboundOutcome::Dropped
                };
            }
        }

        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(_) => {
                return InboundOutcome::Rejected(OutboundFrame::error(
                    "Malformed frame, expected {\"message\": \"...\"}",
                ))
            }
        };

        match self
            .conversations
            .post_message(&conn.principal, booking_id, &frame.message)
            .await
        {
            Ok(message) => InboundOutcome::Broadcast(chat_frame(&message, &conn.principal.username)),
            Err(e) => InboundOutcome::Rejected(OutboundFrame::error(e.public_message())),
        }
    }

    /// Drive an upgraded socket until it closes or idles out.
    ///
    /// The connection counts as idle when no frame has moved in either
    /// direction for the idle timeout.
    pub async fn run(
        self: Arc<Self>,
        mut socket: WebSocket,
        channel: String,
        principal: Option<Principal>,
    ) {
        let Some(principal) = principal else {
            debug!(channel = %channel, "Closing anonymous connection");
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        };

        let booking_id = BookingId::from_channel_name(&channel).ok();
        let mut conn = ChatConnection::new(principal, booking_id);
        if self.authorize(&mut conn).await.is_err() {
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }

        let (sink, mut stream) = socket.split();
        let (tx, rx) = mpsc::channel::<OutboundFrame>(CONNECTION_QUEUE_CAPACITY);
        let activity = Arc::new(Notify::new());
        let mut forwarder = tokio::spawn(forward(sink, rx, activity.clone()));
        let mut forwarder_done = false;

        if let (true, Some(booking_id)) = (conn.subscribed, conn.booking_id) {
            self.conversations
                .hub()
                .subscribe(booking_id, conn.id, tx.clone())
                .await;
        }
        info!(
            connection = %conn.id,
            user = %conn.principal.id,
            channel = %channel,
            subscribed = conn.subscribed,
            "Chat connection open"
        );

        let idle = tokio::time::sleep(self.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = &mut forwarder => {
                    forwarder_done = true;
                    break;
                }
                () = &mut idle => {
                    info!(connection = %conn.id, "Closing idle chat connection");
                    break;
                }
                () = activity.notified() => {
                    idle.as_mut().reset(Instant::now() + self.idle_timeout);
                }
                next = stream.next() => {
                    idle.as_mut().reset(Instant::now() + self.idle_timeout);
                    let message = match next {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            debug!(connection = %conn.id, error = %e, "Socket error");
                            break;
                        }
                        None => break,
                    };

                    match message {
                        WsMessage::Text(text) => {
                            if let InboundOutcome::Rejected(frame) = self.handle_inbound(&conn, &text).await {
                                let _ = tx.try_send(frame);
                            }
                        }
                        WsMessage::Close(_) => break,
                        // Pings are answered by the transport; binary frames are not
                        // part of the protocol.
                        _ => {}
                    }
                }
            }
        }

        if let (true, Some(booking_id)) = (conn.subscribed, conn.booking_id) {
            self.conversations.hub().unsubscribe(booking_id, conn.id).await;
        }
        // With the last sender gone the forwarder flushes and sends a close frame.
        drop(tx);
        if !forwarder_done
            && tokio::time::timeout(CLOSE_GRACE, &mut forwarder).await.is_err()
        {
            forwarder.abort();
        }
        conn.advance(ConnectionState::Closed);
        info!(connection = %conn.id, state = ?conn.state(), "Chat connection closed");
    }
}

/// Write queued frames to the socket until the queue closes or the peer goes away.
async fn forward(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<OutboundFrame>,
    activity: Arc<Notify>,
) {
    while let Some(frame) = rx.recv().await {
        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode outbound frame");
                continue;
            }
        };
        if let Err(e) = sink.send(WsMessage::Text(json)).await {
            debug!(error = %e, "Failed to write to socket, client likely disconnected");
            return;
        }
        activity.notify_one();
    }
    let _ = sink.send(WsMessage::Close(None)).await;
}
