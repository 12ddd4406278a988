use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use sewa_shared::{BookingId, MessageId, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::Message;
use crate::sql;

impl Database {
    /// Append a message to a booking's conversation.
    ///
    /// Runs in one immediate transaction: the next `seq` is `max(seq) + 1`
    /// for the booking, and `created_at` never goes below the previous
    /// message's timestamp even if the wall clock steps back.
    pub fn append_message(
        &mut self,
        booking_id: BookingId,
        sender_id: UserId,
        receiver_id: UserId,
        body: &str,
    ) -> Result<Message> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let last: Option<(i64, String)> = tx
            .query_row(
                "SELECT seq, created_at FROM messages
                 WHERE booking_id = ?1
                 ORDER BY seq DESC LIMIT 1",
                params![booking_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let now = sql::now();
        let (seq, created_at) = match last {
            Some((seq, ts)) => {
                let previous: DateTime<Utc> = sql::parse_ts(1, &ts)?;
                (seq + 1, now.max(previous))
            }
            None => (1, now),
        };

        let message = Message {
            id: MessageId::new(),
            booking_id,
            seq,
            sender_id,
            receiver_id,
            body: body.to_string(),
            created_at,
            is_read: false,
        };

        tx.execute(
            "INSERT INTO messages (id, booking_id, seq, sender_id, receiver_id, body, created_at, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                message.id.to_string(),
                message.booking_id.to_string(),
                message.seq,
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.body,
                sql::ts(&message.created_at),
            ],
        )?;

        tx.commit()?;
        Ok(message)
    }

    /// Mark every message addressed to `reader` as read, then return the
    /// whole thread. Both steps share one transaction.
    pub fn read_messages_for_booking(
        &mut self,
        booking_id: BookingId,
        reader: UserId,
    ) -> Result<(Vec<Message>, usize)> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let marked = tx.execute(
            "UPDATE messages SET is_read = 1
             WHERE booking_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![booking_id.to_string(), reader.to_string()],
        )?;

        let messages = {
            let mut stmt = tx.prepare(
                "SELECT id, booking_id, seq, sender_id, receiver_id, body, created_at, is_read
                 FROM messages
                 WHERE booking_id = ?1
                 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![booking_id.to_string()], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            messages
        };

        tx.commit()?;
        Ok((messages, marked))
    }
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let booking: String = row.get(1)?;
    let sender: String = row.get(3)?;
    let receiver: String = row.get(4)?;
    let created: String = row.get(6)?;

    Ok(Message {
        id: sql::parse(0, &id)?,
        booking_id: sql::parse(1, &booking)?,
        seq: row.get(2)?,
        sender_id: sql::parse(3, &sender)?,
        receiver_id: sql::parse(4, &receiver)?,
        body: row.get(5)?,
        created_at: sql::parse_ts(6, &created)?,
        is_read: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookings::tests::{book, fixture, Fixture};

    fn unread(f: &Fixture, booking_id: BookingId, reader: UserId) -> u32 {
        f.db.list_conversations(reader)
            .unwrap()
            .into_iter()
            .find(|c| c.booking_id == booking_id)
            .map_or(0, |c| c.unread_count)
    }

    #[test]
    fn sequence_is_dense_and_ordered() {
        let mut f = fixture();
        let booking = book(&f);
        let (buyer, seller) = (f.buyer, f.seller);

        let a = f.db.append_message(booking.id, buyer, seller, "Hello").unwrap();
        let b = f.db.append_message(booking.id, seller, buyer, "Hi!").unwrap();
        let c = f.db.append_message(booking.id, buyer, seller, "  spaced  ").unwrap();
        assert_eq!((a.seq, b.seq, c.seq), (1, 2, 3));
        assert!(a.created_at <= b.created_at && b.created_at <= c.created_at);

        let (thread, _) = f.db.read_messages_for_booking(booking.id, buyer).unwrap();
        assert_eq!(
            thread.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(),
            vec!["Hello", "Hi!", "  spaced  "]
        );
    }

    #[test]
    fn sequences_are_per_booking() {
        let mut f = fixture();
        let first = book(&f);
        let second = book(&f);
        let (buyer, seller) = (f.buyer, f.seller);

        f.db.append_message(first.id, buyer, seller, "one").unwrap();
        f.db.append_message(first.id, buyer, seller, "two").unwrap();
        let other = f.db.append_message(second.id, buyer, seller, "other").unwrap();
        assert_eq!(other.seq, 1);
    }

    #[test]
    fn reading_marks_only_own_messages() {
        let mut f = fixture();
        let booking = book(&f);
        let (buyer, seller) = (f.buyer, f.seller);

        f.db.append_message(booking.id, buyer, seller, "to seller 1").unwrap();
        f.db.append_message(booking.id, buyer, seller, "to seller 2").unwrap();
        f.db.append_message(booking.id, seller, buyer, "to buyer").unwrap();

        assert_eq!(unread(&f, booking.id, seller), 2);
        assert_eq!(unread(&f, booking.id, buyer), 1);

        let (thread, marked) = f.db.read_messages_for_booking(booking.id, seller).unwrap();
        assert_eq!(marked, 2);
        assert_eq!(thread.len(), 3);
        assert!(thread.iter().filter(|m| m.receiver_id == seller).all(|m| m.is_read));
        assert!(thread.iter().filter(|m| m.receiver_id == buyer).all(|m| !m.is_read));

        assert_eq!(unread(&f, booking.id, seller), 0);
        assert_eq!(unread(&f, booking.id, buyer), 1);

        let (_, marked_again) = f.db.read_messages_for_booking(booking.id, seller).unwrap();
        assert_eq!(marked_again, 0);
    }

    #[test]
    fn message_requires_existing_booking() {
        let mut f = fixture();
        let (buyer, seller) = (f.buyer, f.seller);
        assert!(f
            .db
            .append_message(BookingId::new(), buyer, seller, "orphan")
            .is_err());
    }
}
