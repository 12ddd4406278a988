//! Derived conversation summaries.
//!
//! A conversation is not stored: it is the booking plus its messages, seen
//! from one participant. Unread counts are computed per (booking, reader)
//! against `idx_messages_unread`.

use rusqlite::params;
use sewa_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::{ConversationSummary, LastMessage};
use crate::sql;

const SUMMARY_SQL: &str = "
SELECT b.id,
       CASE WHEN b.buyer_id = ?1 THEN b.seller_id ELSE b.buyer_id END AS other_id,
       u.username,
       COALESCE(l.title, ''),
       b.created_at,
       (SELECT COUNT(*) FROM messages m
         WHERE m.booking_id = b.id AND m.receiver_id = ?1 AND m.is_read = 0),
       lm.seq,
       lm.sender_id,
       lm.body,
       lm.created_at
FROM bookings b
LEFT JOIN listings l ON l.id = b.listing_id
LEFT JOIN users u
       ON u.id = CASE WHEN b.buyer_id = ?1 THEN b.seller_id ELSE b.buyer_id END
LEFT JOIN messages lm
       ON lm.booking_id = b.id
      AND lm.seq = (SELECT MAX(seq) FROM messages WHERE booking_id = b.id)
WHERE b.buyer_id = ?1 OR b.seller_id = ?1";

impl Database {
    /// Every conversation `user` takes part in, most recent activity first.
    pub fn list_conversations(&self, user: UserId) -> Result<Vec<ConversationSummary>> {
        let mut stmt = self.conn().prepare(SUMMARY_SQL)?;
        let rows = stmt.query_map(params![user.to_string()], row_to_summary)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }

        summaries.sort_by(|a, b| {
            b.activity_at()
                .cmp(&a.activity_at())
                .then_with(|| b.booking_id.cmp(&a.booking_id))
        });
        Ok(summaries)
    }
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationSummary> {
    let booking: String = row.get(0)?;
    let other: String = row.get(1)?;
    let created: String = row.get(4)?;
    let last_seq: Option<i64> = row.get(6)?;

    let last_message = match last_seq {
        Some(seq) => {
            let sender: String = row.get(7)?;
            let ts: String = row.get(9)?;
            Some(LastMessage {
                seq,
                sender_id: sql::parse(7, &sender)?,
                body: row.get(8)?,
                created_at: sql::parse_ts(9, &ts)?,
            })
        }
        None => None,
    };

    Ok(ConversationSummary {
        booking_id: sql::parse(0, &booking)?,
        other_user_id: sql::parse(1, &other)?,
        other_username: row.get(2)?,
        listing_title: row.get(3)?,
        booking_created_at: sql::parse_ts(4, &created)?,
        unread_count: row.get(5)?,
        last_message,
    })
}
