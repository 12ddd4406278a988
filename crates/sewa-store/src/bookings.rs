//! Booking persistence.
//!
//! Status changes go through [`Database::update_booking_status`], a single
//! `UPDATE ... WHERE status = expected` statement, so two concurrent
//! transitions from the same state cannot both apply.

use rusqlite::{params, TransactionBehavior};
use sewa_shared::{BookingId, BookingStatus, UserId};

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{Booking, NewBooking, PaidMark, Participants, StatusUpdate};
use crate::sql;

const BOOKING_COLUMNS: &str = "id, buyer_id, seller_id, listing_id, package_id, package_tier, price,
     preferred_date, message, status, paid, transaction_id, created_at, updated_at";

impl Database {
    /// Persist a new booking in `pending`.
    pub fn insert_booking(&self, new: &NewBooking) -> Result<Booking> {
        let now = sql::now();
        let booking = Booking {
            id: BookingId::new(),
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            listing_id: new.listing_id,
            package_id: Some(new.package_id),
            package_tier: new.package_tier,
            price: new.price,
            preferred_date: new.preferred_date,
            message: new.message.clone(),
            status: BookingStatus::Pending,
            paid: false,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };

        self.conn().execute(
            &format!(
                "INSERT INTO bookings ({BOOKING_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                booking.id.to_string(),
                booking.buyer_id.to_string(),
                booking.seller_id.to_string(),
                booking.listing_id.to_string(),
                booking.package_id.map(|p| p.to_string()),
                booking.package_tier.as_str(),
                booking.price,
                booking.preferred_date.format("%Y-%m-%d").to_string(),
                booking.message,
                booking.status.as_str(),
                booking.paid,
                booking.transaction_id,
                sql::ts(&booking.created_at),
                sql::ts(&booking.updated_at),
            ],
        )?;

        Ok(booking)
    }

    pub fn get_booking(&self, id: BookingId) -> Result<Booking> {
        self.conn()
            .query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
                params![id.to_string()],
                row_to_booking,
            )
            .map_err(not_found)
    }

    /// The buyer and seller of a booking.
    pub fn booking_participants(&self, id: BookingId) -> Result<Participants> {
        self.conn()
            .query_row(
                "SELECT buyer_id, seller_id FROM bookings WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let buyer: String = row.get(0)?;
                    let seller: String = row.get(1)?;
                    Ok(Participants {
                        buyer: sql::parse(0, &buyer)?,
                        seller: sql::parse(1, &seller)?,
                    })
                },
            )
            .map_err(not_found)
    }

    /// Bookings made by `buyer`, newest first.
    pub fn list_bookings_for_buyer(&self, buyer: UserId) -> Result<Vec<Booking>> {
        self.list_bookings_where("buyer_id", buyer)
    }

    /// Bookings received by `seller` on their listings, newest first.
    pub fn list_bookings_for_seller(&self, seller: UserId) -> Result<Vec<Booking>> {
        self.list_bookings_where("seller_id", seller)
    }

    fn list_bookings_where(&self, column: &str, user: UserId) -> Result<Vec<Booking>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE {column} = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;

        let rows = stmt.query_map(params![user.to_string()], row_to_booking)?;

        let mut bookings = Vec::new();
        for row in rows {
            bookings.push(row?);
        }
        Ok(bookings)
    }

    /// Compare-and-swap the status of a booking.
    ///
    /// Applies `expected -> next` only if the stored status still equals
    /// `expected`. Callers validate the transition itself.
    pub fn update_booking_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> Result<StatusUpdate> {
        let affected = self.conn().execute(
            "UPDATE bookings SET status = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?2",
            params![
                id.to_string(),
                expected.as_str(),
                next.as_str(),
                sql::ts(&sql::now()),
            ],
        )?;

        let booking = self.get_booking(id)?;
        if affected == 1 {
            Ok(StatusUpdate::Applied(booking))
        } else {
            Ok(StatusUpdate::Stale(booking.status))
        }
    }

    /// Record an external payment against a booking.
    ///
    /// Replaying the same transaction id is a no-op; a different one on an
    /// already-paid booking is reported as a conflict.
    pub fn mark_booking_paid(&mut self, id: BookingId, transaction_id: &str) -> Result<PaidMark> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = tx
            .query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
                params![id.to_string()],
                row_to_booking,
            )
            .map_err(not_found)?;

        let outcome = if current.paid {
            match current.transaction_id.clone() {
                Some(existing) if existing == transaction_id => PaidMark::AlreadyRecorded(current),
                existing => PaidMark::Conflict {
                    existing: existing.unwrap_or_default(),
                },
            }
        } else if !current.status.accepts_payment() {
            PaidMark::NotPayable(current.status)
        } else {
            let now = sql::now();
            tx.execute(
                "UPDATE bookings SET paid = 1, transaction_id = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id.to_string(), transaction_id, sql::ts(&now)],
            )?;
            PaidMark::Recorded(Booking {
                paid: true,
                transaction_id: Some(transaction_id.to_string()),
                updated_at: now,
                ..current
            })
        };

        tx.commit()?;
        Ok(outcome)
    }
}

fn row_to_booking(row: &rusqlite::Row<'_>) -> rusqlite::Result<Booking> {
    let id: String = row.get(0)?;
    let buyer: String = row.get(1)?;
    let seller: String = row.get(2)?;
    let listing: String = row.get(3)?;
    let package: Option<String> = row.get(4)?;
    let tier: String = row.get(5)?;
    let date: String = row.get(7)?;
    let status: String = row.get(9)?;
    let created: String = row.get(12)?;
    let updated: String = row.get(13)?;

    Ok(Booking {
        id: sql::parse(0, &id)?,
        buyer_id: sql::parse(1, &buyer)?,
        seller_id: sql::parse(2, &seller)?,
        listing_id: sql::parse(3, &listing)?,
        package_id: package.map(|p| sql::parse(4, &p)).transpose()?,
        package_tier: sql::parse(5, &tier)?,
        price: row.get(6)?,
        preferred_date: sql::parse_date(7, &date)?,
        message: row.get(8)?,
        status: sql::parse(9, &status)?,
        paid: row.get(10)?,
        transaction_id: row.get(11)?,
        created_at: sql::parse_ts(12, &created)?,
        updated_at: sql::parse_ts(13, &updated)?,
    })
}
