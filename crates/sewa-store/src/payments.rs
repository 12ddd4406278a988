//! Gateway transactions opened against bookings.

use rusqlite::params;
use sewa_shared::BookingId;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{Payment, PaymentStatus};
use crate::sql;

impl Database {
    /// Open a pending payment for a booking.
    pub fn insert_payment(
        &self,
        transaction_id: &str,
        booking_id: BookingId,
        amount: i64,
    ) -> Result<Payment> {
        let now = sql::now();
        let payment = Payment {
            transaction_id: transaction_id.to_string(),
            booking_id,
            amount,
            status: PaymentStatus::Pending,
            reference: None,
            created_at: now,
            updated_at: now,
        };

        self.conn().execute(
            "INSERT INTO payments (transaction_id, booking_id, amount, status, reference, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)",
            params![
                payment.transaction_id,
                payment.booking_id.to_string(),
                payment.amount,
                payment.status.as_str(),
                sql::ts(&now),
            ],
        )?;

        Ok(payment)
    }

    pub fn get_payment(&self, transaction_id: &str) -> Result<Payment> {
        self.conn()
            .query_row(
                "SELECT transaction_id, booking_id, amount, status, reference, created_at, updated_at
                 FROM payments WHERE transaction_id = ?1",
                params![transaction_id],
                row_to_payment,
            )
            .map_err(not_found)
    }

    /// Move a payment out of `pending`. Returns `false` if it was not pending.
    pub fn settle_payment(
        &self,
        transaction_id: &str,
        status: PaymentStatus,
        reference: Option<&str>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE payments SET status = ?2, reference = COALESCE(?3, reference), updated_at = ?4
             WHERE transaction_id = ?1 AND status = 'pending'",
            params![transaction_id, status.as_str(), reference, sql::ts(&sql::now())],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
    let booking: String = row.get(1)?;
    let status: String = row.get(3)?;
    let created: String = row.get(5)?;
    let updated: String = row.get(6)?;

    Ok(Payment {
        transaction_id: row.get(0)?,
        booking_id: sql::parse(1, &booking)?,
        amount: row.get(2)?,
        status: sql::parse(3, &status)?,
        reference: row.get(4)?,
        created_at: sql::parse_ts(5, &created)?,
        updated_at: sql::parse_ts(6, &updated)?,
    })
}
