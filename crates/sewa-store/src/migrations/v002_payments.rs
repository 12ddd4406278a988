use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS payments (
    transaction_id TEXT PRIMARY KEY NOT NULL, -- issued at initiation
    booking_id     TEXT NOT NULL,             -- FK -> bookings(id)
    amount         INTEGER NOT NULL,          -- minor units, fee included
    status         TEXT NOT NULL,             -- pending | completed | failed
    reference      TEXT,                      -- gateway reference, set on completion
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,

    FOREIGN KEY (booking_id) REFERENCES bookings(id)
);

CREATE INDEX IF NOT EXISTS idx_payments_booking ON payments(booking_id);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
