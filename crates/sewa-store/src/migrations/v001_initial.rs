//! v001 -- Initial schema creation.
//!
//! Users and the read-only listing directory, plus the two core tables:
//! `bookings` and `messages`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (profile mirror of the identity provider)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID
    username   TEXT NOT NULL,
    role       TEXT NOT NULL,                 -- customer | seller | both | admin
    phone      TEXT,
    created_at TEXT NOT NULL                  -- RFC-3339
);

-- ----------------------------------------------------------------
-- Listings and packages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS listings (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID
    owner_id   TEXT NOT NULL,                 -- user id, not enforced
    title      TEXT NOT NULL,
    is_active  INTEGER NOT NULL DEFAULT 1,    -- boolean 0/1
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_listings_owner ON listings(owner_id);

CREATE TABLE IF NOT EXISTS packages (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID
    listing_id    TEXT NOT NULL,              -- FK -> listings(id)
    tier          TEXT NOT NULL,              -- basic | standard | premium
    title         TEXT NOT NULL,
    price         INTEGER NOT NULL,           -- whole currency units
    delivery_days INTEGER NOT NULL,

    FOREIGN KEY (listing_id) REFERENCES listings(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_tier ON packages(listing_id, tier);

-- ----------------------------------------------------------------
-- Bookings
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS bookings (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID
    buyer_id       TEXT NOT NULL,             -- principal id
    seller_id      TEXT NOT NULL,             -- listing owner at creation
    listing_id     TEXT NOT NULL,             -- FK -> listings(id)
    package_id     TEXT,                      -- nullable, package may be deleted
    package_tier   TEXT NOT NULL,             -- snapshot
    price          INTEGER NOT NULL,          -- snapshot
    preferred_date TEXT NOT NULL,             -- YYYY-MM-DD
    message        TEXT NOT NULL DEFAULT '',
    status         TEXT NOT NULL,             -- pending | confirmed | completed | cancelled
    paid           INTEGER NOT NULL DEFAULT 0,
    transaction_id TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,

    CHECK (buyer_id <> seller_id),
    CHECK (status IN ('pending', 'confirmed', 'completed', 'cancelled')),
    FOREIGN KEY (listing_id) REFERENCES listings(id),
    FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_bookings_buyer ON bookings(buyer_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_bookings_seller ON bookings(seller_id, created_at DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID
    booking_id  TEXT NOT NULL,                -- FK -> bookings(id)
    seq         INTEGER NOT NULL,             -- per-booking sort key
    sender_id   TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    body        TEXT NOT NULL,
    created_at  TEXT NOT NULL,                -- display only
    is_read     INTEGER NOT NULL DEFAULT 0,

    CHECK (sender_id <> receiver_id),
    FOREIGN KEY (booking_id) REFERENCES bookings(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_booking_seq ON messages(booking_id, seq);
CREATE INDEX IF NOT EXISTS idx_messages_unread ON messages(booking_id, receiver_id, is_read);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
