//! Listing directory tables.
//!
//! Listing management lives outside this service. These helpers load the
//! directory (seed fixtures) and answer the read-only lookups bookings need.

use rusqlite::params;
use sewa_shared::{ListingId, PackageId};

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{Listing, Package};
use crate::sql;

impl Database {
    pub fn upsert_listing(&self, listing: &Listing) -> Result<()> {
        self.conn().execute(
            "INSERT INTO listings (id, owner_id, title, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 title = excluded.title,
                 is_active = excluded.is_active",
            params![
                listing.id.to_string(),
                listing.owner_id.to_string(),
                listing.title,
                listing.is_active,
                sql::ts(&listing.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_package(&self, package: &Package) -> Result<()> {
        self.conn().execute(
            "INSERT INTO packages (id, listing_id, tier, title, price, delivery_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 tier = excluded.tier,
                 title = excluded.title,
                 price = excluded.price,
                 delivery_days = excluded.delivery_days",
            params![
                package.id.to_string(),
                package.listing_id.to_string(),
                package.tier.as_str(),
                package.title,
                package.price,
                package.delivery_days,
            ],
        )?;
        Ok(())
    }

    /// Remove a package. Bookings keep their tier and price snapshot.
    pub fn delete_package(&self, id: PackageId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM packages WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    pub fn get_listing(&self, id: ListingId) -> Result<Listing> {
        self.conn()
            .query_row(
                "SELECT id, owner_id, title, is_active, created_at
                 FROM listings WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let id: String = row.get(0)?;
                    let owner: String = row.get(1)?;
                    let created: String = row.get(4)?;
                    Ok(Listing {
                        id: sql::parse(0, &id)?,
                        owner_id: sql::parse(1, &owner)?,
                        title: row.get(2)?,
                        is_active: row.get(3)?,
                        created_at: sql::parse_ts(4, &created)?,
                    })
                },
            )
            .map_err(not_found)
    }

    pub fn get_package(&self, id: PackageId) -> Result<Package> {
        self.conn()
            .query_row(
                "SELECT id, listing_id, tier, title, price, delivery_days
                 FROM packages WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let id: String = row.get(0)?;
                    let listing: String = row.get(1)?;
                    let tier: String = row.get(2)?;
                    Ok(Package {
                        id: sql::parse(0, &id)?,
                        listing_id: sql::parse(1, &listing)?,
                        tier: sql::parse(2, &tier)?,
                        title: row.get(3)?,
                        price: row.get(4)?,
                        delivery_days: row.get(5)?,
                    })
                },
            )
            .map_err(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sewa_shared::{PackageTier, UserId};

    #[test]
    fn listing_and_package_lookup() {
        let db = Database::open_in_memory().unwrap();
        let listing = Listing {
            id: ListingId::new(),
            owner_id: UserId::new(),
            title: "Logo design".into(),
            is_active: true,
            created_at: Utc::now(),
        };
        db.upsert_listing(&listing).unwrap();

        let package = Package {
            id: PackageId::new(),
            listing_id: listing.id,
            tier: PackageTier::Basic,
            title: "One concept".into(),
            price: 500,
            delivery_days: 3,
        };
        db.upsert_package(&package).unwrap();

        assert_eq!(db.get_listing(listing.id).unwrap().title, "Logo design");
        assert_eq!(db.get_package(package.id).unwrap(), package);

        assert!(db.delete_package(package.id).unwrap());
        assert!(matches!(
            db.get_package(package.id),
            Err(crate::StoreError::NotFound)
        ));
    }
}
