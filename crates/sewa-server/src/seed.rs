//! Startup fixtures for the externally owned directories.
//!
//! Identity issuance and listing management live in other services. For a
//! standalone deployment their data (users with API tokens, listings and
//! packages) is loaded from a JSON file into the local tables.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use sewa_shared::{ListingId, PackageId, PackageTier, Principal, Role, UserId};
use sewa_store::{users::new_user, Database, Listing, Package};
use tracing::info;

use crate::auth::TokenDirectory;

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub listings: Vec<SeedListing>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub phone: Option<String>,
    /// Bearer token accepted for this user.
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedListing {
    pub id: ListingId,
    pub owner_id: UserId,
    pub title: String,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub packages: Vec<SeedPackage>,
}

#[derive(Debug, Deserialize)]
pub struct SeedPackage {
    pub id: PackageId,
    pub tier: PackageTier,
    pub title: String,
    pub price: i64,
    pub delivery_days: u32,
}

fn active() -> bool {
    true
}

pub fn load(path: &Path) -> anyhow::Result<Seed> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))
}

/// Write the seed into the database and build the token table.
pub fn apply(db: &Database, seed: &Seed) -> sewa_store::Result<TokenDirectory> {
    let mut tokens = TokenDirectory::new();

    for user in &seed.users {
        db.upsert_user(&new_user(user.id, &user.username, user.role, user.phone.as_deref()))?;
        if let Some(token) = user.token.as_deref().filter(|t| !t.is_empty()) {
            tokens.insert(
                token,
                Principal {
                    id: user.id,
                    username: user.username.clone(),
                    role: user.role,
                },
            );
        }
    }

    let mut packages = 0;
    for listing in &seed.listings {
        db.upsert_listing(&Listing {
            id: listing.id,
            owner_id: listing.owner_id,
            title: listing.title.clone(),
            is_active: listing.is_active,
            created_at: chrono::Utc::now(),
        })?;
        for package in &listing.packages {
            db.upsert_package(&Package {
                id: package.id,
                listing_id: listing.id,
                tier: package.tier,
                title: package.title.clone(),
                price: package.price,
                delivery_days: package.delivery_days,
            })?;
            packages += 1;
        }
    }

    info!(
        users = seed.users.len(),
        tokens = tokens.len(),
        listings = seed.listings.len(),
        packages,
        "Seed applied"
    );
    Ok(tokens)
}
