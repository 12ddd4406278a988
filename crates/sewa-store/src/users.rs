use rusqlite::params;
use sewa_shared::UserId;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::User;
use crate::sql;

impl Database {
    /// Insert a user profile, or refresh username/role/phone of a known id.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, role, phone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 role = excluded.role,
                 phone = excluded.phone",
            params![
                user.id.to_string(),
                user.username,
                user.role.as_str(),
                user.phone,
                sql::ts(&user.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, role, phone, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Fetch the profiles that exist among `ids`, in the same order.
    pub fn get_users(&self, ids: &[UserId]) -> Result<Vec<Option<User>>> {
        ids.iter()
            .map(|id| match self.get_user(*id) {
                Ok(user) => Ok(Some(user)),
                Err(crate::StoreError::NotFound) => Ok(None),
                Err(e) => Err(e),
            })
            .collect()
    }
}

/// Build a profile with the current time as creation date.
pub fn new_user(id: UserId, username: &str, role: sewa_shared::Role, phone: Option<&str>) -> User {
    User {
        id,
        username: username.to_string(),
        role,
        phone: phone.map(str::to_string),
        created_at: sql::now(),
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let role: String = row.get(2)?;
    let created: String = row.get(4)?;

    Ok(User {
        id: sql::parse(0, &id)?,
        username: row.get(1)?,
        role: sql::parse(2, &role)?,
        phone: row.get(3)?,
        created_at: sql::parse_ts(4, &created)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sewa_shared::Role;

    #[test]
    fn upsert_refreshes_profile() {
        let db = Database::open_in_memory().unwrap();
        let id = UserId::new();

        db.upsert_user(&new_user(id, "sita", Role::Customer, None)).unwrap();
        db.upsert_user(&new_user(id, "sita", Role::Both, Some("9800000000")))
            .unwrap();

        let user = db.get_user(id).unwrap();
        assert_eq!(user.role, Role::Both);
        assert_eq!(user.phone.as_deref(), Some("9800000000"));
    }

    #[test]
    fn missing_user() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_user(UserId::new()), Err(crate::StoreError::NotFound)));

        let known = UserId::new();
        db.upsert_user(&new_user(known, "raju", Role::Seller, None)).unwrap();
        let found = db.get_users(&[known, UserId::new()]).unwrap();
        assert!(found[0].is_some());
        assert!(found[1].is_none());
    }
}
