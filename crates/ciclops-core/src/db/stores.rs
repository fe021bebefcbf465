//! Store registry operations

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::Store;

impl Database {
    /// Create or update a store
    pub fn upsert_store(&self, store: &Store) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO stores (id, name, aliases) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, aliases = excluded.aliases",
            params![store.id, store.name, serde_json::to_string(&store.aliases)?],
        )?;
        Ok(())
    }

    /// List all stores ordered by ID
    pub fn list_stores(&self) -> Result<Vec<Store>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, aliases FROM stores ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, aliases)| -> Result<Store> {
                Ok(Store {
                    id,
                    name,
                    aliases: serde_json::from_str(&aliases)?,
                })
            })
            .collect()
    }

    /// Make sure every configured store exists. Returns how many were written.
    pub fn sync_stores(&self, stores: &[Store]) -> Result<usize> {
        for store in stores {
            self.upsert_store(store)?;
        }
        Ok(stores.len())
    }
}
