use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::db::Database;
use crate::error::{BoxdeskError, Result};
use crate::schema::user_threads;

#[derive(Insertable)]
#[diesel(table_name = user_threads)]
struct NewUserThread<'a> {
    user_id: &'a str,
    thread_id: &'a str,
}

/// Maps a chat user to its assistant conversation thread, one row per user.
#[derive(Clone)]
pub struct ThreadStore {
    db: Database,
}

impl ThreadStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<String>> {
        let mut conn = self.db.conn().await?;
        user_threads::table
            .find(user_id)
            .select(user_threads::thread_id)
            .first::<String>(&mut conn)
            .await
            .optional()
            .map_err(|e| BoxdeskError::Database(e.to_string()))
    }

    /// Inserts the mapping or replaces the thread of an existing user.
    pub async fn upsert(&self, user_id: &str, thread_id: &str) -> Result<()> {
        let mut conn = self.db.conn().await?;
        diesel::insert_into(user_threads::table)
            .values(&NewUserThread { user_id, thread_id })
            .on_conflict(user_threads::user_id)
            .do_update()
            .set(user_threads::thread_id.eq(excluded(user_threads::thread_id)))
            .execute(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn delete(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let deleted = diesel::delete(user_threads::table.find(user_id))
            .execute(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        Ok(deleted > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let mut conn = self.db.conn().await?;
        user_threads::table
            .count()
            .get_result(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))
    }
}
