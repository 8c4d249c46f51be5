use std::path::Path;

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{BoxdeskError, Result};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub const APP_TABLES: [&str; 3] = ["absences", "reservations", "user_threads"];

pub(crate) type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
pub(crate) type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(QueryableByName)]
struct TableNameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
pub(crate) struct RowId {
    #[diesel(sql_type = BigInt)]
    pub(crate) id: i64,
}

/// Shared handle to the SQLite file backing the three application tables.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    path: String,
}

impl Database {
    /// Creates the parent directory, applies the init migration and builds the pool.
    ///
    /// Opening an already initialized file is a no-op for the schema.
    pub async fn open(path: impl AsRef<str>) -> Result<Self> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        run_migrations(path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        tracing::debug!(path, "database ready");
        Ok(Self {
            pool,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// User tables, excluding SQLite internals and the migration ledger.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let rows: Vec<TableNameRow> = diesel::sql_query(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .load(&mut conn)
        .await
        .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| row.name)
            .filter(|name| !name.starts_with("sqlite_") && !name.starts_with("__"))
            .collect())
    }

    /// Fails with `Unavailable` unless every application table exists and the file answers queries.
    pub async fn verify_schema(&self) -> Result<()> {
        let present = self.table_names().await?;
        let missing: Vec<&str> = APP_TABLES
            .into_iter()
            .filter(|table| !present.iter().any(|name| name == table))
            .collect();
        if !missing.is_empty() {
            return Err(BoxdeskError::Unavailable(format!(
                "missing tables: {}",
                missing.join(", ")
            )));
        }
        self.ping().await
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Unavailable(e.to_string()))?;
        Ok(())
    }

    pub(crate) async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| BoxdeskError::Unavailable(e.to_string()))
    }
}

pub(crate) async fn last_insert_id(conn: &mut SqlitePooledConn<'_>) -> Result<i32> {
    let row: RowId = diesel::sql_query("SELECT last_insert_rowid() as id")
        .get_result(conn)
        .await
        .map_err(|e| BoxdeskError::Database(e.to_string()))?;
    narrow_row_id(row.id)
}

fn narrow_row_id(id: i64) -> Result<i32> {
    i32::try_from(id).map_err(|_| BoxdeskError::Database(format!("row id {id} out of range")))
}

pub fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
        }
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = SqliteConnection::establish(&database_url)
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        Ok::<_, BoxdeskError>(())
    })
    .await
    .map_err(|e| BoxdeskError::Runtime(e.to_string()))??;
    Ok(())
}
