use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::sync::Arc;

/// DbConnection manages the SQLite pool and schema for the portal.
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection, creating the database file and
    /// schema if they do not exist yet.
    pub async fn new(url: &str) -> Result<Self> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        let pool = SqlitePool::connect(url).await?;

        Self::setup_schema(&pool).await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Initialize a test database with a unique in-memory name.
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Set up the required database schema.
    ///
    /// The partial unique index on vaccinations enforces the invariant that a
    /// student holds at most one Completed record per vaccine name, even when
    /// two requests race past the service-level check.
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                class TEXT NOT NULL,
                grade_section TEXT NOT NULL,
                age INTEGER NOT NULL,
                gender TEXT NOT NULL,
                parent_name TEXT NOT NULL,
                contact_number TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vaccination_drives (
                id TEXT PRIMARY KEY,
                vaccine_name TEXT NOT NULL,
                drive_date TEXT NOT NULL,
                available_doses INTEGER NOT NULL,
                applicable_classes TEXT NOT NULL,
                status TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vaccinations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL REFERENCES students(id),
                drive_id TEXT NOT NULL,
                vaccine_name TEXT NOT NULL,
                date_administered TEXT NOT NULL,
                status TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_vaccinations_completed_once
                ON vaccinations (student_id, vaccine_name)
                WHERE status = 'Completed';
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vaccinations_student ON vaccinations (student_id);",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vaccinations_drive ON vaccinations (drive_id);",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_setup_is_idempotent() {
        let db = DbConnection::init_test().await.expect("Failed to create test database");

        // Running the schema setup again against the same pool must not fail.
        DbConnection::setup_schema(db.pool()).await.expect("Schema should be idempotent");
    }

    #[tokio::test]
    async fn test_completed_unique_index() {
        let db = DbConnection::init_test().await.expect("Failed to create test database");

        sqlx::query(
            "INSERT INTO vaccinations (student_id, drive_id, vaccine_name, date_administered, status)
             VALUES ('s1', 'd1', 'Polio', '2025-03-01T09:00:00Z', 'Completed')",
        )
        .execute(db.pool())
        .await
        .expect("First Completed record should insert");

        // A second Completed record for the same (student, vaccine) violates
        // the partial index, even when it came from a different drive.
        let dup = sqlx::query(
            "INSERT INTO vaccinations (student_id, drive_id, vaccine_name, date_administered, status)
             VALUES ('s1', 'd2', 'Polio', '2025-04-01T09:00:00Z', 'Completed')",
        )
        .execute(db.pool())
        .await;
        assert!(dup.is_err());

        // A Pending record for the same vaccine is fine.
        sqlx::query(
            "INSERT INTO vaccinations (student_id, drive_id, vaccine_name, date_administered, status)
             VALUES ('s1', 'd2', 'Polio', '2025-04-01T09:00:00Z', 'Pending')",
        )
        .execute(db.pool())
        .await
        .expect("Pending records are not constrained");
    }
}
