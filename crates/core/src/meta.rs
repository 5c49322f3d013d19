use crate::error::Result;
use crate::models::FileRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::debug;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    file_id          TEXT PRIMARY KEY,
    file_name        TEXT NOT NULL UNIQUE,
    file_size        INTEGER NOT NULL,
    num_pages        INTEGER NOT NULL,
    checksum         TEXT NOT NULL,
    uploaded_at      TEXT NOT NULL,
    embedding_status INTEGER NOT NULL DEFAULT 0
);
"#;

/// Metadata table for uploaded files. The records here and the vector
/// index are the source of truth; everything else is rebuildable.
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        debug!(path = %db_path.display(), "connecting to metadata database");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert_file(&self, record: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (file_id, file_name, file_size, num_pages, checksum, uploaded_at, embedding_status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.file_id)
        .bind(&record.file_name)
        .bind(record.file_size)
        .bind(record.num_pages)
        .bind(&record.checksum)
        .bind(&record.uploaded_at)
        .bind(record.embedding_status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Upload dedup key: two uploads with the same name resolve to the
    /// same record.
    pub async fn get_file_by_name(&self, file_name: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE file_name = ?")
            .bind(file_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let records =
            sqlx::query_as::<_, FileRecord>("SELECT * FROM files ORDER BY uploaded_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(records)
    }

    /// Flips `embedding_status` to true. Monotonic; only a delete
    /// removes the record and with it the flag.
    pub async fn mark_embedded(&self, file_id: &str) -> Result<()> {
        sqlx::query("UPDATE files SET embedding_status = 1 WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MetaDb;
    use crate::models::FileRecord;

    async fn fresh_db() -> MetaDb {
        let db = MetaDb::connect_in_memory().await.expect("connect");
        db.init_schema().await.expect("schema");
        db
    }

    #[tokio::test]
    async fn records_round_trip_by_id_and_name() {
        let db = fresh_db().await;
        let record = FileRecord::new("manual.pdf".into(), 2048, 3, "c0ffee".into());
        db.insert_file(&record).await.expect("insert");

        let by_id = db.get_file(&record.file_id).await.expect("get").unwrap();
        assert_eq!(by_id.file_name, "manual.pdf");
        assert!(!by_id.embedding_status);

        let by_name = db
            .get_file_by_name("manual.pdf")
            .await
            .expect("get by name")
            .unwrap();
        assert_eq!(by_name.file_id, record.file_id);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_by_the_table() {
        let db = fresh_db().await;
        let first = FileRecord::new("dup.pdf".into(), 10, 1, "a".into());
        let second = FileRecord::new("dup.pdf".into(), 20, 2, "b".into());

        db.insert_file(&first).await.expect("insert first");
        assert!(db.insert_file(&second).await.is_err());
    }

    #[tokio::test]
    async fn mark_embedded_flips_only_the_status() {
        let db = fresh_db().await;
        let record = FileRecord::new("flip.pdf".into(), 10, 1, "a".into());
        db.insert_file(&record).await.expect("insert");

        db.mark_embedded(&record.file_id).await.expect("mark");

        let updated = db.get_file(&record.file_id).await.expect("get").unwrap();
        assert!(updated.embedding_status);
        assert_eq!(updated.uploaded_at, record.uploaded_at);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let db = fresh_db().await;
        let record = FileRecord::new("gone.pdf".into(), 10, 1, "a".into());
        db.insert_file(&record).await.expect("insert");

        db.delete_file(&record.file_id).await.expect("first delete");
        db.delete_file(&record.file_id)
            .await
            .expect("second delete");
        assert!(db.get_file(&record.file_id).await.expect("get").is_none());
    }
}
