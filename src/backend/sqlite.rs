use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::memory::new_record_id;
use super::{has_alias, is_account_named, Directory, DirectoryFactory, FilteringCursor, RecordCursor};
use crate::config::DatabaseConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{ItemValue, Record};
use crate::naming::CanonicalName;
use crate::parser::formula::parse_formula;
use crate::parser::ObjectClass;

/// Directory persisted in a SQLite database.
///
/// Each record is one row of the `documents` table with its items as JSON.
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub async fn connect(config: &DatabaseConfig) -> ConnectorResult<Self> {
        // Every connection to an in-memory database is a separate database
        let max_connections = if config.url.contains(":memory:") {
            1
        } else {
            config.max_connections
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| {
                ConnectorError::BackendUnavailable(format!(
                    "Failed to connect to {}: {}",
                    config.url, e
                ))
            })?;

        let directory = Self { pool };
        directory.init_schema().await?;
        Ok(directory)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> ConnectorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                form TEXT NOT NULL,
                items TEXT NOT NULL,
                last_modified DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ConnectorError::Database(format!("Failed to create documents table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_form ON documents (form)")
            .execute(&self.pool)
            .await
            .map_err(|e| ConnectorError::Database(format!("Failed to create form index: {}", e)))?;

        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> ConnectorResult<Record> {
        let id: String = row.try_get("id")?;
        let items: String = row.try_get("items")?;
        let last_modified: DateTime<Utc> = row.try_get("last_modified")?;
        let items: BTreeMap<String, Vec<ItemValue>> = serde_json::from_str(&items)?;

        Ok(Record {
            id: Some(id),
            items,
            last_modified: Some(last_modified),
        })
    }

    async fn records_of(&self, object_class: ObjectClass) -> ConnectorResult<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT id, items, last_modified FROM documents WHERE form = ? COLLATE NOCASE ORDER BY id",
        )
        .bind(object_class.form())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn is_alive(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn lookup_account_by_name(
        &self,
        name: &CanonicalName,
    ) -> ConnectorResult<Option<Record>> {
        Ok(self
            .records_of(ObjectClass::Account)
            .await?
            .into_iter()
            .find(|record| is_account_named(record, name)))
    }

    async fn lookup_account_by_id(&self, id: &str) -> ConnectorResult<Option<Record>> {
        let row = sqlx::query(
            "SELECT id, items, last_modified FROM documents WHERE id = ? COLLATE NOCASE AND form = ?",
        )
        .bind(id)
        .bind(ObjectClass::Account.form())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn lookup_group_by_display_name(&self, name: &str) -> ConnectorResult<Option<Record>> {
        Ok(self
            .records_of(ObjectClass::Group)
            .await?
            .into_iter()
            .find(|record| has_alias(record, name)))
    }

    async fn search_records(
        &self,
        object_class: ObjectClass,
        query: Option<&str>,
    ) -> ConnectorResult<Box<dyn RecordCursor>> {
        let formula = query.map(parse_formula).transpose()?;
        let records = self.records_of(object_class).await?;
        Ok(Box::new(FilteringCursor::new(records, formula)))
    }

    async fn save_record(&self, record: &mut Record) -> ConnectorResult<()> {
        let identity = record.identity();
        let form = record
            .form()
            .ok_or_else(|| ConnectorError::record_save(&identity, "record has no Form item"))?
            .to_string();
        let id = record.id.get_or_insert_with(new_record_id).clone();
        let now = Utc::now();
        let items = serde_json::to_string(&record.items)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, form, items, last_modified)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                form = excluded.form,
                items = excluded.items,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(&id)
        .bind(&form)
        .bind(&items)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ConnectorError::record_save(&identity, e))?;

        debug!("Saved record {} ({})", id, identity);
        record.last_modified = Some(now);
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> ConnectorResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Opens a fresh pool for each session
pub struct SqliteDirectoryFactory {
    config: DatabaseConfig,
}

impl SqliteDirectoryFactory {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DirectoryFactory for SqliteDirectoryFactory {
    async fn open(&self) -> ConnectorResult<Arc<dyn Directory>> {
        Ok(Arc::new(SqliteDirectory::connect(&self.config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::collect_records;

    async fn directory() -> SqliteDirectory {
        SqliteDirectory::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let directory = directory().await;
        let mut record = Record::new(ObjectClass::Account);
        record.set_text("FullName", "CN=John Doe/O=Acme");
        record.set_item("PasswordChangeInterval", vec![ItemValue::Number(720.0)]);
        directory.save_record(&mut record).await.unwrap();

        let id = record.id.clone().unwrap();
        let loaded = directory.lookup_account_by_id(&id).await.unwrap().unwrap();
        assert_eq!(loaded.items, record.items);

        record.set_text("LastName", "Doe");
        directory.save_record(&mut record).await.unwrap();
        let cursor = directory
            .search_records(ObjectClass::Account, Some(r#"(LastName="Doe")"#))
            .await
            .unwrap();
        assert_eq!(collect_records(cursor).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_record() {
        let directory = directory().await;
        let mut record = Record::new(ObjectClass::Group);
        record.set_text("ListName", "Sales");
        directory.save_record(&mut record).await.unwrap();

        let id = record.id.clone().unwrap();
        assert!(directory.delete_record(&id).await.unwrap());
        assert!(!directory.delete_record(&id).await.unwrap());
        assert!(directory
            .lookup_group_by_display_name("Sales")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_close_makes_session_dead() {
        let directory = directory().await;
        assert!(directory.is_alive().await);
        directory.close().await;
        assert!(!directory.is_alive().await);
    }
}
