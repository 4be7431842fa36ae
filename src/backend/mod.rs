use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::Record;
use crate::naming::CanonicalName;
use crate::parser::formula::Formula;
use crate::parser::ObjectClass;
use crate::utils::{same_name, split_aliases};

pub mod memory;
pub mod session;
pub mod sqlite;

pub use memory::{MemoryDirectory, MemoryDirectoryFactory};
pub use session::Session;
pub use sqlite::{SqliteDirectory, SqliteDirectoryFactory};

/// Supported directory backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Memory,
    Sqlite,
}

impl FromStr for BackendType {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendType::Memory),
            "sqlite" => Ok(BackendType::Sqlite),
            other => Err(ConnectorError::Configuration(format!(
                "Unsupported backend type: {}",
                other
            ))),
        }
    }
}

/// Records produced by a search, one at a time
#[async_trait]
pub trait RecordCursor: Send {
    async fn next(&mut self) -> ConnectorResult<Option<Record>>;
}

/// Record-level access to the directory
///
/// Absent records are `None`; only genuine backend failures are errors.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether the underlying session still answers
    async fn is_alive(&self) -> bool;

    async fn lookup_account_by_name(&self, name: &CanonicalName)
        -> ConnectorResult<Option<Record>>;

    async fn lookup_account_by_id(&self, id: &str) -> ConnectorResult<Option<Record>>;

    /// Find a group by any of its aliases, ignoring case
    async fn lookup_group_by_display_name(&self, name: &str) -> ConnectorResult<Option<Record>>;

    /// Records of a class matching a native query, `None` matching all
    async fn search_records(
        &self,
        object_class: ObjectClass,
        query: Option<&str>,
    ) -> ConnectorResult<Box<dyn RecordCursor>>;

    /// Persist a record, assigning its id on first save
    async fn save_record(&self, record: &mut Record) -> ConnectorResult<()>;

    /// Returns false when no record had this id
    async fn delete_record(&self, id: &str) -> ConnectorResult<bool>;

    /// Release the session
    async fn close(&self) {}
}

/// Opens directory sessions
#[async_trait]
pub trait DirectoryFactory: Send + Sync {
    async fn open(&self) -> ConnectorResult<Arc<dyn Directory>>;
}

/// Build the directory factory named by the configuration
pub fn create_factory(config: &BackendConfig) -> ConnectorResult<Arc<dyn DirectoryFactory>> {
    match config.backend_type.parse::<BackendType>()? {
        BackendType::Memory => Ok(Arc::new(MemoryDirectoryFactory::default())),
        BackendType::Sqlite => {
            let database = config.database.clone().ok_or_else(|| {
                ConnectorError::Configuration(
                    "sqlite backend requires a database section".to_string(),
                )
            })?;
            Ok(Arc::new(SqliteDirectoryFactory::new(database)))
        }
    }
}

/// Yields the records of a snapshot that match a formula
pub struct FilteringCursor {
    records: std::vec::IntoIter<Record>,
    formula: Option<Formula>,
}

impl FilteringCursor {
    pub fn new(records: Vec<Record>, formula: Option<Formula>) -> Self {
        Self {
            records: records.into_iter(),
            formula,
        }
    }
}

#[async_trait]
impl RecordCursor for FilteringCursor {
    async fn next(&mut self) -> ConnectorResult<Option<Record>> {
        for record in self.records.by_ref() {
            if self.formula.as_ref().map_or(true, |f| f.matches(&record)) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

/// Whether a person record's full name is `name`
pub(crate) fn is_account_named(record: &Record, name: &CanonicalName) -> bool {
    record.is_class(ObjectClass::Account)
        && record
            .text("FullName")
            .is_some_and(|full| same_name(full, name.as_str()))
}

/// Whether a group record carries `name` among its aliases
pub(crate) fn has_alias(record: &Record, name: &str) -> bool {
    record.is_class(ObjectClass::Group)
        && record
            .texts("ListName")
            .iter()
            .flat_map(|value| split_aliases(value))
            .any(|alias| same_name(&alias, name))
}

/// Drain a cursor into a vector
pub async fn collect_records(mut cursor: Box<dyn RecordCursor>) -> ConnectorResult<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(record) = cursor.next().await? {
        records.push(record);
    }
    Ok(records)
}
