use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{has_alias, is_account_named, Directory, DirectoryFactory, FilteringCursor, RecordCursor};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::Record;
use crate::naming::CanonicalName;
use crate::parser::formula::parse_formula;
use crate::parser::ObjectClass;

/// New record id in the directory's upper-case hex form
pub(crate) fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Directory held in process memory
#[derive(Debug)]
pub struct MemoryDirectory {
    records: RwLock<BTreeMap<String, Record>>,
    alive: AtomicBool,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            alive: AtomicBool::new(true),
        }
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the session dropping or coming back
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn find(&self, predicate: impl Fn(&Record) -> bool) -> Option<Record> {
        self.records
            .read()
            .await
            .values()
            .find(|record| predicate(record))
            .cloned()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn lookup_account_by_name(
        &self,
        name: &CanonicalName,
    ) -> ConnectorResult<Option<Record>> {
        Ok(self.find(|record| is_account_named(record, name)).await)
    }

    async fn lookup_account_by_id(&self, id: &str) -> ConnectorResult<Option<Record>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(id))
            .map(|(_, record)| record)
            .filter(|record| record.is_class(ObjectClass::Account))
            .cloned())
    }

    async fn lookup_group_by_display_name(&self, name: &str) -> ConnectorResult<Option<Record>> {
        Ok(self.find(|record| has_alias(record, name)).await)
    }

    async fn search_records(
        &self,
        object_class: ObjectClass,
        query: Option<&str>,
    ) -> ConnectorResult<Box<dyn RecordCursor>> {
        let formula = query.map(parse_formula).transpose()?;
        let snapshot: Vec<Record> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.is_class(object_class))
            .cloned()
            .collect();
        Ok(Box::new(FilteringCursor::new(snapshot, formula)))
    }

    async fn save_record(&self, record: &mut Record) -> ConnectorResult<()> {
        if !self.is_alive().await {
            return Err(ConnectorError::record_save(
                record.identity(),
                "session is closed",
            ));
        }
        let id = record.id.get_or_insert_with(new_record_id).clone();
        record.last_modified = Some(Utc::now());
        debug!("Saving record {} ({})", id, record.identity());
        self.records.write().await.insert(id, record.clone());
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> ConnectorResult<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }
}

/// Hands out one shared in-memory directory
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectoryFactory {
    directory: Arc<MemoryDirectory>,
}

impl MemoryDirectoryFactory {
    pub fn new(directory: Arc<MemoryDirectory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> Arc<MemoryDirectory> {
        self.directory.clone()
    }
}

#[async_trait]
impl DirectoryFactory for MemoryDirectoryFactory {
    async fn open(&self) -> ConnectorResult<Arc<dyn Directory>> {
        // Reopening brings a dropped session back
        self.directory.set_alive(true);
        Ok(self.directory.clone())
    }
}
