#![allow(dead_code)]

use async_trait::async_trait;
use domino_connector::backend::{
    Directory, DirectoryFactory, MemoryDirectory, RecordCursor, SqliteDirectory,
};
use domino_connector::config::{ConnectorConfig, DatabaseConfig};
use domino_connector::models::{AttributeSet, AttributeValue, Record, NAME};
use domino_connector::naming::CanonicalName;
use domino_connector::{ConnectorResult, DominoConnector, ObjectClass};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestDirectoryType {
    Memory,
    Sqlite,
}

/// Wraps a directory and counts the writes that reach it
pub struct CountingDirectory {
    inner: Arc<dyn Directory>,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

impl CountingDirectory {
    pub fn new(inner: Arc<dyn Directory>) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.saves.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Directory for CountingDirectory {
    async fn is_alive(&self) -> bool {
        self.inner.is_alive().await
    }

    async fn lookup_account_by_name(
        &self,
        name: &CanonicalName,
    ) -> ConnectorResult<Option<Record>> {
        self.inner.lookup_account_by_name(name).await
    }

    async fn lookup_account_by_id(&self, id: &str) -> ConnectorResult<Option<Record>> {
        self.inner.lookup_account_by_id(id).await
    }

    async fn lookup_group_by_display_name(&self, name: &str) -> ConnectorResult<Option<Record>> {
        self.inner.lookup_group_by_display_name(name).await
    }

    async fn search_records(
        &self,
        object_class: ObjectClass,
        query: Option<&str>,
    ) -> ConnectorResult<Box<dyn RecordCursor>> {
        self.inner.search_records(object_class, query).await
    }

    async fn save_record(&self, record: &mut Record) -> ConnectorResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_record(record).await
    }

    async fn delete_record(&self, id: &str) -> ConnectorResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_record(id).await
    }
}

/// Always hands out the same directory
pub struct FixedFactory {
    directory: Arc<CountingDirectory>,
}

#[async_trait]
impl DirectoryFactory for FixedFactory {
    async fn open(&self) -> ConnectorResult<Arc<dyn Directory>> {
        Ok(self.directory.clone())
    }
}

pub struct TestConnector {
    pub connector: DominoConnector,
    pub directory: Arc<CountingDirectory>,
}

async fn open_directory(directory_type: TestDirectoryType) -> Arc<dyn Directory> {
    match directory_type {
        TestDirectoryType::Memory => Arc::new(MemoryDirectory::new()),
        TestDirectoryType::Sqlite => Arc::new(
            SqliteDirectory::connect(&DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            })
            .await
            .expect("in-memory sqlite"),
        ),
    }
}

pub async fn setup_connector_with(
    config: ConnectorConfig,
    directory_type: TestDirectoryType,
) -> TestConnector {
    let directory = Arc::new(CountingDirectory::new(open_directory(directory_type).await));
    let factory = Arc::new(FixedFactory {
        directory: directory.clone(),
    });
    TestConnector {
        connector: DominoConnector::new(config, factory),
        directory,
    }
}

pub async fn setup_connector() -> TestConnector {
    setup_connector_with(ConnectorConfig::default_config(), TestDirectoryType::Memory).await
}

pub fn named(name: &str) -> AttributeSet {
    AttributeSet::new().with(NAME, vec![name.into()])
}

pub fn strings(values: &[&str]) -> Vec<AttributeValue> {
    values.iter().map(|v| AttributeValue::from(*v)).collect()
}

pub async fn create_group(connector: &DominoConnector, name: &str) -> String {
    connector
        .create(ObjectClass::Group, named(name))
        .await
        .expect("group created")
}

pub async fn create_account(connector: &DominoConnector, name: &str, groups: &[&str]) -> String {
    let mut attributes = named(name);
    if !groups.is_empty() {
        attributes = attributes.with("GroupList", strings(groups));
    }
    connector
        .create(ObjectClass::Account, attributes)
        .await
        .expect("account created")
}
