//! Connector Facade
//!
//! Runs create/get/update/delete/search against one directory session,
//! sequencing the compiler, projector and reconciler.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{create_factory, Directory, DirectoryFactory, Session};
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::logging::OperationLog;
use crate::membership::{display_name_of, is_deny_list, MembershipReconciler};
use crate::models::{AttributeSet, AttributeValue, ConnectorObject, Record, UpdateKind, ENABLE};
use crate::naming::Normalizer;
use crate::parser::{Filter, ObjectClass};
use crate::query::{direct_record_id, scoped_query, CasePolicy, FilterTranslator, FormulaTranslator};
use crate::resource::{AttributesToGet, ObjectProjector};
use crate::schema::{find_attribute, schema_for, ValueType};
use crate::utils::{extract_guid, group_display_name};

mod account;
mod group;

pub struct DominoConnector {
    config: ConnectorConfig,
    session: Session,
    normalizer: Normalizer,
    translator: FormulaTranslator,
    projector: ObjectProjector,
}

impl DominoConnector {
    pub fn new(config: ConnectorConfig, factory: Arc<dyn DirectoryFactory>) -> Self {
        Self::with_normalizer(config, factory, Normalizer::default())
    }

    /// Build a connector around a specific naming service
    pub fn with_normalizer(
        config: ConnectorConfig,
        factory: Arc<dyn DirectoryFactory>,
        normalizer: Normalizer,
    ) -> Self {
        let translator = FormulaTranslator::new(
            CasePolicy::from_config(&config.search),
            normalizer.clone(),
            config.search.contains_all,
        );
        Self {
            session: Session::new(factory),
            projector: ObjectProjector::new(normalizer.clone()),
            translator,
            normalizer,
            config,
        }
    }

    /// Validate the configuration and build the configured backend
    pub fn from_config(config: ConnectorConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let factory = create_factory(&config.backend)?;
        Ok(Self::new(config, factory))
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub async fn check_alive(&self) -> ConnectorResult<()> {
        self.session.check_alive().await
    }

    /// Validate the configuration and reach the directory
    pub async fn test(&self) -> ConnectorResult<()> {
        let _op = OperationLog::start("test", "connection");
        self.config.validate()?;
        self.session.check_alive().await
    }

    pub async fn dispose(&self) {
        self.session.dispose().await;
    }

    /// Attribute registry of both object classes
    pub fn schema(&self) -> Value {
        json!({
            "objectClasses": [
                schema_for(ObjectClass::Account).to_json(),
                schema_for(ObjectClass::Group).to_json(),
            ]
        })
    }

    /// Compile a filter to the directory's selection formula
    pub fn compile_filter(
        &self,
        filter: &Filter,
        object_class: ObjectClass,
    ) -> ConnectorResult<Option<String>> {
        self.translator.translate(filter, object_class)
    }

    fn reconciler(&self, directory: Arc<dyn Directory>) -> MembershipReconciler {
        MembershipReconciler::new(
            directory,
            self.normalizer.clone(),
            self.config.membership.replace_group_list,
        )
    }

    /// Hand every matching object to `handler` until it returns false.
    ///
    /// Returns the number of objects handed over.
    pub async fn search<F>(
        &self,
        object_class: ObjectClass,
        filter: Option<&Filter>,
        attributes: &AttributesToGet,
        mut handler: F,
    ) -> ConnectorResult<usize>
    where
        F: FnMut(ConnectorObject) -> bool,
    {
        let _op = OperationLog::start("search", object_class.to_string());
        let query = match filter {
            Some(filter) => self.compile_filter(filter, object_class)?,
            None => None,
        };
        let directory = self.session.directory().await?;

        if object_class == ObjectClass::Account {
            if let Some(id) = query.as_deref().and_then(direct_record_id) {
                debug!("Search served by direct lookup of {}", id);
                let Some(record) = directory.lookup_account_by_id(id).await? else {
                    return Ok(0);
                };
                let object = self.project(&directory, &record, object_class, attributes).await?;
                handler(object);
                return Ok(1);
            }
        }

        let scoped = scoped_query(object_class, query.as_deref());
        debug!("Searching with formula {}", scoped);
        let mut cursor = directory.search_records(object_class, Some(&scoped)).await?;

        let mut count = 0;
        while let Some(record) = cursor.next().await? {
            let object = self.project(&directory, &record, object_class, attributes).await?;
            count += 1;
            if !handler(object) {
                debug!("Search stopped by handler after {} objects", count);
                break;
            }
        }
        Ok(count)
    }

    /// Read one object by uid
    pub async fn get(
        &self,
        object_class: ObjectClass,
        uid: &str,
        attributes: &AttributesToGet,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        let _op = OperationLog::start("get", format!("{} {}", object_class, uid));
        let directory = self.session.directory().await?;
        match self.find_record(&directory, object_class, uid).await? {
            Some(record) => Ok(Some(
                self.project(&directory, &record, object_class, attributes)
                    .await?,
            )),
            None => Ok(None),
        }
    }

    pub async fn create(
        &self,
        object_class: ObjectClass,
        attributes: AttributeSet,
    ) -> ConnectorResult<String> {
        match object_class {
            ObjectClass::Account => self.create_account(attributes).await,
            ObjectClass::Group => self.create_group(attributes).await,
        }
    }

    /// Apply an update and return the object's uid, which a rename changes
    pub async fn update(
        &self,
        object_class: ObjectClass,
        uid: &str,
        attributes: AttributeSet,
        kind: UpdateKind,
    ) -> ConnectorResult<String> {
        match object_class {
            ObjectClass::Account => self.update_account(uid, attributes, kind).await,
            ObjectClass::Group => self.update_group(uid, attributes, kind).await,
        }
    }

    pub async fn delete(&self, object_class: ObjectClass, uid: &str) -> ConnectorResult<()> {
        match object_class {
            ObjectClass::Account => self.delete_account(uid).await,
            ObjectClass::Group => self.delete_group(uid).await,
        }
    }

    async fn find_record(
        &self,
        directory: &Arc<dyn Directory>,
        object_class: ObjectClass,
        uid: &str,
    ) -> ConnectorResult<Option<Record>> {
        match object_class {
            ObjectClass::Account => directory.lookup_account_by_id(extract_guid(uid)).await,
            ObjectClass::Group => {
                directory
                    .lookup_group_by_display_name(&group_display_name(uid))
                    .await
            }
        }
    }

    async fn project(
        &self,
        directory: &Arc<dyn Directory>,
        record: &Record,
        object_class: ObjectClass,
        attributes: &AttributesToGet,
    ) -> ConnectorResult<ConnectorObject> {
        let mut object = self.projector.to_object(record, object_class, attributes)?;
        match object_class {
            ObjectClass::Account => {
                self.enrich_account(directory, record, &mut object, attributes)
                    .await?
            }
            ObjectClass::Group => {
                self.enrich_group(directory, record, &mut object, attributes)
                    .await?
            }
        }
        Ok(object)
    }

    /// Derive `GroupList` and `__ENABLE__` from the groups naming the account
    async fn enrich_account(
        &self,
        directory: &Arc<dyn Directory>,
        record: &Record,
        object: &mut ConnectorObject,
        attributes: &AttributesToGet,
    ) -> ConnectorResult<()> {
        let wants_groups = attributes.contains("GroupList");
        let wants_enable = attributes.contains(ENABLE);
        if !wants_groups && !wants_enable {
            return Ok(());
        }

        let mut enabled = record
            .text("CheckPassword")
            .map_or(true, |check| check.trim() != "2");
        let mut group_list = Vec::new();

        if let Some(full_name) = record.text("FullName") {
            match self.normalizer.canonicalize(full_name) {
                Ok(name) => {
                    for group in self.reconciler(directory.clone()).groups_of(&name).await? {
                        if is_deny_list(&group) {
                            enabled = false;
                        } else {
                            group_list.push(AttributeValue::String(display_name_of(&group)));
                        }
                    }
                }
                Err(e) => warn!("Skipping group membership of {}: {}", full_name, e),
            }
        }

        if wants_groups {
            object.set("GroupList", group_list);
        }
        if wants_enable {
            object.set(ENABLE, vec![AttributeValue::Boolean(enabled)]);
        }
        Ok(())
    }

    /// Split `Members` into the groups and people it resolves to
    async fn enrich_group(
        &self,
        directory: &Arc<dyn Directory>,
        record: &Record,
        object: &mut ConnectorObject,
        attributes: &AttributesToGet,
    ) -> ConnectorResult<()> {
        let wants_groups = attributes.contains("MemberGroups");
        let wants_people = attributes.contains("MemberPeople");
        if !wants_groups && !wants_people {
            return Ok(());
        }

        let mut groups = Vec::new();
        let mut people = Vec::new();
        for member in record.texts("Members") {
            if let Some(group) = directory.lookup_group_by_display_name(&member).await? {
                groups.push(AttributeValue::String(display_name_of(&group)));
                continue;
            }
            match self.normalizer.canonicalize(&member) {
                Ok(name) => {
                    if directory.lookup_account_by_name(&name).await?.is_some() {
                        people.push(AttributeValue::String(
                            self.normalizer.abbreviate(name.as_str())?,
                        ));
                    }
                }
                Err(e) => warn!("Skipping member {}: {}", member, e),
            }
        }

        if wants_groups {
            object.set("MemberGroups", groups);
        }
        if wants_people {
            object.set("MemberPeople", people);
        }
        Ok(())
    }

    /// Reject attributes that cannot be written by a create or update
    fn check_writable(
        object_class: ObjectClass,
        attr: &str,
        creating: bool,
    ) -> ConnectorResult<()> {
        let Some(def) = find_attribute(object_class, attr) else {
            return Ok(());
        };
        let descriptor = def.descriptor();
        let reason = if def.is_operational() {
            Some("is not supported here")
        } else if descriptor.value_type == ValueType::Secret {
            Some("can only be set through __PASSWORD__")
        } else if creating && !descriptor.is_creatable() {
            Some("cannot be set on create")
        } else if !creating && !descriptor.is_updateable() {
            Some("is not updateable")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ConnectorError::InvalidAttribute(format!(
                "{} {}",
                descriptor.name, reason
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDirectoryFactory;

    fn connector() -> DominoConnector {
        DominoConnector::new(
            ConnectorConfig::default_config(),
            Arc::new(MemoryDirectoryFactory::default()),
        )
    }

    #[test]
    fn test_schema_lists_both_classes() {
        let schema = connector().schema();
        let classes = schema["objectClasses"].as_array().unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0]["objectClass"], "account");
        assert_eq!(classes[1]["objectClass"], "group");
    }

    #[test]
    fn test_check_writable() {
        assert!(DominoConnector::check_writable(ObjectClass::Account, "LastName", true).is_ok());
        assert!(DominoConnector::check_writable(ObjectClass::Account, "Custom", false).is_ok());
        assert!(DominoConnector::check_writable(ObjectClass::Account, "HTTPPassword", false).is_err());
        assert!(DominoConnector::check_writable(ObjectClass::Account, "OrgUnit", true).is_err());
        assert!(DominoConnector::check_writable(ObjectClass::Group, "objectGUID", false).is_err());
    }

    #[tokio::test]
    async fn test_connection() {
        let connector = connector();
        connector.test().await.unwrap();
        connector.dispose().await;
        connector.check_alive().await.unwrap();
    }
}
