use std::sync::Arc;
use tracing::{debug, info, warn};

use super::DominoConnector;
use crate::backend::Directory;
use crate::error::{ConnectorError, ConnectorResult};
use crate::logging::OperationLog;
use crate::models::{
    AttributeSet, ItemValue, Record, UpdateKind, CURRENT_PASSWORD, ENABLE, NAME, PASSWORD,
};
use crate::naming::CanonicalName;
use crate::parser::ObjectClass;
use crate::secret::GuardedString;
use crate::utils::{default_mail_file, extract_guid, group_display_name, normalize_spaces};

const CHECK_PASSWORD_ENABLED: &str = "0";
const CHECK_PASSWORD_LOCKED_OUT: &str = "2";

impl DominoConnector {
    /// Canonical name for a new or renamed account.
    ///
    /// Names without an organization get the configured certifier hierarchy.
    fn account_name(&self, raw: &str) -> ConnectorResult<CanonicalName> {
        let raw = normalize_spaces(raw);
        let name = self.normalizer.canonicalize(&raw)?;
        match self.config.directory.certifier_org_hierarchy.as_deref() {
            Some(org) if self.normalizer.organization(name.as_str())?.is_empty() => {
                let qualified = format!("{}/{}", raw, org.trim().trim_start_matches('/'));
                self.normalizer.canonicalize(&qualified)
            }
            _ => Ok(name),
        }
    }

    pub async fn create_account(&self, mut attributes: AttributeSet) -> ConnectorResult<String> {
        let raw_name = attributes
            .take_string(NAME)
            .ok_or_else(|| ConnectorError::InvalidAttribute(format!("{} is required", NAME)))?;
        let _op = OperationLog::start("create", format!("Account {}", raw_name));

        let name = self.account_name(&raw_name)?;
        let directory = self.session.directory().await?;
        if directory.lookup_account_by_name(&name).await?.is_some() {
            return Err(ConnectorError::already_exists(
                ObjectClass::Account,
                name.as_str(),
            ));
        }

        let groups = attributes.take_strings("GroupList").unwrap_or_default();
        for group in &groups {
            let display_name = group_display_name(group);
            if directory
                .lookup_group_by_display_name(&display_name)
                .await?
                .is_none()
            {
                return Err(ConnectorError::UnknownGroup(display_name));
            }
        }
        let enable = attributes.take_bool(ENABLE)?;
        let deny_groups = attributes.take_strings("DenyGroups");
        let password = attributes.take_secret(PASSWORD);
        if attributes.take(CURRENT_PASSWORD).is_some() {
            debug!("{} ignored on create", CURRENT_PASSWORD);
        }

        let mut record = Record::new(ObjectClass::Account);
        record.set_text("FullName", name.as_str());
        for (attr, values) in attributes.into_entries() {
            Self::check_writable(ObjectClass::Account, &attr, true)?;
            let items = self.projector.to_items(ObjectClass::Account, &attr, &values)?;
            if !items.is_empty() {
                record.set_item(&attr, items);
            }
        }
        self.apply_account_defaults(&mut record, &name)?;
        if let Some(password) = password {
            self.store_password(&mut record, password)?;
        }

        directory.save_record(&mut record).await?;
        let uid = record_id(&record)?;
        info!("Created account {} with id {}", name, uid);

        if !groups.is_empty() {
            self.reconciler(directory.clone())
                .apply_group_list_update(&name, &groups, UpdateKind::Add)
                .await?;
        }
        if enable == Some(false) {
            self.set_enabled(&directory, &mut record, &name, false, deny_groups)
                .await?;
        }
        Ok(uid)
    }

    fn apply_account_defaults(
        &self,
        record: &mut Record,
        name: &CanonicalName,
    ) -> ConnectorResult<()> {
        if !record.has_item("LastName") {
            let common = self.normalizer.common_name(name.as_str())?;
            let mut words: Vec<&str> = common.split_whitespace().collect();
            if let Some(last) = words.pop() {
                record.set_text("LastName", last);
                if !words.is_empty() && !record.has_item("FirstName") {
                    record.set_text("FirstName", words.join(" "));
                }
            }
        }
        if !record.has_item("MailFile") {
            let first = record.text("FirstName").unwrap_or_default().to_string();
            let last = record.text("LastName").unwrap_or_default().to_string();
            record.set_text("MailFile", default_mail_file(&first, &last));
        }
        if !record.has_item("MailServer") {
            if let Some(server) = self.config.directory.mail_server.as_deref() {
                record.set_text("MailServer", self.normalizer.canonicalize(server)?.as_str());
            }
        }
        if !record.has_item("PasswordChangeInterval") {
            let days = self.config.directory.default_password_expiry_days;
            record.set_item("PasswordChangeInterval", vec![ItemValue::Number(days as f64)]);
        }
        Ok(())
    }

    fn store_password(
        &self,
        record: &mut Record,
        mut password: GuardedString,
    ) -> ConnectorResult<()> {
        let min_length = self.config.directory.min_password_length as usize;
        password
            .access(|plain| {
                if plain.chars().count() < min_length {
                    return Err(ConnectorError::InvalidAttribute(format!(
                        "Password must be at least {} characters",
                        min_length
                    )));
                }
                record.set_text("HTTPPassword", plain);
                Ok(())
            })
            .unwrap_or_else(|| {
                Err(ConnectorError::InvalidAttribute(
                    "Password was already used".to_string(),
                ))
            })
    }

    /// Change the stored password, checking the current one first when
    /// internet passwords are kept in sync
    fn change_password(
        &self,
        record: &mut Record,
        current: Option<GuardedString>,
        password: GuardedString,
    ) -> ConnectorResult<()> {
        if self.config.directory.sync_internet_password {
            let mut current = current
                .ok_or_else(|| ConnectorError::InvalidAttribute("Missing password".to_string()))?;
            let stored = record.text("HTTPPassword").map(str::to_string);
            let matches = current
                .access(|plain| stored.as_deref() == Some(plain))
                .unwrap_or(false);
            if !matches {
                return Err(ConnectorError::InvalidAttribute(
                    "Current password does not match".to_string(),
                ));
            }
        }
        self.store_password(record, password)
    }

    pub async fn update_account(
        &self,
        uid: &str,
        mut attributes: AttributeSet,
        kind: UpdateKind,
    ) -> ConnectorResult<String> {
        let _op = OperationLog::start("update", format!("Account {} {}", uid, kind));
        let directory = self.session.directory().await?;
        let mut record = directory
            .lookup_account_by_id(extract_guid(uid))
            .await?
            .ok_or_else(|| ConnectorError::UnknownAccount(uid.to_string()))?;
        let uid = record_id(&record)?;
        let mut name = self.stored_account_name(&record)?;
        let mut renamed_from = None;

        if let Some(raw_name) = attributes.take_string(NAME) {
            let new_name = self.account_name(&raw_name)?;
            if new_name != name {
                if let Some(existing) = directory.lookup_account_by_name(&new_name).await? {
                    if existing.id != record.id {
                        return Err(ConnectorError::already_exists(
                            ObjectClass::Account,
                            new_name.as_str(),
                        ));
                    }
                }
                record.set_text("FullName", new_name.as_str());
                renamed_from = Some(std::mem::replace(&mut name, new_name));
            }
        }

        let groups = attributes.take_strings("GroupList");
        let enable = attributes.take_bool(ENABLE)?;
        let deny_groups = attributes.take_strings("DenyGroups");
        let password = attributes.take_secret(PASSWORD);
        let current = attributes.take_secret(CURRENT_PASSWORD);

        let mut changed = renamed_from.is_some();
        match password {
            Some(password) => {
                self.change_password(&mut record, current, password)?;
                changed = true;
            }
            None if current.is_some() => {
                return Err(ConnectorError::InvalidAttribute(
                    "Missing password".to_string(),
                ));
            }
            None => {}
        }

        for (attr, values) in attributes.into_entries() {
            Self::check_writable(ObjectClass::Account, &attr, false)?;
            changed |= self
                .projector
                .apply_update(&mut record, ObjectClass::Account, &attr, &values, kind)?;
        }

        if changed {
            directory.save_record(&mut record).await?;
        }

        let reconciler = self.reconciler(directory.clone());
        if let Some(old_name) = renamed_from {
            let written = reconciler.rename_member(&old_name, &name).await?;
            info!("Renamed {} to {} in {} groups", old_name, name, written);
        }
        if let Some(groups) = groups {
            reconciler
                .apply_group_list_update(&name, &groups, kind)
                .await?;
        }
        if let Some(enabled) = enable {
            self.set_enabled(&directory, &mut record, &name, enabled, deny_groups)
                .await?;
        }
        Ok(uid)
    }

    /// Enable or disable an account.
    ///
    /// With deny groups, from the update or from configuration, disabling
    /// adds the account to each of them and enabling removes it. Without,
    /// the account's password check is locked out or reset.
    async fn set_enabled(
        &self,
        directory: &Arc<dyn Directory>,
        record: &mut Record,
        name: &CanonicalName,
        enabled: bool,
        deny_groups: Option<Vec<String>>,
    ) -> ConnectorResult<()> {
        let deny_groups = deny_groups
            .filter(|groups| !groups.is_empty())
            .or_else(|| {
                self.config
                    .directory
                    .disable_deny_group
                    .clone()
                    .map(|group| vec![group])
            });

        match deny_groups {
            Some(groups) => {
                let reconciler = self.reconciler(directory.clone());
                for group in groups {
                    if enabled {
                        reconciler.remove_from_group(name, &group).await?;
                    } else {
                        reconciler.add_to_group(name, &group).await?;
                    }
                }
            }
            None => {
                let check = if enabled {
                    CHECK_PASSWORD_ENABLED
                } else {
                    CHECK_PASSWORD_LOCKED_OUT
                };
                if record.text("CheckPassword") != Some(check) {
                    record.set_text("CheckPassword", check);
                    directory.save_record(record).await?;
                }
            }
        }
        debug!("Account {} enabled: {}", name, enabled);
        Ok(())
    }

    pub async fn delete_account(&self, uid: &str) -> ConnectorResult<()> {
        let _op = OperationLog::start("delete", format!("Account {}", uid));
        let directory = self.session.directory().await?;
        let record = directory
            .lookup_account_by_id(extract_guid(uid))
            .await?
            .ok_or_else(|| ConnectorError::UnknownAccount(uid.to_string()))?;
        let id = record_id(&record)?;
        let name = self.stored_account_name(&record)?;

        let deny_group = self.config.directory.delete_deny_group.as_deref();
        if let Some(group) = deny_group {
            if directory.lookup_group_by_display_name(group).await?.is_none() {
                return Err(ConnectorError::UnknownGroup(group.to_string()));
            }
        }

        let reconciler = self.reconciler(directory.clone());
        let written = reconciler.remove_member_everywhere(&name).await?;
        debug!("Removed {} from {} groups", name, written);
        if let Some(group) = deny_group {
            reconciler.add_to_group(&name, group).await?;
        }

        info!(
            "Deleting account {} (immediate: {}, mail file action: {})",
            name,
            self.config.directory.immediate_delete,
            self.config.directory.mail_file_action
        );
        if !directory.delete_record(&id).await? {
            warn!("Account {} was already gone", id);
        }
        Ok(())
    }

    fn stored_account_name(&self, record: &Record) -> ConnectorResult<CanonicalName> {
        let full_name = record.text("FullName").ok_or_else(|| {
            ConnectorError::Internal(format!("Account {} has no FullName", record.identity()))
        })?;
        self.normalizer.canonicalize(full_name)
    }
}

fn record_id(record: &Record) -> ConnectorResult<String> {
    record
        .id
        .clone()
        .ok_or_else(|| ConnectorError::Internal(format!("Record {} has no id", record.identity())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDirectoryFactory;
    use crate::config::ConnectorConfig;
    use crate::models::AttributeValue;
    use crate::resource::AttributesToGet;

    fn connector_with(config: ConnectorConfig) -> DominoConnector {
        DominoConnector::new(config, Arc::new(MemoryDirectoryFactory::default()))
    }

    fn account(name: &str) -> AttributeSet {
        AttributeSet::new().with(NAME, vec![name.into()])
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let connector = connector_with(ConnectorConfig::default_config());
        let uid = connector
            .create_account(account("John  Doe/Acme").with(PASSWORD, vec![AttributeValue::Secret(GuardedString::new("s3cret!"))]))
            .await
            .unwrap();

        let directory = connector.session.directory().await.unwrap();
        let record = directory.lookup_account_by_id(&uid).await.unwrap().unwrap();
        assert_eq!(record.text("FullName"), Some("CN=John Doe/O=Acme"));
        assert_eq!(record.text("LastName"), Some("Doe"));
        assert_eq!(record.text("FirstName"), Some("John"));
        assert_eq!(record.text("MailFile"), Some("mail\\johndoe"));
        assert_eq!(record.text("HTTPPassword"), Some("s3cret!"));
        assert_eq!(
            record.item("PasswordChangeInterval"),
            Some(&vec![ItemValue::Number(720.0)])
        );
    }

    #[tokio::test]
    async fn test_certifier_hierarchy_is_appended_to_flat_names() {
        let mut config = ConnectorConfig::default_config();
        config.directory.certifier_org_hierarchy = Some("/Acme".to_string());
        let connector = connector_with(config);
        let uid = connector.create_account(account("Jane Roe")).await.unwrap();

        let object = connector
            .get(ObjectClass::Account, &uid, &AttributesToGet::defaults(ObjectClass::Account))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(object.name, "Jane Roe/Acme");
    }

    #[tokio::test]
    async fn test_short_password_is_rejected() {
        let connector = connector_with(ConnectorConfig::default_config());
        let err = connector
            .create_account(account("John Doe/Acme").with(PASSWORD, vec![AttributeValue::Secret(GuardedString::new("abc"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidAttribute(_)));
    }

    #[tokio::test]
    async fn test_current_password_without_new_one() {
        let connector = connector_with(ConnectorConfig::default_config());
        let uid = connector.create_account(account("John Doe/Acme")).await.unwrap();
        let err = connector
            .update_account(
                &uid,
                AttributeSet::new().with(CURRENT_PASSWORD, vec![AttributeValue::Secret(GuardedString::new("old-pass"))]),
                UpdateKind::Replace,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid attribute: Missing password");
    }

    #[tokio::test]
    async fn test_synced_password_change_checks_current() {
        let mut config = ConnectorConfig::default_config();
        config.directory.sync_internet_password = true;
        let connector = connector_with(config);
        let uid = connector
            .create_account(account("John Doe/Acme").with(PASSWORD, vec![AttributeValue::Secret(GuardedString::new("first-pass"))]))
            .await
            .unwrap();

        let change = |current: &str| {
            AttributeSet::new()
                .with(PASSWORD, vec![AttributeValue::Secret(GuardedString::new("second-pass"))])
                .with(CURRENT_PASSWORD, vec![AttributeValue::Secret(GuardedString::new(current))])
        };
        assert!(connector
            .update_account(&uid, change("wrong-pass"), UpdateKind::Replace)
            .await
            .is_err());
        connector
            .update_account(&uid, change("first-pass"), UpdateKind::Replace)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_disable_without_deny_group_locks_password_check() {
        let connector = connector_with(ConnectorConfig::default_config());
        let uid = connector
            .create_account(account("John Doe/Acme").with(ENABLE, vec![false.into()]))
            .await
            .unwrap();

        let directory = connector.session.directory().await.unwrap();
        let record = directory.lookup_account_by_id(&uid).await.unwrap().unwrap();
        assert_eq!(record.text("CheckPassword"), Some("2"));

        connector
            .update_account(&uid, AttributeSet::new().with(ENABLE, vec![true.into()]), UpdateKind::Replace)
            .await
            .unwrap();
        let record = directory.lookup_account_by_id(&uid).await.unwrap().unwrap();
        assert_eq!(record.text("CheckPassword"), Some("0"));
    }
}
