use tracing::{debug, info, warn};

use super::DominoConnector;
use crate::error::{ConnectorError, ConnectorResult};
use crate::logging::OperationLog;
use crate::membership::display_name_of;
use crate::models::{AttributeSet, Record, UpdateKind, NAME};
use crate::parser::ObjectClass;
use crate::resource::ObjectProjector;
use crate::utils::{group_display_name, join_aliases, same_name, split_aliases};

fn aliases_of(values: &[String]) -> Vec<String> {
    values.iter().flat_map(|v| split_aliases(v)).collect()
}

fn same_aliases(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_name(x, y))
}

impl DominoConnector {
    /// Reject a `__NAME__`/`ListName` pair that names different groups and
    /// return the aliases they agree on
    fn requested_aliases(
        name: Option<String>,
        list_name: Option<Vec<String>>,
    ) -> ConnectorResult<Option<Vec<String>>> {
        let from_name = name.map(|n| split_aliases(&n));
        let from_list = list_name.map(|values| aliases_of(&values));
        match (from_name, from_list) {
            (Some(a), Some(b)) if !same_aliases(&a, &b) => Err(ConnectorError::InvalidAttribute(
                format!(
                    "{} '{}' does not match ListName '{}'",
                    NAME,
                    join_aliases(&a),
                    join_aliases(&b)
                ),
            )),
            (Some(aliases), _) | (None, Some(aliases)) if aliases.is_empty() => Err(
                ConnectorError::InvalidAttribute("group name must not be empty".to_string()),
            ),
            (a, b) => Ok(a.or(b)),
        }
    }

    pub async fn create_group(&self, mut attributes: AttributeSet) -> ConnectorResult<String> {
        let name = attributes.take_string(NAME);
        let list_name = attributes.take_strings("ListName");
        let aliases = Self::requested_aliases(name, list_name)?
            .ok_or_else(|| ConnectorError::InvalidAttribute(format!("{} is required", NAME)))?;
        let _op = OperationLog::start("create", format!("Group {}", join_aliases(&aliases)));
        if attributes.take("DisplayName").is_some() {
            debug!("DisplayName is derived from the list name, ignored");
        }

        let directory = self.session.directory().await?;
        for alias in &aliases {
            if directory.lookup_group_by_display_name(alias).await?.is_some() {
                return Err(ConnectorError::already_exists(ObjectClass::Group, alias));
            }
        }

        let reconciler = self.reconciler(directory.clone());
        let members = reconciler.effective_members(
            attributes.take_strings("Members"),
            attributes.take_strings("MemberGroups"),
            attributes.take_strings("MemberPeople"),
        )?;

        let mut record = Record::new(ObjectClass::Group);
        record.set_texts("ListName", aliases.clone());
        for (attr, values) in attributes.into_entries() {
            Self::check_writable(ObjectClass::Group, &attr, true)?;
            let items = self.projector.to_items(ObjectClass::Group, &attr, &values)?;
            if !items.is_empty() {
                record.set_item(&attr, items);
            }
        }
        if let Some(members) = members {
            record.set_texts(
                "Members",
                members.into_iter().map(|m| m.into_string()).collect(),
            );
        }

        directory.save_record(&mut record).await?;
        let uid = join_aliases(&aliases);
        info!("Created group {}", uid);
        Ok(uid)
    }

    pub async fn update_group(
        &self,
        uid: &str,
        mut attributes: AttributeSet,
        kind: UpdateKind,
    ) -> ConnectorResult<String> {
        let _op = OperationLog::start("update", format!("Group {} {}", uid, kind));
        let directory = self.session.directory().await?;
        let mut record = directory
            .lookup_group_by_display_name(&group_display_name(uid))
            .await?
            .ok_or_else(|| ConnectorError::UnknownGroup(uid.to_string()))?;
        let old_display_name = display_name_of(&record);

        attributes.take("DisplayName");
        let requested = Self::requested_aliases(
            attributes.take_string(NAME),
            attributes.take_strings("ListName"),
        )?;

        let reconciler = self.reconciler(directory.clone());
        let members = reconciler.effective_members(
            attributes.take_strings("Members"),
            attributes.take_strings("MemberGroups"),
            attributes.take_strings("MemberPeople"),
        )?;

        let mut changed = false;
        let mut renamed = false;
        if let Some(aliases) = requested {
            let display_name = aliases[0].clone();
            if !same_name(&display_name, &old_display_name) {
                if let Some(existing) = directory.lookup_group_by_display_name(&display_name).await? {
                    if existing.id != record.id {
                        return Err(ConnectorError::already_exists(
                            ObjectClass::Group,
                            display_name,
                        ));
                    }
                }
                renamed = true;
            }
            if !same_aliases(&aliases, &ObjectProjector::group_aliases(&record)) {
                record.set_texts("ListName", aliases);
                changed = true;
            }
        }

        for (attr, values) in attributes.into_entries() {
            Self::check_writable(ObjectClass::Group, &attr, false)?;
            changed |= self
                .projector
                .apply_update(&mut record, ObjectClass::Group, &attr, &values, kind)?;
        }
        if let Some(members) = members {
            changed |= reconciler.apply_members_update(&mut record, &members, kind);
        }

        if changed {
            directory.save_record(&mut record).await?;
        }
        if renamed {
            let old_name = self.normalizer.canonicalize(&old_display_name)?;
            let new_name = self.normalizer.canonicalize(&display_name_of(&record))?;
            let written = reconciler.rename_member(&old_name, &new_name).await?;
            info!("Renamed group {} to {} in {} groups", old_name, new_name, written);
        }
        Ok(join_aliases(&ObjectProjector::group_aliases(&record)))
    }

    pub async fn delete_group(&self, uid: &str) -> ConnectorResult<()> {
        let _op = OperationLog::start("delete", format!("Group {}", uid));
        let directory = self.session.directory().await?;
        let record = directory
            .lookup_group_by_display_name(&group_display_name(uid))
            .await?
            .ok_or_else(|| ConnectorError::UnknownGroup(uid.to_string()))?;
        let id = record.id.clone().ok_or_else(|| {
            ConnectorError::Internal(format!("Record {} has no id", record.identity()))
        })?;

        let name = self.normalizer.canonicalize(&display_name_of(&record))?;
        let written = self
            .reconciler(directory.clone())
            .remove_member_everywhere(&name)
            .await?;
        debug!("Removed group {} from {} groups", name, written);

        if !directory.delete_record(&id).await? {
            warn!("Group {} was already gone", id);
        }
        Ok(())
    }
}
