//! Membership Reconciler
//!
//! An account's `GroupList` and each group's `Members` are two views of one
//! relation: an account belongs to a group iff the group's `Members` holds
//! the account's canonical name. Only `Members` is stored; the reconciler
//! turns desired group-list changes into the group writes that realise them.
//!
//! Every group write is independent. When a later write fails the earlier
//! ones stay in place and the first error is returned; re-running the same
//! update is safe because each step re-reads current membership.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{collect_records, has_alias, Directory};
use crate::config::ReplacePolicy;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{Record, UpdateKind};
use crate::naming::{CanonicalName, Normalizer};
use crate::parser::ObjectClass;
use crate::query::formula_translator::quote;
use crate::query::scoped_query;
use crate::resource::ObjectProjector;
use crate::schema::definitions::DENY_LIST_GROUP_TYPE;
use crate::utils::{group_display_name, same_name};

const MEMBERS: &str = "Members";

/// Whether a group record is a deny-access list
pub fn is_deny_list(group: &Record) -> bool {
    group
        .text("GroupType")
        .and_then(|t| t.trim().parse::<i64>().ok())
        == Some(DENY_LIST_GROUP_TYPE)
}

/// Display name of a group record
pub fn display_name_of(group: &Record) -> String {
    ObjectProjector::group_aliases(group)
        .into_iter()
        .next()
        .unwrap_or_default()
}

/// Unique, trimmed display names in first-seen order
fn distinct_display_names(names: &[String]) -> Vec<String> {
    let mut distinct: Vec<String> = Vec::new();
    for name in names {
        let display = group_display_name(name);
        if !display.is_empty() && !distinct.iter().any(|d| same_name(d, &display)) {
            distinct.push(display);
        }
    }
    distinct
}

pub struct MembershipReconciler {
    directory: Arc<dyn Directory>,
    normalizer: Normalizer,
    replace_policy: ReplacePolicy,
}

impl MembershipReconciler {
    pub fn new(
        directory: Arc<dyn Directory>,
        normalizer: Normalizer,
        replace_policy: ReplacePolicy,
    ) -> Self {
        Self {
            directory,
            normalizer,
            replace_policy,
        }
    }

    /// Groups whose members include `member`
    pub async fn groups_of(&self, member: &CanonicalName) -> ConnectorResult<Vec<Record>> {
        let query = format!(
            "@LowerCase({}) = {}",
            MEMBERS,
            quote(&member.as_str().to_lowercase())
        );
        let cursor = self
            .directory
            .search_records(
                ObjectClass::Group,
                Some(&scoped_query(ObjectClass::Group, Some(&query))),
            )
            .await?;
        let groups = collect_records(cursor).await?;
        Ok(groups
            .into_iter()
            .filter(|group| self.has_member(group, member))
            .collect())
    }

    pub fn has_member(&self, group: &Record, member: &CanonicalName) -> bool {
        group
            .texts(MEMBERS)
            .iter()
            .any(|stored| self.normalizer.refers_to(stored, member))
    }

    /// Apply an ADD, REMOVE or REPLACE of an account's group list.
    ///
    /// ADD joins the listed groups the account is not in yet, failing with
    /// `UnknownGroup` on a group that does not exist. REMOVE leaves the
    /// listed groups the account is in; unlisted or missing groups are
    /// skipped. REPLACE joins like ADD and, under the exact policy, also
    /// leaves every held group it does not list. Deny lists are never left
    /// implicitly.
    pub async fn apply_group_list_update(
        &self,
        account: &CanonicalName,
        desired: &[String],
        kind: UpdateKind,
    ) -> ConnectorResult<()> {
        let desired = distinct_display_names(desired);
        let held = self.groups_of(account).await?;
        let held_names: Vec<String> = held.iter().map(display_name_of).collect();
        let is_held = |name: &str| held.iter().any(|group| has_alias(group, name));

        debug!(
            "Reconciling {} of {} for {}: held {:?}",
            kind, desired.len(), account, held_names
        );

        if kind != UpdateKind::Remove {
            for name in desired.iter().filter(|name| !is_held(name.as_str())) {
                self.join(account, name).await?;
            }
        }

        let to_leave: Vec<&Record> = match (kind, self.replace_policy) {
            (UpdateKind::Add, _) | (UpdateKind::Replace, ReplacePolicy::Additive) => Vec::new(),
            (UpdateKind::Remove, _) => held
                .iter()
                .filter(|group| desired.iter().any(|d| has_alias(group, d)))
                .collect(),
            (UpdateKind::Replace, ReplacePolicy::Exact) => held
                .iter()
                .filter(|group| !is_deny_list(group))
                .filter(|group| !desired.iter().any(|d| has_alias(group, d)))
                .collect(),
        };

        for group in to_leave {
            let mut group = group.clone();
            self.remove_member(&mut group, account).await?;
        }
        Ok(())
    }

    async fn join(&self, account: &CanonicalName, group_name: &str) -> ConnectorResult<()> {
        let mut group = self
            .directory
            .lookup_group_by_display_name(group_name)
            .await?
            .ok_or_else(|| ConnectorError::UnknownGroup(group_name.to_string()))?;
        self.add_member(&mut group, account).await?;
        Ok(())
    }

    /// Append `member` to a group and save it; false when already present
    pub async fn add_member(
        &self,
        group: &mut Record,
        member: &CanonicalName,
    ) -> ConnectorResult<bool> {
        if self.has_member(group, member) {
            return Ok(false);
        }
        let mut members = group.texts(MEMBERS);
        members.push(member.as_str().to_string());
        group.set_texts(MEMBERS, members);
        self.directory.save_record(group).await?;
        debug!("Added {} to group {}", member, display_name_of(group));
        Ok(true)
    }

    /// Drop `member` from a group and save it; false when it was not there
    pub async fn remove_member(
        &self,
        group: &mut Record,
        member: &CanonicalName,
    ) -> ConnectorResult<bool> {
        let members = group.texts(MEMBERS);
        let kept: Vec<String> = members
            .iter()
            .filter(|stored| !self.normalizer.refers_to(stored, member))
            .cloned()
            .collect();
        if kept.len() == members.len() {
            return Ok(false);
        }
        group.set_texts(MEMBERS, kept);
        self.directory.save_record(group).await?;
        debug!("Removed {} from group {}", member, display_name_of(group));
        Ok(true)
    }

    /// Add an account to a group by display name
    pub async fn add_to_group(
        &self,
        account: &CanonicalName,
        group_name: &str,
    ) -> ConnectorResult<bool> {
        let mut group = self
            .directory
            .lookup_group_by_display_name(group_name)
            .await?
            .ok_or_else(|| ConnectorError::UnknownGroup(group_name.to_string()))?;
        self.add_member(&mut group, account).await
    }

    /// Remove an account from a group by display name.
    ///
    /// A missing group or an account that is not a member is a no-op.
    pub async fn remove_from_group(
        &self,
        account: &CanonicalName,
        group_name: &str,
    ) -> ConnectorResult<bool> {
        match self.directory.lookup_group_by_display_name(group_name).await? {
            Some(mut group) => self.remove_member(&mut group, account).await,
            None => {
                warn!("Group {} not found, nothing to remove {} from", group_name, account);
                Ok(false)
            }
        }
    }

    /// Replace references to `old` with `new` in every group; returns the
    /// number of groups written
    pub async fn rename_member(
        &self,
        old: &CanonicalName,
        new: &CanonicalName,
    ) -> ConnectorResult<usize> {
        let mut written = 0;
        for mut group in self.groups_of(old).await? {
            let mut members: Vec<String> = Vec::new();
            for stored in group.texts(MEMBERS) {
                let replacement = if self.normalizer.refers_to(&stored, old) {
                    new.as_str().to_string()
                } else {
                    stored
                };
                if !members.iter().any(|m| same_name(m, &replacement)) {
                    members.push(replacement);
                }
            }
            group.set_texts(MEMBERS, members);
            self.directory.save_record(&mut group).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Remove `member` from every group that lists it
    pub async fn remove_member_everywhere(&self, member: &CanonicalName) -> ConnectorResult<usize> {
        let mut written = 0;
        for mut group in self.groups_of(member).await? {
            if self.remove_member(&mut group, member).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// The member list a group create or update supplies.
    ///
    /// `Members` wins; otherwise `MemberGroups`, then `MemberPeople`. Every
    /// entry is canonicalized. `None` when none of the three is given.
    pub fn effective_members(
        &self,
        members: Option<Vec<String>>,
        member_groups: Option<Vec<String>>,
        member_people: Option<Vec<String>>,
    ) -> ConnectorResult<Option<Vec<CanonicalName>>> {
        let Some(source) = members.or(member_groups).or(member_people) else {
            return Ok(None);
        };
        let mut canonical: Vec<CanonicalName> = Vec::new();
        for name in self.normalizer.canonicalize_all(&source)? {
            if !canonical.contains(&name) {
                canonical.push(name);
            }
        }
        Ok(Some(canonical))
    }

    /// Apply member edits to a group record in place, without saving.
    ///
    /// Returns whether the member list changed.
    pub fn apply_members_update(
        &self,
        group: &mut Record,
        edits: &[CanonicalName],
        kind: UpdateKind,
    ) -> bool {
        let current = group.texts(MEMBERS);
        let updated: Vec<String> = match kind {
            UpdateKind::Replace => edits.iter().map(|n| n.as_str().to_string()).collect(),
            UpdateKind::Add => {
                let mut merged = current.clone();
                for name in edits {
                    if !merged.iter().any(|stored| self.normalizer.refers_to(stored, name)) {
                        merged.push(name.as_str().to_string());
                    }
                }
                merged
            }
            UpdateKind::Remove => current
                .iter()
                .filter(|stored| !edits.iter().any(|name| self.normalizer.refers_to(stored, name)))
                .cloned()
                .collect(),
        };
        if updated == current {
            return false;
        }
        group.set_texts(MEMBERS, updated);
        true
    }
}
