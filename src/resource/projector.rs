//! Object Projector
//!
//! Maps raw directory records to [`ConnectorObject`]s and attribute values
//! back to record items. Relation attributes that need further lookups
//! (`GroupList`, `__ENABLE__`, `MemberGroups`, `MemberPeople`) are filled in
//! by the connector, not here.

use tracing::warn;

use super::attribute_filter::AttributesToGet;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{AttributeValue, ConnectorObject, ItemValue, Record, UpdateKind, NAME, UID};
use crate::naming::Normalizer;
use crate::parser::ObjectClass;
use crate::schema::{find_attribute, AttributeDescriptor, Coercion, ValueType};
use crate::utils::{format_epoch_datetime, join_aliases, split_aliases};

/// Items holding hierarchical names: canonical when stored, abbreviated
/// when read
const NAME_BEARING_ITEMS: [&str; 2] = ["MailServer", "Members"];

/// Attributes computed by the connector from other records
const RELATION_ATTRIBUTES: [&str; 4] = ["GroupList", "__ENABLE__", "MemberGroups", "MemberPeople"];

fn is_name_bearing(item: &str) -> bool {
    NAME_BEARING_ITEMS.iter().any(|n| n.eq_ignore_ascii_case(item))
}

fn is_relation(attr: &str) -> bool {
    RELATION_ATTRIBUTES.iter().any(|n| n.eq_ignore_ascii_case(attr))
}

#[derive(Debug, Clone, Default)]
pub struct ObjectProjector {
    normalizer: Normalizer,
}

impl ObjectProjector {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    /// Aliases of a group record, in stored order
    pub fn group_aliases(record: &Record) -> Vec<String> {
        record
            .texts("ListName")
            .iter()
            .flat_map(|value| split_aliases(value))
            .collect()
    }

    /// Project a record into an identity object
    pub fn to_object(
        &self,
        record: &Record,
        object_class: ObjectClass,
        attributes: &AttributesToGet,
    ) -> ConnectorResult<ConnectorObject> {
        let id = record.id.clone().ok_or_else(|| {
            ConnectorError::Internal(format!("Record {} has no id", record.identity()))
        })?;

        let mut object = match object_class {
            ObjectClass::Account => self.account_header(record, id, attributes)?,
            ObjectClass::Group => Self::group_header(record, attributes),
        };

        for attr in attributes.iter() {
            if attr == NAME || attr == UID || object.attribute(attr).is_some() || is_relation(attr)
            {
                continue;
            }
            let values = self.project_attribute(record, object_class, attr);
            if !values.is_empty() {
                object.set(attr, values);
            }
        }

        Ok(object)
    }

    fn account_header(
        &self,
        record: &Record,
        id: String,
        attributes: &AttributesToGet,
    ) -> ConnectorResult<ConnectorObject> {
        let Some(full_name) = record.text("FullName") else {
            // Records without a full name are named after their surname
            let fallback = record.text("LastName").unwrap_or_default().to_string();
            return Ok(ConnectorObject::new(ObjectClass::Account, id, fallback));
        };

        let name = match self.normalizer.abbreviate(full_name) {
            Ok(name) => name,
            Err(e) => {
                // Names the grammar rejects are returned as stored, without derived parts
                warn!("Account {} has an unparseable name: {}", id, e);
                return Ok(ConnectorObject::new(
                    ObjectClass::Account,
                    id,
                    full_name.to_string(),
                ));
            }
        };
        let mut object = ConnectorObject::new(ObjectClass::Account, id, name);

        if attributes.contains("OrgUnit") {
            let org_unit = self.normalizer.organizational_unit(full_name)?;
            if !org_unit.is_empty() {
                object.set("OrgUnit", vec![org_unit.into()]);
            }
        }
        if attributes.contains("CertifierOrgHierarchy") {
            let organization = self.normalizer.organization(full_name)?;
            if !organization.is_empty() {
                object.set(
                    "CertifierOrgHierarchy",
                    vec![format!("/{}", organization).into()],
                );
            }
        }
        Ok(object)
    }

    fn group_header(record: &Record, attributes: &AttributesToGet) -> ConnectorObject {
        let aliases = Self::group_aliases(record);
        let joined = join_aliases(&aliases);
        let mut object = ConnectorObject::new(ObjectClass::Group, joined.clone(), joined);

        if attributes.contains("DisplayName") {
            if let Some(display) = aliases.first() {
                object.set("DisplayName", vec![display.clone().into()]);
            }
        }
        if attributes.contains("ListName") {
            object.set(
                "ListName",
                aliases.into_iter().map(AttributeValue::String).collect(),
            );
        }
        object
    }

    fn project_attribute(
        &self,
        record: &Record,
        object_class: ObjectClass,
        attr: &str,
    ) -> Vec<AttributeValue> {
        if attr.eq_ignore_ascii_case("LastModified") {
            return record
                .last_modified
                .map(|dt| vec![AttributeValue::Long(format_epoch_datetime(dt))])
                .unwrap_or_default();
        }
        if attr.eq_ignore_ascii_case("objectGUID") {
            return record
                .id
                .iter()
                .map(|id| AttributeValue::String(id.clone()))
                .collect();
        }

        let Some(items) = record.item(attr) else {
            return Vec::new();
        };

        let descriptor = find_attribute(object_class, attr).map(|def| def.descriptor());
        match descriptor {
            Some(d) if !d.is_readable() || d.value_type == ValueType::Secret => Vec::new(),
            Some(d) if d.value_type == ValueType::Integer => items
                .iter()
                .filter_map(|item| coerce_integer(d, item))
                .map(AttributeValue::Integer)
                .collect(),
            Some(d) if d.value_type == ValueType::Boolean => items
                .iter()
                .filter_map(ItemValue::as_text)
                .map(|text| AttributeValue::Boolean(text == "1" || text.eq_ignore_ascii_case("true")))
                .collect(),
            _ => items
                .iter()
                .filter_map(item_text)
                .map(|text| {
                    if is_name_bearing(attr) {
                        // Values that are not names (e.g. wildcards) are returned as stored
                        self.normalizer.abbreviate(&text).unwrap_or(text)
                    } else {
                        text
                    }
                })
                .map(AttributeValue::String)
                .collect(),
        }
    }

    /// Convert attribute values into record items
    pub fn to_items(
        &self,
        object_class: ObjectClass,
        attr: &str,
        values: &[AttributeValue],
    ) -> ConnectorResult<Vec<ItemValue>> {
        let descriptor = find_attribute(object_class, attr).map(|def| def.descriptor());
        let mut items = Vec::with_capacity(values.len());

        for value in values {
            if let AttributeValue::Secret(_) = value {
                return Err(ConnectorError::InvalidAttribute(format!(
                    "{} does not accept secret values",
                    attr
                )));
            }
            let item = match descriptor {
                Some(d) if d.coercion == Some(Coercion::FromNumber) => {
                    ItemValue::Number(integer_value(attr, value)? as f64)
                }
                Some(d) if d.coercion == Some(Coercion::FromText) => {
                    ItemValue::Text(integer_value(attr, value)?.to_string())
                }
                _ => {
                    let text = value.to_text().unwrap_or_default();
                    if is_name_bearing(attr) {
                        ItemValue::Text(self.normalizer.canonicalize(&text)?.into_string())
                    } else {
                        ItemValue::Text(text)
                    }
                }
            };
            items.push(item);
        }
        Ok(items)
    }

    /// Apply a plain-attribute update to a record.
    ///
    /// ADD unions into multi-valued items and only sets an absent scalar,
    /// REMOVE subtracts, REPLACE overwrites. Returns whether the record
    /// changed.
    pub fn apply_update(
        &self,
        record: &mut Record,
        object_class: ObjectClass,
        attr: &str,
        values: &[AttributeValue],
        kind: UpdateKind,
    ) -> ConnectorResult<bool> {
        let descriptor = find_attribute(object_class, attr).map(|def| def.descriptor());
        if let Some(d) = descriptor {
            if !d.is_updateable() {
                return Err(ConnectorError::InvalidAttribute(format!(
                    "{} is not updateable",
                    d.name
                )));
            }
        }
        let multi_valued = descriptor.map_or(true, AttributeDescriptor::is_multi_valued);
        let incoming = self.to_items(object_class, attr, values)?;
        let current = record.item(attr).cloned().unwrap_or_default();

        let updated = match kind {
            UpdateKind::Replace => incoming,
            UpdateKind::Add if multi_valued => {
                let mut merged = current.clone();
                for item in incoming {
                    if !merged.contains(&item) {
                        merged.push(item);
                    }
                }
                merged
            }
            UpdateKind::Add => {
                if current.is_empty() {
                    incoming
                } else {
                    if current != incoming {
                        warn!("ADD on single-valued {} with a value already set, ignored", attr);
                    }
                    current.clone()
                }
            }
            UpdateKind::Remove => current
                .iter()
                .filter(|item| !incoming.contains(item))
                .cloned()
                .collect(),
        };

        if updated == current {
            return Ok(false);
        }
        let name = descriptor.map(|d| d.name).unwrap_or(attr);
        if updated.is_empty() {
            record.remove_item(name);
        } else {
            record.set_item(name, updated);
        }
        Ok(true)
    }
}

fn item_text(item: &ItemValue) -> Option<String> {
    match item {
        ItemValue::Text(s) => Some(s.clone()),
        ItemValue::Number(n) => Some(n.to_string()),
        ItemValue::DateTime(dt) => Some(dt.to_rfc3339()),
    }
}

fn coerce_integer(descriptor: &AttributeDescriptor, item: &ItemValue) -> Option<i32> {
    match (descriptor.coercion, item) {
        (Some(Coercion::FromText), ItemValue::Text(s)) => s.trim().parse().ok(),
        (_, ItemValue::Number(n)) => Some(n.round() as i32),
        (_, ItemValue::Text(s)) => s.trim().parse::<f64>().ok().map(|n| n.round() as i32),
        (_, ItemValue::DateTime(_)) => None,
    }
}

fn integer_value(attr: &str, value: &AttributeValue) -> ConnectorResult<i64> {
    match value {
        AttributeValue::Integer(i) => Ok(i64::from(*i)),
        AttributeValue::Long(l) => Ok(*l),
        AttributeValue::String(s) => s.trim().parse().map_err(|_| {
            ConnectorError::InvalidAttribute(format!("{} requires an integer, got {}", attr, s))
        }),
        _ => Err(ConnectorError::InvalidAttribute(format!(
            "{} requires an integer",
            attr
        ))),
    }
}
