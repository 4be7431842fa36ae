use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ConnectorError, ConnectorResult};
use crate::parser::ObjectClass;
use crate::secret::GuardedString;

/// Generic name attribute
pub const NAME: &str = "__NAME__";
/// Generic unique id attribute
pub const UID: &str = "__UID__";
pub const ENABLE: &str = "__ENABLE__";
pub const PASSWORD: &str = "__PASSWORD__";
pub const CURRENT_PASSWORD: &str = "__CURRENT_PASSWORD__";

/// A single attribute value of an identity object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i32),
    Long(i64),
    Boolean(bool),
    Secret(GuardedString),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Text form used when the value is written into a text item
    pub fn to_text(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Integer(i) => Some(i.to_string()),
            AttributeValue::Long(l) => Some(l.to_string()),
            AttributeValue::Boolean(b) => Some(b.to_string()),
            AttributeValue::Secret(_) => None,
        }
    }

    /// Convert a JSON value, as read by the CLI, into an attribute value
    pub fn from_json(value: &Value) -> ConnectorResult<Self> {
        match value {
            Value::String(s) => Ok(AttributeValue::String(s.clone())),
            Value::Bool(b) => Ok(AttributeValue::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(i32::try_from(i)
                    .map(AttributeValue::Integer)
                    .unwrap_or(AttributeValue::Long(i))),
                None => Err(ConnectorError::InvalidAttribute(format!(
                    "Only integral numbers are supported: {}",
                    n
                ))),
            },
            other => Err(ConnectorError::InvalidAttribute(format!(
                "Unsupported attribute value: {}",
                other
            ))),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i)
    }
}

/// Attribute name to values, as handed in by create and update calls
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeSet(BTreeMap<String, Vec<AttributeValue>>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<AttributeValue>) {
        self.0.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&Vec<AttributeValue>> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }

    /// Remove an attribute by case-insensitive name
    pub fn take(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        let key = self
            .0
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))?
            .clone();
        self.0.remove(&key)
    }

    pub fn take_strings(&mut self, name: &str) -> Option<Vec<String>> {
        self.take(name).map(|values| {
            values
                .iter()
                .filter_map(AttributeValue::to_text)
                .collect()
        })
    }

    pub fn take_string(&mut self, name: &str) -> Option<String> {
        self.take_strings(name)
            .and_then(|values| values.into_iter().next())
    }

    pub fn take_bool(&mut self, name: &str) -> ConnectorResult<Option<bool>> {
        match self.take(name) {
            None => Ok(None),
            Some(values) => values
                .first()
                .and_then(AttributeValue::as_bool)
                .map(Some)
                .ok_or_else(|| {
                    ConnectorError::InvalidAttribute(format!("{} requires a boolean", name))
                }),
        }
    }

    pub fn take_secret(&mut self, name: &str) -> Option<GuardedString> {
        self.take(name)?.into_iter().find_map(|value| match value {
            AttributeValue::Secret(secret) => Some(secret),
            AttributeValue::String(plain) => Some(GuardedString::new(plain)),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, Vec<AttributeValue>)> {
        self.0.into_iter()
    }

    /// Build from a JSON object of `name -> value | [values]`
    pub fn from_json(value: &Value) -> ConnectorResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            ConnectorError::InvalidAttribute("Expected a JSON object of attributes".to_string())
        })?;

        let mut set = AttributeSet::new();
        for (name, raw) in object {
            let values = match raw {
                Value::Array(items) => items
                    .iter()
                    .map(AttributeValue::from_json)
                    .collect::<ConnectorResult<Vec<_>>>()?,
                Value::Null => Vec::new(),
                single => vec![AttributeValue::from_json(single)?],
            };
            set.insert(name.clone(), values);
        }
        Ok(set)
    }
}

/// A projected identity object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorObject {
    pub object_class: ObjectClass,
    pub uid: String,
    pub name: String,
    pub attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl ConnectorObject {
    pub fn new(object_class: ObjectClass, uid: String, name: String) -> Self {
        Self {
            object_class,
            uid,
            name,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Vec<AttributeValue>> {
        self.attributes.get(name)
    }

    /// String values of an attribute, empty when absent
    pub fn strings(&self, name: &str) -> Vec<String> {
        self.attribute(name)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set(&mut self, name: impl Into<String>, values: Vec<AttributeValue>) {
        self.attributes.insert(name.into(), values);
    }
}

/// How an update applies its values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Add,
    Remove,
    Replace,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateKind::Add => write!(f, "ADD"),
            UpdateKind::Remove => write!(f, "REMOVE"),
            UpdateKind::Replace => write!(f, "REPLACE"),
        }
    }
}

impl FromStr for UpdateKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(UpdateKind::Add),
            "remove" => Ok(UpdateKind::Remove),
            "replace" => Ok(UpdateKind::Replace),
            other => Err(ConnectorError::InvalidAttribute(format!(
                "Unknown update kind: {}",
                other
            ))),
        }
    }
}

/// One value of a raw record item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ItemValue {
    Text(String),
    Number(f64),
    DateTime(DateTime<Utc>),
}

impl ItemValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ItemValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A raw directory record: a bag of named, list-valued items.
///
/// Item names are matched case-insensitively, as the directory does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Assigned by the directory on first save
    pub id: Option<String>,
    pub items: BTreeMap<String, Vec<ItemValue>>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Record {
    /// Empty record of the given class with `Form` and `Type` set
    pub fn new(object_class: ObjectClass) -> Self {
        let mut record = Record::default();
        record.set_text("Form", object_class.form());
        record.set_text("Type", object_class.form());
        record
    }

    fn key_for(&self, name: &str) -> Option<&String> {
        self.items.keys().find(|key| key.eq_ignore_ascii_case(name))
    }

    pub fn item(&self, name: &str) -> Option<&Vec<ItemValue>> {
        self.key_for(name).and_then(|key| self.items.get(key))
    }

    pub fn has_item(&self, name: &str) -> bool {
        self.key_for(name).is_some()
    }

    /// First text value of an item
    pub fn text(&self, name: &str) -> Option<&str> {
        self.item(name)?.iter().find_map(ItemValue::as_text)
    }

    /// All text values of an item, empty when absent
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.item(name)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_text().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_item(&mut self, name: &str, values: Vec<ItemValue>) {
        let key = self.key_for(name).cloned().unwrap_or_else(|| name.to_string());
        self.items.insert(key, values);
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.set_item(name, vec![ItemValue::Text(value.into())]);
    }

    pub fn set_texts(&mut self, name: &str, values: Vec<String>) {
        self.set_item(name, values.into_iter().map(ItemValue::Text).collect());
    }

    pub fn remove_item(&mut self, name: &str) -> Option<Vec<ItemValue>> {
        let key = self.key_for(name)?.clone();
        self.items.remove(&key)
    }

    pub fn form(&self) -> Option<&str> {
        self.text("Form")
    }

    pub fn is_class(&self, object_class: ObjectClass) -> bool {
        self.form()
            .is_some_and(|form| form.eq_ignore_ascii_case(object_class.form()))
    }

    /// Identity used in error messages: the name item, falling back to the id
    pub fn identity(&self) -> String {
        self.text("FullName")
            .or_else(|| self.text("ListName"))
            .or(self.id.as_deref())
            .unwrap_or("<new record>")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_items_are_case_insensitive() {
        let mut record = Record::new(ObjectClass::Group);
        record.set_texts("Members", vec!["a".into(), "b".into()]);
        record.set_text("members", "c");

        assert_eq!(record.texts("MEMBERS"), vec!["c".to_string()]);
        assert_eq!(record.items.len(), 3);
        assert!(record.is_class(ObjectClass::Group));
    }

    #[test]
    fn test_attribute_set_from_json() {
        let mut set = AttributeSet::from_json(&json!({
            "__NAME__": "John Doe/Acme",
            "GroupList": ["Sales", "Ops"],
            "__ENABLE__": false,
            "PasswordChangeInterval": 30
        }))
        .unwrap();

        assert_eq!(set.take_string("__name__").as_deref(), Some("John Doe/Acme"));
        assert_eq!(
            set.take_strings("GroupList").unwrap(),
            vec!["Sales".to_string(), "Ops".to_string()]
        );
        assert_eq!(set.take_bool("__ENABLE__").unwrap(), Some(false));
        assert_eq!(
            set.get("PasswordChangeInterval"),
            Some(&vec![AttributeValue::Integer(30)])
        );
    }

    #[test]
    fn test_update_kind_parsing() {
        assert_eq!("ADD".parse::<UpdateKind>().unwrap(), UpdateKind::Add);
        assert!("merge".parse::<UpdateKind>().is_err());
    }
}
