use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConnectorError;

/// The two object classes the directory exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Account,
    Group,
}

impl ObjectClass {
    /// Value of the `Form` item on records of this class
    pub fn form(&self) -> &'static str {
        match self {
            ObjectClass::Account => "Person",
            ObjectClass::Group => "Group",
        }
    }

    /// Native field holding the object's name
    pub fn name_field(&self) -> &'static str {
        match self {
            ObjectClass::Account => "FullName",
            ObjectClass::Group => "ListName",
        }
    }

    /// Native field the generic unique id maps to.
    ///
    /// Groups are keyed externally by their display name, so their uid lives
    /// in the list name rather than in a backend id.
    pub fn uid_field(&self) -> &'static str {
        match self {
            ObjectClass::Account => "NoteID",
            ObjectClass::Group => "ListName",
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectClass::Account => write!(f, "Account"),
            ObjectClass::Group => write!(f, "Group"),
        }
    }
}

impl FromStr for ObjectClass {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "account" | "__account__" | "person" => Ok(ObjectClass::Account),
            "group" | "__group__" => Ok(ObjectClass::Group),
            other => Err(ConnectorError::InvalidAttribute(format!(
                "Unsupported object class: {}",
                other
            ))),
        }
    }
}
