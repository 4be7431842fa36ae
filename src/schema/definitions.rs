//! Attribute registry
//!
//! Every attribute the connector knows, per object class, with its value
//! type and flags. Built once and never mutated.

use lazy_static::lazy_static;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::ops::BitOr;

use crate::models::{CURRENT_PASSWORD, ENABLE, NAME, PASSWORD};
use crate::parser::ObjectClass;

/// Value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Long,
    Boolean,
    Secret,
}

/// Attribute flags, combined with `|`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeFlags(u8);

impl AttributeFlags {
    pub const NONE: AttributeFlags = AttributeFlags(0);
    pub const NOT_READABLE: AttributeFlags = AttributeFlags(1);
    pub const NOT_RETURNED_BY_DEFAULT: AttributeFlags = AttributeFlags(1 << 1);
    pub const NOT_UPDATEABLE: AttributeFlags = AttributeFlags(1 << 2);
    pub const NOT_CREATABLE: AttributeFlags = AttributeFlags(1 << 3);
    pub const MULTIVALUED: AttributeFlags = AttributeFlags(1 << 4);
    pub const REQUIRED: AttributeFlags = AttributeFlags(1 << 5);

    const READ_ONLY: AttributeFlags = AttributeFlags(Self::NOT_UPDATEABLE.0 | Self::NOT_CREATABLE.0);
    const HIDDEN: AttributeFlags =
        AttributeFlags(Self::NOT_READABLE.0 | Self::NOT_RETURNED_BY_DEFAULT.0);

    pub fn contains(self, other: AttributeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    fn names(self) -> Vec<&'static str> {
        [
            (Self::NOT_READABLE, "NOT_READABLE"),
            (Self::NOT_RETURNED_BY_DEFAULT, "NOT_RETURNED_BY_DEFAULT"),
            (Self::NOT_UPDATEABLE, "NOT_UPDATEABLE"),
            (Self::NOT_CREATABLE, "NOT_CREATABLE"),
            (Self::MULTIVALUED, "MULTIVALUED"),
            (Self::REQUIRED, "REQUIRED"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl BitOr for AttributeFlags {
    type Output = AttributeFlags;

    fn bitor(self, rhs: AttributeFlags) -> AttributeFlags {
        AttributeFlags(self.0 | rhs.0)
    }
}

/// How a stored value is turned into an integer on read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Stored as a floating point number
    FromNumber,
    /// Stored as text holding an integer
    FromText,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub value_type: ValueType,
    pub flags: AttributeFlags,
    pub coercion: Option<Coercion>,
}

impl AttributeDescriptor {
    const fn new(name: &'static str, value_type: ValueType, flags: AttributeFlags) -> Self {
        Self {
            name,
            value_type,
            flags,
            coercion: None,
        }
    }

    const fn coerced(name: &'static str, coercion: Coercion) -> Self {
        Self {
            name,
            value_type: ValueType::Integer,
            flags: AttributeFlags::NONE,
            coercion: Some(coercion),
        }
    }

    pub fn is_readable(&self) -> bool {
        !self.flags.contains(AttributeFlags::NOT_READABLE)
    }

    pub fn is_returned_by_default(&self) -> bool {
        self.is_readable() && !self.flags.contains(AttributeFlags::NOT_RETURNED_BY_DEFAULT)
    }

    pub fn is_updateable(&self) -> bool {
        !self.flags.contains(AttributeFlags::NOT_UPDATEABLE)
    }

    pub fn is_creatable(&self) -> bool {
        !self.flags.contains(AttributeFlags::NOT_CREATABLE)
    }

    pub fn is_multi_valued(&self) -> bool {
        self.flags.contains(AttributeFlags::MULTIVALUED)
    }

    pub fn is_required(&self) -> bool {
        self.flags.contains(AttributeFlags::REQUIRED)
    }
}

/// Registry entry: a plain attribute stored in a record item, or an
/// operational one the connector interprets itself
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeDef {
    Plain(AttributeDescriptor),
    Operational(AttributeDescriptor),
}

impl AttributeDef {
    pub fn descriptor(&self) -> &AttributeDescriptor {
        match self {
            AttributeDef::Plain(d) | AttributeDef::Operational(d) => d,
        }
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, AttributeDef::Operational(_))
    }
}

/// All attributes of one object class
#[derive(Debug)]
pub struct ClassSchema {
    pub object_class: ObjectClass,
    order: Vec<&'static str>,
    by_name: HashMap<String, AttributeDef>,
}

impl ClassSchema {
    fn build(object_class: ObjectClass, defs: Vec<AttributeDef>) -> Self {
        let order = defs.iter().map(|d| d.descriptor().name).collect();
        let by_name = defs
            .into_iter()
            .map(|d| (d.descriptor().name.to_ascii_lowercase(), d))
            .collect();
        Self {
            object_class,
            order,
            by_name,
        }
    }

    /// Case-insensitive lookup
    pub fn find(&self, name: &str) -> Option<&AttributeDef> {
        self.by_name.get(&name.to_ascii_lowercase())
    }

    /// Definitions in declaration order
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.order.iter().filter_map(|name| self.find(name))
    }

    pub fn to_json(&self) -> Value {
        let attributes: Vec<Value> = self
            .attributes()
            .map(|def| {
                let d = def.descriptor();
                json!({
                    "name": d.name,
                    "type": d.value_type,
                    "operational": def.is_operational(),
                    "flags": d.flags.names(),
                })
            })
            .collect();
        json!({ "objectClass": self.object_class, "attributes": attributes })
    }
}

fn plain(name: &'static str, value_type: ValueType, flags: AttributeFlags) -> AttributeDef {
    AttributeDef::Plain(AttributeDescriptor::new(name, value_type, flags))
}

fn text(name: &'static str) -> AttributeDef {
    plain(name, ValueType::String, AttributeFlags::NONE)
}

fn integer(name: &'static str, coercion: Coercion) -> AttributeDef {
    AttributeDef::Plain(AttributeDescriptor::coerced(name, coercion))
}

fn operational(name: &'static str, value_type: ValueType, flags: AttributeFlags) -> AttributeDef {
    AttributeDef::Operational(AttributeDescriptor::new(name, value_type, flags))
}

use AttributeFlags as F;

lazy_static! {
    pub static ref ACCOUNT_SCHEMA: ClassSchema = ClassSchema::build(
        ObjectClass::Account,
        vec![
            plain(NAME, ValueType::String, F::REQUIRED),
            operational(ENABLE, ValueType::Boolean, F::NONE),
            operational(PASSWORD, ValueType::Secret, F::HIDDEN),
            operational(CURRENT_PASSWORD, ValueType::Secret, F::HIDDEN),
            plain("FullName", ValueType::String, F::READ_ONLY),
            text("FirstName"),
            text("MiddleInitial"),
            text("LastName"),
            text("ShortName"),
            text("InternetAddress"),
            text("MailAddress"),
            text("MailDomain"),
            text("MailFile"),
            text("MailServer"),
            text("MailSystem"),
            text("Comment"),
            text("CompanyName"),
            text("Department"),
            text("EmployeeID"),
            text("JobTitle"),
            text("Location"),
            text("Manager"),
            text("OfficePhoneNumber"),
            text("CellPhoneNumber"),
            text("Title"),
            text("AltFullName"),
            text("AltFullNameLanguage"),
            plain("AltOrgUnit", ValueType::String, F::MULTIVALUED),
            plain("OrgUnit", ValueType::String, F::READ_ONLY),
            plain("CertifierOrgHierarchy", ValueType::String, F::READ_ONLY),
            plain("GroupList", ValueType::String, F::MULTIVALUED),
            plain("DenyGroups", ValueType::String, F::MULTIVALUED | F::HIDDEN),
            plain("HTTPPassword", ValueType::Secret, F::HIDDEN),
            integer("PasswordChangeInterval", Coercion::FromNumber),
            integer("PasswordGracePeriod", Coercion::FromNumber),
            integer("RoamCleanPer", Coercion::FromNumber),
            integer("RoamCleanSetting", Coercion::FromText),
            text("CheckPassword"),
            plain("LastModified", ValueType::Long, F::READ_ONLY),
            plain("objectGUID", ValueType::String, F::READ_ONLY),
        ],
    );

    pub static ref GROUP_SCHEMA: ClassSchema = ClassSchema::build(
        ObjectClass::Group,
        vec![
            plain(NAME, ValueType::String, F::REQUIRED),
            plain("ListName", ValueType::String, F::MULTIVALUED),
            plain("DisplayName", ValueType::String, F::READ_ONLY),
            integer("GroupType", Coercion::FromText),
            text("ListCategory"),
            text("ListDescription"),
            text("Comments"),
            text("GroupTitle"),
            plain("Members", ValueType::String, F::MULTIVALUED),
            plain(
                "MemberGroups",
                ValueType::String,
                F::MULTIVALUED | F::NOT_RETURNED_BY_DEFAULT
            ),
            plain(
                "MemberPeople",
                ValueType::String,
                F::MULTIVALUED | F::NOT_RETURNED_BY_DEFAULT
            ),
            plain("LastModified", ValueType::Long, F::READ_ONLY),
            plain("objectGUID", ValueType::String, F::READ_ONLY),
        ],
    );
}

/// Group type value marking a deny-access list
pub const DENY_LIST_GROUP_TYPE: i64 = 3;

pub fn schema_for(object_class: ObjectClass) -> &'static ClassSchema {
    match object_class {
        ObjectClass::Account => &ACCOUNT_SCHEMA,
        ObjectClass::Group => &GROUP_SCHEMA,
    }
}

/// Find attribute definition for an object class
pub fn find_attribute(object_class: ObjectClass, name: &str) -> Option<&'static AttributeDef> {
    schema_for(object_class).find(name)
}

/// Attributes returned when the caller does not ask for specific ones
pub fn default_attributes(object_class: ObjectClass) -> Vec<&'static str> {
    schema_for(object_class)
        .attributes()
        .map(AttributeDef::descriptor)
        .filter(|d| d.is_returned_by_default())
        .map(|d| d.name)
        .collect()
}
