pub mod definitions;

pub use definitions::{
    default_attributes, find_attribute, schema_for, AttributeDef, AttributeDescriptor,
    AttributeFlags, Coercion, ValueType,
};
