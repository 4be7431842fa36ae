use serde_json::Value;

/// Backend-agnostic search predicate.
///
/// Leaves carry the attribute name as the caller sees it (`__NAME__`,
/// `__UID__` or a native attribute) and one or more literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    // Comparison operators
    Equals(String, Vec<Value>),
    GreaterThan(String, Value),
    GreaterOrEqual(String, Value),
    LessThan(String, Value),
    LessOrEqual(String, Value),
    Contains(String, Value),
    ContainsAll(String, Vec<Value>),
    StartsWith(String, Value),
    EndsWith(String, Value),

    // Logical operators
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn equals(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals(attr.into(), vec![value.into()])
    }

    pub fn contains(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Contains(attr.into(), value.into())
    }

    pub fn and(left: Filter, right: Filter) -> Self {
        Filter::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Filter, right: Filter) -> Self {
        Filter::Or(Box::new(left), Box::new(right))
    }

    pub fn negate(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }

    /// Attribute name of a leaf, `None` for logical nodes
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Filter::Equals(attr, _)
            | Filter::ContainsAll(attr, _)
            | Filter::GreaterThan(attr, _)
            | Filter::GreaterOrEqual(attr, _)
            | Filter::LessThan(attr, _)
            | Filter::LessOrEqual(attr, _)
            | Filter::Contains(attr, _)
            | Filter::StartsWith(attr, _)
            | Filter::EndsWith(attr, _) => Some(attr),
            Filter::And(..) | Filter::Or(..) | Filter::Not(_) => None,
        }
    }
}
