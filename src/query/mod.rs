use lazy_static::lazy_static;
use regex::Regex;

use crate::config::SearchConfig;
use crate::error::ConnectorResult;
use crate::parser::{Filter, ObjectClass};

pub mod formula_translator;

pub use formula_translator::FormulaTranslator;

lazy_static! {
    static ref DIRECT_ID_QUERY: Regex =
        Regex::new(r#"^\(NoteID="([a-zA-Z0-9]+)"\)$"#).expect("valid id query pattern");
}

/// Attributes the directory always compares exactly
pub const ALWAYS_CASE_SENSITIVE: [&str; 2] = ["ShortName", "NoteID"];

/// Trait for converting filter trees to a backend's native query text
///
/// This abstraction keeps the facade independent of the query dialect.
pub trait FilterTranslator: Send + Sync {
    /// Translate a filter for the given object class.
    ///
    /// `None` means the filter places no constraint on the search.
    fn translate(&self, filter: &Filter, object_class: ObjectClass)
        -> ConnectorResult<Option<String>>;

    /// Whether comparisons on a native attribute keep their case
    fn is_case_sensitive(&self, native_attr: &str) -> bool;

    /// Lower-casing function syntax for case-insensitive comparisons
    fn lower_function(&self, expression: &str) -> String {
        format!("@LowerCase({})", expression)
    }
}

/// Decides per attribute whether comparisons ignore case
#[derive(Debug, Clone)]
pub struct CasePolicy {
    case_insensitive: bool,
    exact_attributes: Vec<String>,
}

impl CasePolicy {
    pub fn new(case_insensitive: bool, exact_attributes: Vec<String>) -> Self {
        Self {
            case_insensitive,
            exact_attributes,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.use_case_insensitive_search,
            config.case_sensitive_attributes.clone(),
        )
    }

    pub fn is_case_sensitive(&self, native_attr: &str) -> bool {
        !self.case_insensitive
            || ALWAYS_CASE_SENSITIVE
                .iter()
                .any(|a| a.eq_ignore_ascii_case(native_attr))
            || self
                .exact_attributes
                .iter()
                .any(|a| a.eq_ignore_ascii_case(native_attr))
    }
}

impl Default for CasePolicy {
    fn default() -> Self {
        Self::new(true, Vec::new())
    }
}

/// Restrict a compiled query to records of one class
pub fn scoped_query(object_class: ObjectClass, query: Option<&str>) -> String {
    let form = format!("(Form = \"{}\")", object_class.form());
    match query {
        Some(query) if !query.is_empty() => format!("{} & ({})", form, query),
        _ => form,
    }
}

/// Record id when the query is a single exact record-id match
pub fn direct_record_id(query: &str) -> Option<&str> {
    DIRECT_ID_QUERY
        .captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_policy_exemptions() {
        let policy = CasePolicy::new(true, vec!["EmployeeID".to_string()]);
        assert!(!policy.is_case_sensitive("FullName"));
        assert!(policy.is_case_sensitive("shortname"));
        assert!(policy.is_case_sensitive("NoteID"));
        assert!(policy.is_case_sensitive("EmployeeID"));

        let exact = CasePolicy::new(false, Vec::new());
        assert!(exact.is_case_sensitive("FullName"));
    }

    #[test]
    fn test_scoped_query() {
        assert_eq!(
            scoped_query(ObjectClass::Account, Some("(ShortName=\"x\")")),
            "(Form = \"Person\") & ((ShortName=\"x\"))"
        );
        assert_eq!(scoped_query(ObjectClass::Group, None), "(Form = \"Group\")");
    }

    #[test]
    fn test_direct_record_id() {
        assert_eq!(direct_record_id("(NoteID=\"8F2A\")"), Some("8F2A"));
        assert_eq!(direct_record_id("(NoteID=\"8F2A\") & (x=\"y\")"), None);
        assert_eq!(direct_record_id("(@LowerCase(NoteID)=\"8f2a\")"), None);
    }
}
