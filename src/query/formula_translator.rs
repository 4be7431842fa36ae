use serde_json::Value;

use super::{CasePolicy, FilterTranslator};
use crate::config::ContainsAllMode;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{NAME, UID};
use crate::naming::Normalizer;
use crate::parser::formula::{CompareOp, TextFunction};
use crate::parser::{Filter, ObjectClass};
use crate::schema::find_attribute;
use crate::utils::{extract_guid, group_display_name};

/// A literal ready to be placed in a formula
#[derive(Debug, Clone)]
struct Rendered {
    text: String,
    is_text: bool,
}

impl Rendered {
    fn lowered(&self) -> String {
        if self.is_text {
            self.text.to_lowercase()
        } else {
            self.text.clone()
        }
    }
}

/// Quote a text literal, escaping backslashes and quotes
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Compiles filter trees into selection formulas
#[derive(Debug, Clone)]
pub struct FormulaTranslator {
    policy: CasePolicy,
    normalizer: Normalizer,
    contains_all: ContainsAllMode,
}

impl FormulaTranslator {
    pub fn new(policy: CasePolicy, normalizer: Normalizer, contains_all: ContainsAllMode) -> Self {
        Self {
            policy,
            normalizer,
            contains_all,
        }
    }

    /// Native field name for a filter attribute
    fn native_name(&self, attr: &str, object_class: ObjectClass) -> String {
        if attr == NAME {
            return object_class.name_field().to_string();
        }
        if attr == UID {
            return object_class.uid_field().to_string();
        }
        find_attribute(object_class, attr)
            .map(|def| def.descriptor().name.to_string())
            .unwrap_or_else(|| attr.to_string())
    }

    /// Rewrite a name-bearing value into the form the directory stores
    fn rewrite_name_value(
        &self,
        attr: &str,
        object_class: ObjectClass,
        value: &str,
    ) -> ConnectorResult<String> {
        let value = match object_class {
            ObjectClass::Account if attr == NAME || attr.eq_ignore_ascii_case("FullName") => {
                self.normalizer.canonicalize(value)?.into_string()
            }
            ObjectClass::Account if attr == UID => extract_guid(value).to_string(),
            ObjectClass::Group
                if attr == NAME || attr == UID || attr.eq_ignore_ascii_case("ListName") =>
            {
                group_display_name(value)
            }
            _ => value.to_string(),
        };
        Ok(value)
    }

    /// Render a filter value; substring patterns pass `rewrite_names = false` and stay verbatim
    fn render_value(
        &self,
        attr: &str,
        object_class: ObjectClass,
        value: &Value,
        rewrite_names: bool,
    ) -> ConnectorResult<Option<Rendered>> {
        let rendered = match value {
            Value::Null => return Ok(None),
            Value::Number(n) => Rendered {
                text: n.to_string(),
                is_text: false,
            },
            Value::Bool(b) => Rendered {
                text: quote(&b.to_string()),
                is_text: true,
            },
            Value::String(s) if rewrite_names => Rendered {
                text: quote(&self.rewrite_name_value(attr, object_class, s)?),
                is_text: true,
            },
            Value::String(s) => Rendered {
                text: quote(s),
                is_text: true,
            },
            other => {
                return Err(ConnectorError::FilterParse(format!(
                    "Unsupported filter value for {}: {}",
                    attr, other
                )))
            }
        };
        Ok(Some(rendered))
    }

    /// Render several values as a `:` list
    fn render_values(
        &self,
        attr: &str,
        object_class: ObjectClass,
        values: &[Value],
    ) -> ConnectorResult<Option<Rendered>> {
        let mut parts = Vec::new();
        for value in values {
            if let Some(rendered) = self.render_value(attr, object_class, value, true)? {
                parts.push(rendered);
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(Rendered {
            is_text: parts.iter().any(|p| p.is_text),
            text: parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(":"),
        }))
    }

    /// Left-hand field and right-hand value after applying the case policy
    fn operands(&self, native: &str, value: &Rendered) -> (String, String) {
        if value.is_text && !self.is_case_sensitive(native) {
            (self.lower_function(native), value.lowered())
        } else {
            (native.to_string(), value.text.clone())
        }
    }

    fn equality_expression(&self, native: &str, value: &Rendered, negated: bool) -> String {
        let (field, value) = self.operands(native, value);
        let op = if negated { CompareOp::Ne } else { CompareOp::Eq };
        format!("({}{}{})", field, op.symbol(), value)
    }

    fn comparing_expression(
        &self,
        native: &str,
        op: CompareOp,
        value: &Rendered,
        negated: bool,
    ) -> String {
        let op = if negated {
            match op {
                CompareOp::Gt => CompareOp::Le,
                CompareOp::Ge => CompareOp::Lt,
                CompareOp::Lt => CompareOp::Ge,
                CompareOp::Le => CompareOp::Gt,
                CompareOp::Eq => CompareOp::Ne,
                CompareOp::Ne => CompareOp::Eq,
            }
        } else {
            op
        };
        // ordering stays on the stored text, the case policy only covers matching
        format!("{} {} {}", native, op.symbol(), value.text)
    }

    fn function_expression(
        &self,
        native: &str,
        function: TextFunction,
        value: &Rendered,
        negated: bool,
    ) -> String {
        let (field, value) = self.operands(native, value);
        format!(
            "{}{}({}; {})",
            if negated { "!" } else { "" },
            function.name(),
            field,
            value
        )
    }

    fn compile_comparison(
        &self,
        attr: &str,
        object_class: ObjectClass,
        op: CompareOp,
        value: &Value,
        negated: bool,
    ) -> ConnectorResult<Option<String>> {
        let native = self.native_name(attr, object_class);
        Ok(self
            .render_value(attr, object_class, value, true)?
            .map(|v| self.comparing_expression(&native, op, &v, negated)))
    }

    fn compile_function(
        &self,
        attr: &str,
        object_class: ObjectClass,
        function: TextFunction,
        value: &Value,
        rewrite_names: bool,
        negated: bool,
    ) -> ConnectorResult<Option<String>> {
        let native = self.native_name(attr, object_class);
        Ok(self
            .render_value(attr, object_class, value, rewrite_names)?
            .map(|v| self.function_expression(&native, function, &v, negated)))
    }

    fn compile_contains_all(
        &self,
        attr: &str,
        object_class: ObjectClass,
        values: &[Value],
        negated: bool,
    ) -> ConnectorResult<Option<String>> {
        match self.contains_all {
            ContainsAllMode::FirstValue => match values.first() {
                Some(first) => {
                    self.compile_function(attr, object_class, TextFunction::Contains, first, true, negated)
                }
                None => Ok(None),
            },
            ContainsAllMode::EveryValue => {
                let mut compiled = None;
                for value in values {
                    let next = self.compile_function(
                        attr,
                        object_class,
                        TextFunction::Contains,
                        value,
                        true,
                        negated,
                    )?;
                    // not(a and b) == not a or not b
                    compiled = if negated {
                        combine(compiled, next, "|")
                    } else {
                        combine(compiled, next, "&")
                    };
                }
                Ok(compiled)
            }
        }
    }

    /// Compile a node, pushing negation down to the leaves
    fn compile_node(
        &self,
        filter: &Filter,
        object_class: ObjectClass,
        negated: bool,
    ) -> ConnectorResult<Option<String>> {
        match filter {
            Filter::And(left, right) | Filter::Or(left, right) => {
                let left = self.compile_node(left, object_class, negated)?;
                let right = self.compile_node(right, object_class, negated)?;
                let conjunction = matches!(filter, Filter::And(..)) != negated;
                Ok(combine(left, right, if conjunction { "&" } else { "|" }))
            }
            Filter::Not(inner) => self.compile_node(inner, object_class, !negated),
            Filter::Equals(attr, values) => {
                let native = self.native_name(attr, object_class);
                Ok(self
                    .render_values(attr, object_class, values)?
                    .map(|v| self.equality_expression(&native, &v, negated)))
            }
            Filter::GreaterThan(attr, value) => {
                self.compile_comparison(attr, object_class, CompareOp::Gt, value, negated)
            }
            Filter::GreaterOrEqual(attr, value) => {
                self.compile_comparison(attr, object_class, CompareOp::Ge, value, negated)
            }
            Filter::LessThan(attr, value) => {
                self.compile_comparison(attr, object_class, CompareOp::Lt, value, negated)
            }
            Filter::LessOrEqual(attr, value) => {
                self.compile_comparison(attr, object_class, CompareOp::Le, value, negated)
            }
            Filter::Contains(attr, value) => {
                self.compile_function(attr, object_class, TextFunction::Contains, value, false, negated)
            }
            Filter::StartsWith(attr, value) => {
                self.compile_function(attr, object_class, TextFunction::Begins, value, false, negated)
            }
            Filter::EndsWith(attr, value) => {
                self.compile_function(attr, object_class, TextFunction::Ends, value, false, negated)
            }
            Filter::ContainsAll(attr, values) => {
                self.compile_contains_all(attr, object_class, values, negated)
            }
        }
    }
}

fn combine(left: Option<String>, right: Option<String>, op: &str) -> Option<String> {
    match (left, right) {
        (Some(left), Some(right)) => Some(format!("({}) {} ({})", left, op, right)),
        (left, None) => left,
        (None, right) => right,
    }
}

impl FilterTranslator for FormulaTranslator {
    fn translate(
        &self,
        filter: &Filter,
        object_class: ObjectClass,
    ) -> ConnectorResult<Option<String>> {
        self.compile_node(filter, object_class, false)
    }

    fn is_case_sensitive(&self, native_attr: &str) -> bool {
        self.policy.is_case_sensitive(native_attr)
    }
}

/// Compile a filter with the default naming service
pub fn compile(
    filter: &Filter,
    object_class: ObjectClass,
    policy: &CasePolicy,
) -> ConnectorResult<Option<String>> {
    FormulaTranslator::new(
        policy.clone(),
        Normalizer::default(),
        ContainsAllMode::FirstValue,
    )
    .translate(filter, object_class)
}
