use serde_json::Value;

use crate::error::{ConnectorError, ConnectorResult};
pub use crate::parser::filter_operator::Filter;

/// Parse a textual filter such as `FullName co "doe" and not GroupType eq 3`.
///
/// This is the command-line surface for building a [`Filter`]; the grammar
/// follows the familiar `attr op value` form with `and`, `or`, `not` and
/// parentheses. A JSON array value (`Members eq ["a", "b"]`) yields a
/// multi-valued leaf.
pub fn parse_filter(filter_str: &str) -> ConnectorResult<Filter> {
    let trimmed = filter_str.trim();

    if trimmed.is_empty() {
        return Err(ConnectorError::FilterParse("Empty filter".to_string()));
    }

    // Only strip parentheses that enclose the whole expression
    if trimmed.starts_with('(') && trimmed.ends_with(')') && outer_parens_match(trimmed) {
        return parse_filter(&trimmed[1..trimmed.len() - 1]);
    }

    // Or binds loosest, so split on it first
    if let Some(pos) = find_top_level_keyword(trimmed, " or ") {
        let left = parse_filter(&trimmed[..pos])?;
        let right = parse_filter(&trimmed[pos + 4..])?;
        return Ok(Filter::or(left, right));
    }

    if let Some(pos) = find_top_level_keyword(trimmed, " and ") {
        let left = parse_filter(&trimmed[..pos])?;
        let right = parse_filter(&trimmed[pos + 5..])?;
        return Ok(Filter::and(left, right));
    }

    if trimmed
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("not "))
    {
        let inner = parse_filter(&trimmed[4..])?;
        return Ok(Filter::negate(inner));
    }

    parse_simple_filter(trimmed)
}

/// Parse `attr op value`
fn parse_simple_filter(filter_str: &str) -> ConnectorResult<Filter> {
    let trimmed = filter_str.trim();

    // Word operators must be surrounded by spaces, symbols need not be
    let operators = [
        ">=", "<=", "!=", " eq ", " ne ", " co ", " ca ", " sw ", " ew ", " gt ", " ge ", " lt ",
        " le ", "=", ">", "<",
    ];

    for op in &operators {
        if let Some(op_pos) = find_operator_position(trimmed, op) {
            let attr = trimmed[..op_pos].trim();
            let value_str = trimmed[op_pos + op.len()..].trim();

            if attr.is_empty() || value_str.is_empty() {
                continue;
            }

            let values = parse_filter_values(value_str)?;
            let attr = attr.to_string();
            let first = values.first().cloned().unwrap_or(Value::Null);

            return match op.trim() {
                "eq" | "=" => Ok(Filter::Equals(attr, values)),
                "ne" | "!=" => Ok(Filter::negate(Filter::Equals(attr, values))),
                "co" => Ok(Filter::Contains(attr, first)),
                "ca" => Ok(Filter::ContainsAll(attr, values)),
                "sw" => Ok(Filter::StartsWith(attr, first)),
                "ew" => Ok(Filter::EndsWith(attr, first)),
                "gt" | ">" => Ok(Filter::GreaterThan(attr, first)),
                "ge" | ">=" => Ok(Filter::GreaterOrEqual(attr, first)),
                "lt" | "<" => Ok(Filter::LessThan(attr, first)),
                "le" | "<=" => Ok(Filter::LessOrEqual(attr, first)),
                other => Err(ConnectorError::FilterParse(format!(
                    "Unknown operator: {}",
                    other
                ))),
            };
        }
    }

    Err(ConnectorError::FilterParse(format!(
        "Could not parse filter: {}",
        filter_str
    )))
}

/// Whether the first `(` is closed by the final `)`
fn outer_parens_match(text: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut escape_next = false;
    let last = text.len() - 1;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => escape_next = true,
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth -= 1;
                if depth == 0 && i < last {
                    return false;
                }
            }
            _ => {}
        }
    }

    depth == 0
}

/// Find a case-insensitive keyword at nesting depth zero, outside quotes
fn find_top_level_keyword(text: &str, keyword: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let kw = keyword.as_bytes();
    let mut depth = 0i32;
    let mut in_quotes = false;
    let mut escape_next = false;

    for i in 0..bytes.len() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match bytes[i] {
            b'\\' => escape_next = true,
            b'"' => in_quotes = !in_quotes,
            b'(' | b'[' if !in_quotes => depth += 1,
            b')' | b']' if !in_quotes => depth -= 1,
            _ => {
                if !in_quotes && depth == 0 && bytes[i..].starts_with(kw) {
                    return Some(i);
                }
            }
        }
    }

    None
}

/// Find the position of an operator, making sure it's not inside quotes
fn find_operator_position(text: &str, operator: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let op_bytes = operator.as_bytes();
    let mut in_quotes = false;
    let mut escape_next = false;

    for i in 0..bytes.len() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match bytes[i] {
            b'\\' => escape_next = true,
            b'"' => in_quotes = !in_quotes,
            _ => {
                if !in_quotes && bytes[i..].starts_with(op_bytes) {
                    return Some(i);
                }
            }
        }
    }

    None
}

/// Parse a value: a JSON array yields several values, anything else one
fn parse_filter_values(value_str: &str) -> ConnectorResult<Vec<Value>> {
    if value_str.starts_with('[') {
        return match serde_json::from_str::<Value>(value_str)? {
            Value::Array(values) if !values.is_empty() => Ok(values),
            _ => Err(ConnectorError::FilterParse(format!(
                "Expected a non-empty array: {}",
                value_str
            ))),
        };
    }

    Ok(vec![parse_filter_value(value_str)])
}

/// Parse a filter value, handling quoted strings, numbers, and booleans
fn parse_filter_value(value_str: &str) -> Value {
    let trimmed = value_str.trim();

    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        let unquoted = &trimmed[1..trimmed.len() - 1];
        return Value::String(unquoted.replace("\\\"", "\"").replace("\\\\", "\\"));
    }

    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(num) = trimmed.parse::<i64>() {
        return Value::Number(serde_json::Number::from(num));
    }

    if let Ok(num) = trimmed.parse::<f64>() {
        if let Some(json_num) = serde_json::Number::from_f64(num) {
            return Value::Number(json_num);
        }
    }

    // Bare words are accepted as strings
    Value::String(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_equal_filter() {
        let result = parse_filter("ShortName eq \"jdoe\"").unwrap();
        assert_eq!(result, Filter::equals("ShortName", "jdoe"));
    }

    #[test]
    fn test_symbol_operators() {
        assert_eq!(
            parse_filter("GroupType>=2").unwrap(),
            Filter::GreaterOrEqual("GroupType".to_string(), json!(2))
        );
        assert_eq!(
            parse_filter("ShortName != \"x\"").unwrap(),
            Filter::negate(Filter::equals("ShortName", "x"))
        );
    }

    #[test]
    fn test_contains_and_numeric() {
        assert_eq!(
            parse_filter("FullName co \"Doe\"").unwrap(),
            Filter::contains("FullName", "Doe")
        );
        assert_eq!(
            parse_filter("PasswordChangeInterval gt 30").unwrap(),
            Filter::GreaterThan("PasswordChangeInterval".to_string(), json!(30))
        );
    }

    #[test]
    fn test_multi_valued_leaf() {
        let result = parse_filter("Members ca [\"CN=A/O=Acme\", \"CN=B/O=Acme\"]").unwrap();
        assert_eq!(
            result,
            Filter::ContainsAll(
                "Members".to_string(),
                vec![json!("CN=A/O=Acme"), json!("CN=B/O=Acme")]
            )
        );
    }

    #[test]
    fn test_operator_precedence() {
        // and binds tighter than or
        let result = parse_filter("a eq \"1\" or b eq \"2\" and c eq \"3\"").unwrap();
        assert_eq!(
            result,
            Filter::or(
                Filter::equals("a", "1"),
                Filter::and(Filter::equals("b", "2"), Filter::equals("c", "3"))
            )
        );
    }

    #[test]
    fn test_parentheses_and_not() {
        let result =
            parse_filter("not (ShortName eq \"a\" or ShortName eq \"b\") and GroupType eq 3")
                .unwrap();
        assert_eq!(
            result,
            Filter::and(
                Filter::negate(Filter::or(
                    Filter::equals("ShortName", "a"),
                    Filter::equals("ShortName", "b")
                )),
                Filter::equals("GroupType", 3)
            )
        );
    }

    #[test]
    fn test_keywords_inside_quotes_are_values() {
        let result = parse_filter("Comment eq \"black and white\"").unwrap();
        assert_eq!(result, Filter::equals("Comment", "black and white"));
    }

    #[test]
    fn test_escaped_quote_in_value() {
        let result = parse_filter(r#"Comment eq "say \"hi\"""#).unwrap();
        assert_eq!(result, Filter::equals("Comment", "say \"hi\""));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_filter("").is_err());
        assert!(parse_filter("justaword").is_err());
    }
}
