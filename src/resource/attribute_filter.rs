use crate::models::NAME;
use crate::parser::ObjectClass;
use crate::schema::{default_attributes, find_attribute};

/// Attributes a read returns, resolved against the registry
#[derive(Debug, Clone, PartialEq)]
pub struct AttributesToGet {
    names: Vec<String>,
}

impl AttributesToGet {
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Registry default set for the class
    pub fn defaults(object_class: ObjectClass) -> Self {
        AttributeFilter::default().resolve(object_class)
    }
}

/// Requested and excluded attribute lists, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct AttributeFilter {
    /// Attributes to return (overrides the default set)
    pub attributes: Option<Vec<String>>,
    /// Attributes to drop from the default set
    pub excluded_attributes: Option<Vec<String>>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AttributeFilter {
    /// Parse comma-separated `attributes` and `excludedAttributes` lists
    pub fn from_params(attributes: Option<&str>, excluded_attributes: Option<&str>) -> Self {
        Self {
            attributes: attributes.map(split_list),
            excluded_attributes: excluded_attributes.map(split_list),
        }
    }

    /// Resolve to the attributes a read returns.
    ///
    /// The name is always included. Unreadable attributes never are, even
    /// when asked for. Names unknown to the registry pass through so raw
    /// record items can still be fetched.
    pub fn resolve(&self, object_class: ObjectClass) -> AttributesToGet {
        let mut names: Vec<String> = vec![NAME.to_string()];

        let requested: Vec<String> = match &self.attributes {
            Some(attrs) => attrs.clone(),
            None => default_attributes(object_class)
                .into_iter()
                .map(str::to_string)
                .collect(),
        };

        for attr in requested {
            let name = match find_attribute(object_class, &attr) {
                Some(def) if !def.descriptor().is_readable() => continue,
                Some(def) => def.descriptor().name.to_string(),
                None => attr,
            };
            let excluded = self.attributes.is_none()
                && self
                    .excluded_attributes
                    .as_ref()
                    .is_some_and(|ex| ex.iter().any(|e| e.eq_ignore_ascii_case(&name)));
            if excluded || names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                continue;
            }
            names.push(name);
        }

        AttributesToGet { names }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_skip_hidden_attributes() {
        let attrs = AttributesToGet::defaults(ObjectClass::Account);
        assert!(attrs.contains(NAME));
        assert!(attrs.contains("GroupList"));
        assert!(!attrs.contains("HTTPPassword"));
        assert!(!attrs.contains("DenyGroups"));
        assert!(!attrs.contains("__PASSWORD__"));

        let groups = AttributesToGet::defaults(ObjectClass::Group);
        assert!(groups.contains("Members"));
        assert!(!groups.contains("MemberPeople"));
    }

    #[test]
    fn test_requested_list_overrides_defaults() {
        let filter = AttributeFilter::from_params(Some("lastname, httppassword,Extra"), None);
        let attrs = filter.resolve(ObjectClass::Account);
        let names: Vec<&str> = attrs.iter().collect();
        assert_eq!(names, vec![NAME, "LastName", "Extra"]);
    }

    #[test]
    fn test_excluded_attributes() {
        let filter = AttributeFilter::from_params(None, Some("Members,ListDescription"));
        let attrs = filter.resolve(ObjectClass::Group);
        assert!(!attrs.contains("Members"));
        assert!(!attrs.contains("listdescription"));
        assert!(attrs.contains("ListName"));
    }
}
