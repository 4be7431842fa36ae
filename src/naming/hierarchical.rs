use crate::error::{ConnectorError, ConnectorResult};
use crate::naming::NamingService;

/// Most organizational units a hierarchical name may carry
pub const MAX_ORG_UNITS: usize = 4;

/// Separator used when the organizational units are joined into one string
pub const ORG_UNIT_SEPARATOR: &str = "\\";

/// A parsed hierarchical name.
///
/// `org_units[0]` is the unit closest to the common name. A name with only a
/// common name is flat, which is how groups and servers are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchicalName {
    pub common: String,
    pub org_units: Vec<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
}

impl HierarchicalName {
    pub fn is_flat(&self) -> bool {
        self.organization.is_none()
    }

    /// `CN=John Doe/OU=Sales/O=Acme/C=US`, or the bare common name when flat
    pub fn canonical(&self) -> String {
        if self.is_flat() {
            return self.common.clone();
        }
        let mut parts = vec![format!("CN={}", self.common)];
        parts.extend(self.org_units.iter().map(|ou| format!("OU={}", ou)));
        parts.extend(self.organization.iter().map(|o| format!("O={}", o)));
        parts.extend(self.country.iter().map(|c| format!("C={}", c)));
        parts.join("/")
    }

    /// `John Doe/Sales/Acme/US`
    pub fn abbreviated(&self) -> String {
        let mut parts = vec![self.common.clone()];
        parts.extend(self.org_units.iter().cloned());
        parts.extend(self.organization.iter().cloned());
        parts.extend(self.country.iter().cloned());
        parts.join("/")
    }

    pub fn org_unit(&self) -> String {
        self.org_units.join(ORG_UNIT_SEPARATOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Label {
    Common,
    OrgUnit,
    Organization,
    Country,
}

fn split_label(component: &str) -> Option<(Label, &str)> {
    let (label, value) = component.split_once('=')?;
    let label = match label.trim().to_ascii_uppercase().as_str() {
        "CN" => Label::Common,
        "OU" => Label::OrgUnit,
        "O" => Label::Organization,
        "C" => Label::Country,
        _ => return None,
    };
    Some((label, value.trim()))
}

/// Naming service implementing the directory's hierarchical name grammar
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchicalNaming;

impl HierarchicalNaming {
    fn parse_labelled(raw: &str, components: &[&str]) -> ConnectorResult<HierarchicalName> {
        let mut name = HierarchicalName {
            common: String::new(),
            org_units: Vec::new(),
            organization: None,
            country: None,
        };
        let mut previous: Option<Label> = None;

        for component in components {
            let (label, value) = split_label(component)
                .ok_or_else(|| ConnectorError::name_format(raw, "unlabelled component"))?;
            if value.is_empty() {
                return Err(ConnectorError::name_format(raw, "empty component"));
            }
            // Labels must appear in CN, OU..., O, C order, only OU may repeat
            if let Some(prev) = previous {
                if label < prev || (label == prev && label != Label::OrgUnit) {
                    return Err(ConnectorError::name_format(raw, "components out of order"));
                }
            }
            match label {
                Label::Common => name.common = value.to_string(),
                Label::OrgUnit => name.org_units.push(value.to_string()),
                Label::Organization => name.organization = Some(value.to_string()),
                Label::Country => name.country = Some(value.to_string()),
            }
            previous = Some(label);
        }

        if name.common.is_empty() {
            return Err(ConnectorError::name_format(raw, "missing common name"));
        }
        if name.organization.is_none() && (!name.org_units.is_empty() || name.country.is_some())
        {
            return Err(ConnectorError::name_format(raw, "missing organization"));
        }
        Ok(name)
    }

    fn parse_abbreviated(components: &[&str]) -> HierarchicalName {
        let common = components[0].to_string();
        let rest = &components[1..];

        let (org_units, organization, country) = match rest {
            [] => (&rest[..0], None, None),
            [organization] => (&rest[..0], Some(*organization), None),
            [units @ .., organization, country] if country.chars().count() == 2 => {
                (units, Some(*organization), Some(*country))
            }
            [units @ .., organization] => (units, Some(*organization), None),
        };

        HierarchicalName {
            common,
            org_units: org_units.iter().map(|s| s.to_string()).collect(),
            organization: organization.map(str::to_string),
            country: country.map(str::to_string),
        }
    }
}

impl NamingService for HierarchicalNaming {
    fn parse(&self, raw: &str) -> ConnectorResult<HierarchicalName> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConnectorError::name_format(raw, "empty name"));
        }

        let components: Vec<&str> = trimmed.split('/').map(str::trim).collect();
        if components.iter().any(|c| c.is_empty()) {
            return Err(ConnectorError::name_format(raw, "empty component"));
        }

        let labelled = components
            .iter()
            .filter(|c| split_label(c).is_some())
            .count();
        let name = if labelled == components.len() {
            Self::parse_labelled(raw, &components)?
        } else if labelled == 0 {
            Self::parse_abbreviated(&components)
        } else {
            return Err(ConnectorError::name_format(
                raw,
                "mixes labelled and unlabelled components",
            ));
        };

        if name.org_units.len() > MAX_ORG_UNITS {
            return Err(ConnectorError::name_format(
                raw,
                format!("more than {} organizational units", MAX_ORG_UNITS),
            ));
        }
        Ok(name)
    }
}
