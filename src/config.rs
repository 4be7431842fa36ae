use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ConnectorError, ConnectorResult};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectorConfig {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub membership: MembershipConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Directory-side settings used when records are created, updated or deleted
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub admin_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_secret",
        skip_serializing
    )]
    pub admin_password: Option<SecretString>,
    #[serde(default = "default_user_database_name")]
    pub user_database_name: String,
    #[serde(default)]
    pub registration_server: Option<String>,
    #[serde(default)]
    pub mail_server: Option<String>,
    #[serde(default)]
    pub mail_template_name: Option<String>,
    /// 0 keeps the mail file, 1 deletes it, 2 deletes it with its replicas
    #[serde(default)]
    pub mail_file_action: u8,
    #[serde(default)]
    pub immediate_delete: bool,
    #[serde(default = "default_password_expiry_days")]
    pub default_password_expiry_days: u32,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: u32,
    /// Deny-access group used to disable accounts
    #[serde(default)]
    pub disable_deny_group: Option<String>,
    /// Deny-access group deleted accounts are added to
    #[serde(default)]
    pub delete_deny_group: Option<String>,
    /// Organization appended to new account names that carry none
    #[serde(default)]
    pub certifier_org_hierarchy: Option<String>,
    #[serde(default)]
    pub sync_internet_password: bool,
}

fn default_user_database_name() -> String {
    "names.nsf".to_string()
}

fn default_password_expiry_days() -> u32 {
    720
}

fn default_min_password_length() -> u32 {
    6
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            admin_name: None,
            admin_password: None,
            user_database_name: default_user_database_name(),
            registration_server: None,
            mail_server: None,
            mail_template_name: None,
            mail_file_action: 0,
            immediate_delete: false,
            default_password_expiry_days: default_password_expiry_days(),
            min_password_length: default_min_password_length(),
            disable_deny_group: None,
            delete_deny_group: None,
            certifier_org_hierarchy: None,
            sync_internet_password: false,
        }
    }
}

/// How multi-valued `ContainsAll` leaves are compiled
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContainsAllMode {
    /// Only the first value is matched
    #[default]
    FirstValue,
    /// One contains predicate per value, joined with `&`
    EveryValue,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_true")]
    pub use_case_insensitive_search: bool,
    /// Attributes compared exactly in addition to the built-in ones
    #[serde(default)]
    pub case_sensitive_attributes: Vec<String>,
    #[serde(default)]
    pub contains_all: ContainsAllMode,
}

fn default_true() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            use_case_insensitive_search: true,
            case_sensitive_attributes: Vec::new(),
            contains_all: ContainsAllMode::FirstValue,
        }
    }
}

/// What a REPLACE of an account's group list does to groups it does not list
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePolicy {
    /// Unlisted groups are kept
    #[default]
    Additive,
    /// Unlisted groups are left
    Exact,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MembershipConfig {
    #[serde(default)]
    pub replace_group_list: ReplacePolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub backend_type: String,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ConnectorConfig {
    /// Load configuration from YAML file
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, String> {
        let path = config_path.as_ref();

        if !path.exists() {
            return Err(format!("Configuration file not found: {}", path.display()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        // Expand environment variables in YAML content
        let expanded_content = Self::expand_env_vars(&content)?;

        let config: ConnectorConfig = serde_yaml::from_str(&expanded_content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate().map_err(|e| e.to_string())?;

        Ok(config)
    }

    /// Default configuration backed by an in-memory directory
    pub fn default_config() -> Self {
        ConnectorConfig {
            directory: DirectoryConfig::default(),
            search: SearchConfig::default(),
            membership: MembershipConfig::default(),
            backend: BackendConfig {
                backend_type: "memory".to_string(),
                database: None,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Check value ranges and cross-field requirements
    pub fn validate(&self) -> ConnectorResult<()> {
        let directory = &self.directory;

        if directory.mail_file_action > 2 {
            return Err(ConnectorError::Configuration(format!(
                "mail_file_action must be 0, 1 or 2, got {}",
                directory.mail_file_action
            )));
        }
        if directory.min_password_length == 0 {
            return Err(ConnectorError::Configuration(
                "min_password_length must be at least 1".to_string(),
            ));
        }
        for (field, group) in [
            ("disable_deny_group", &directory.disable_deny_group),
            ("delete_deny_group", &directory.delete_deny_group),
        ] {
            if group.as_deref().is_some_and(|g| g.trim().is_empty()) {
                return Err(ConnectorError::Configuration(format!(
                    "{} must not be blank",
                    field
                )));
            }
        }

        match self.backend.backend_type.as_str() {
            "memory" => {}
            "sqlite" => {
                let database = self.backend.database.as_ref().ok_or_else(|| {
                    ConnectorError::Configuration(
                        "Database configuration is required when backend type is 'sqlite'"
                            .to_string(),
                    )
                })?;
                if database.max_connections == 0 {
                    return Err(ConnectorError::Configuration(
                        "max_connections must be at least 1".to_string(),
                    ));
                }
            }
            other => {
                return Err(ConnectorError::Configuration(format!(
                    "Unsupported backend type: {}",
                    other
                )))
            }
        }

        crate::logging::parse_level(&self.logging.level)?;

        Ok(())
    }

    /// Expand environment variables in format ${VAR_NAME} or ${VAR_NAME:-default}
    fn expand_env_vars(content: &str) -> Result<String, String> {
        let mut expanded = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            expanded.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find('}') else {
                // Unterminated reference, keep it verbatim
                expanded.push_str(&rest[start..]);
                return Ok(expanded);
            };

            let var_expr = &after[..end];
            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let value = match (std::env::var(var_name), default_value) {
                (Ok(val), _) => val,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => {
                    return Err(format!(
                        "Environment variable {} not found and no default provided",
                        var_name
                    ))
                }
            };

            expanded.push_str(&value);
            rest = &after[end + 1..];
        }

        expanded.push_str(rest);
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("DOMINO_TEST_ADMIN", "admin/Acme");

        let yaml_content = "name: ${DOMINO_TEST_ADMIN:-nobody}\nserver: \"${DOMINO_MISSING_VAR:-mail01/Acme}\"";
        let expanded = ConnectorConfig::expand_env_vars(yaml_content).unwrap();
        assert!(expanded.contains("admin/Acme"));
        assert!(expanded.contains("mail01/Acme"));

        let err = ConnectorConfig::expand_env_vars("x: ${DOMINO_MISSING_VAR}").unwrap_err();
        assert!(err.contains("DOMINO_MISSING_VAR"));

        std::env::remove_var("DOMINO_TEST_ADMIN");
    }

    #[test]
    fn test_config_file_loading() {
        let config_content = r#"
directory:
  admin_name: "admin/Acme"
  admin_password: "pa55"
  mail_server: "mail01/Acme"
  disable_deny_group: "Terminated"
search:
  use_case_insensitive_search: false
  contains_all: every_value
membership:
  replace_group_list: exact
backend:
  type: sqlite
  database:
    url: "sqlite::memory:"
    max_connections: 1
logging:
  level: debug
"#;

        let path = std::env::temp_dir().join("domino_connector_test_config.yaml");
        fs::write(&path, config_content).unwrap();

        let config = ConnectorConfig::load_from_file(&path).unwrap();
        assert_eq!(config.directory.admin_name.as_deref(), Some("admin/Acme"));
        assert_eq!(
            config
                .directory
                .admin_password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .as_deref(),
            Some("pa55")
        );
        assert_eq!(config.directory.user_database_name, "names.nsf");
        assert_eq!(config.directory.default_password_expiry_days, 720);
        assert!(!config.search.use_case_insensitive_search);
        assert_eq!(config.search.contains_all, ContainsAllMode::EveryValue);
        assert_eq!(config.membership.replace_group_list, ReplacePolicy::Exact);
        assert_eq!(config.backend.database.unwrap().max_connections, 1);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_config_file() {
        let result = ConnectorConfig::load_from_file("/nonexistent/config.yaml");
        assert!(result.unwrap_err().contains("not found"));
    }

    #[test]
    fn test_default_config() {
        let config = ConnectorConfig::default_config();
        assert_eq!(config.backend.backend_type, "memory");
        assert!(config.search.use_case_insensitive_search);
        assert_eq!(config.membership.replace_group_list, ReplacePolicy::Additive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let mut config = ConnectorConfig::default_config();
        config.directory.mail_file_action = 3;
        assert!(config.validate().is_err());

        let mut config = ConnectorConfig::default_config();
        config.directory.disable_deny_group = Some("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = ConnectorConfig::default_config();
        config.backend.backend_type = "sqlite".to_string();
        assert!(config.validate().is_err());

        let mut config = ConnectorConfig::default_config();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let path = std::env::temp_dir().join("domino_connector_invalid.yaml");
        fs::write(&path, "backend: [unclosed").unwrap();
        assert!(ConnectorConfig::load_from_file(&path).is_err());
        fs::remove_file(&path).unwrap();
    }
}
