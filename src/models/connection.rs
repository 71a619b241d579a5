use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SslMode::Disable => write!(f, "disable"),
            SslMode::Prefer => write!(f, "prefer"),
            SslMode::Require => write!(f, "require"),
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            other => Err(Error::Config(format!("Unknown sslmode: {}", other))),
        }
    }
}

/// Target business database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    /// Resolved at startup from flags, environment or the OS keychain. Never persisted.
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Schema that is introspected and placed on the search_path.
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_schema() -> String {
    "public".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            name: "default".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "readonly".to_string(),
            password: String::new(),
            ssl_mode: SslMode::default(),
            schema: default_schema(),
        }
    }
}

impl ConnectionConfig {
    /// Keychain account under which this connection's password is stored.
    pub fn credential_key(&self) -> String {
        format!("{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }
}

/// Schema names end up quoted inside `SET search_path`, so keep them to a safe alphabet.
pub fn validate_schema_name(schema_name: &str) -> Result<()> {
    if schema_name.is_empty() || schema_name.len() > 63 {
        return Err(Error::Config(
            "Invalid schema name: must be 1-63 characters".to_string(),
        ));
    }
    if !schema_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::Config(
            "Invalid schema name: only letters, numbers, underscores, and hyphens allowed"
                .to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names() {
        assert!(validate_schema_name("billing").is_ok());
        assert!(validate_schema_name("sales-2024_eu").is_ok());
        assert!(validate_schema_name("").is_err());
        assert!(validate_schema_name("public; DROP TABLE x").is_err());
        assert!(validate_schema_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn password_is_not_serialized() {
        let config = ConnectionConfig {
            password: "secret".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"sslMode\":\"prefer\""));
    }

    #[test]
    fn parses_ssl_mode() {
        assert_eq!("REQUIRE".parse::<SslMode>().unwrap(), SslMode::Require);
        assert!("verify-full".parse::<SslMode>().is_err());
    }
}
