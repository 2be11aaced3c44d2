use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_SESSION_DB: &str = "sqlite:newscrew_session.db?mode=rwc";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Backend address, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_session_db")]
    pub session_db: String,
    /// Accounts that land on the admin dashboard after login
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_session_db() -> String {
    DEFAULT_SESSION_DB.to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn is_admin(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        assert_eq!(default_request_timeout(), 30);
        assert_eq!(default_session_db(), DEFAULT_SESSION_DB);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            base_url = "http://localhost:8000"
            request_timeout = 10
            session_db = "sqlite::memory:"
            admin_emails = ["admin@newscrew.example"]
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, 10);
        assert_eq!(config.session_db, "sqlite::memory:");
        assert_eq!(config.admin_emails, vec!["admin@newscrew.example"]);
    }

    #[test]
    fn test_load_config_with_defaults() {
        let config = Config::from_str(r#"base_url = "http://api.example.com""#).unwrap();

        assert_eq!(config.request_timeout, 30);
        assert_eq!(config.session_db, DEFAULT_SESSION_DB);
        assert!(config.admin_emails.is_empty());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/newscrew.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_base_url() {
        let result = Config::from_str("request_timeout = 5");
        assert!(result.is_err());
    }

    #[test]
    fn test_is_admin_ignores_case_and_whitespace() {
        let config = Config::from_str(
            r#"
            base_url = "http://localhost:8000"
            admin_emails = ["Admin@NewsCrew.example"]
        "#,
        )
        .unwrap();

        assert!(config.is_admin(" admin@newscrew.example"));
        assert!(!config.is_admin("alice@x.com"));
    }
}
