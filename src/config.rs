//! Configuration structures and loading logic

use crate::webhooks::{self, WebhookIntegration};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Main router configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    pub api_port: u16,
    pub deploy_root: PathBuf,

    /// Enables the development-only routes
    pub development: bool,

    /// Path to the terms of service document; `/terms/` only exists when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<PathBuf>,

    /// Language codes accepted as URL prefixes on page routes
    pub languages: Vec<String>,
    pub default_language: String,

    pub session_cookie_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_client_id: Option<String>,

    pub auth_backends: AuthBackendsConfig,

    pub webhook_integrations: Vec<WebhookIntegration>,
    pub extra_installed_apps: Vec<ExtraAppConfig>,
    pub users: Vec<UserConfig>,

    pub max_body_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            deploy_root: default_deploy_root(),
            development: false,
            terms_of_service: None,
            languages: default_languages(),
            default_language: default_language(),
            session_cookie_name: default_session_cookie_name(),
            google_client_id: None,
            auth_backends: AuthBackendsConfig::default(),
            webhook_integrations: webhooks::default_integrations(),
            extra_installed_apps: Vec::new(),
            users: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(port) = std::env::var("CHAT_ROUTER_PORT") {
            config.api_port = port.parse().context("Invalid CHAT_ROUTER_PORT value")?;
        }
        if let Ok(development) = std::env::var("CHAT_ROUTER_DEVELOPMENT") {
            config.development = development
                .parse()
                .context("Invalid CHAT_ROUTER_DEVELOPMENT value")?;
        }
        if let Ok(deploy_root) = std::env::var("CHAT_ROUTER_DEPLOY_ROOT") {
            config.deploy_root = PathBuf::from(deploy_root);
        }
        if let Ok(client_id) = std::env::var("CHAT_ROUTER_GOOGLE_CLIENT_ID") {
            config.google_client_id = Some(client_id);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port < 1024 {
            anyhow::bail!("API port must be >= 1024 (got {})", self.api_port);
        }

        if self.languages.is_empty() {
            anyhow::bail!("At least one language must be configured");
        }
        if !self.languages.contains(&self.default_language) {
            anyhow::bail!(
                "Default language '{}' is not in the language list",
                self.default_language
            );
        }
        for language in &self.languages {
            if language.is_empty() || language.contains('/') {
                anyhow::bail!("Invalid language code '{}'", language);
            }
        }

        if self.session_cookie_name.is_empty() {
            anyhow::bail!("Session cookie name cannot be empty");
        }

        let mut webhook_names = HashSet::new();
        for integration in &self.webhook_integrations {
            if integration.name.is_empty() {
                anyhow::bail!("Webhook integration name cannot be empty");
            }
            if !webhook_names.insert(&integration.name) {
                anyhow::bail!("Duplicate webhook integration: {}", integration.name);
            }
        }

        let mut app_names = HashSet::new();
        for app in &self.extra_installed_apps {
            if app.name.is_empty() {
                anyhow::bail!("Extra app name cannot be empty");
            }
            if app.name.contains('/') || app.name.contains('\\') {
                anyhow::bail!(
                    "Extra app name '{}' cannot contain path separators",
                    app.name
                );
            }
            if !app_names.insert(&app.name) {
                anyhow::bail!("Duplicate extra app: {}", app.name);
            }
        }

        let mut emails = HashSet::new();
        for user in &self.users {
            if !emails.insert(user.email.to_lowercase()) {
                anyhow::bail!("Duplicate user email: {}", user.email);
            }
        }

        Ok(())
    }
}

/// Which login backends the server advertises to clients
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuthBackendsConfig {
    pub password: bool,
    pub google: bool,
    pub dev: bool,
}

impl Default for AuthBackendsConfig {
    fn default() -> Self {
        Self {
            password: true,
            google: false,
            dev: false,
        }
    }
}

/// A site-specific application that contributes its own routes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExtraAppConfig {
    pub name: String,

    #[serde(default)]
    pub urls: Vec<RouteConfig>,

    /// Page routes, served only under a language prefix
    #[serde(default)]
    pub i18n_urls: Vec<RouteConfig>,
}

impl ExtraAppConfig {
    pub fn has_routes(&self) -> bool {
        !self.urls.is_empty() || !self.i18n_urls.is_empty()
    }
}

/// Declarative route for extra apps
///
/// Exactly one of `view`, `methods` or `template` should be set.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct RouteConfig {
    pub pattern: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    /// HTTP method -> view id, dispatched through the REST dispatcher
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub methods: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// An account known to the built-in authenticator
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UserConfig {
    pub email: String,

    #[serde(default)]
    pub full_name: String,

    pub api_key: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub is_bot: bool,

    /// Live browser sessions for this account
    #[serde(default)]
    pub session_keys: Vec<String>,
}

// Default functions
fn default_api_port() -> u16 {
    9991
}
fn default_deploy_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_languages() -> Vec<String> {
    [
        "en", "de", "es", "fr", "it", "ja", "ko", "pl", "pt", "ru", "zh-hans",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_session_cookie_name() -> String {
    "sessionid".to_string()
}
fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.api_port, 9991);
        assert_eq!(config.default_language, "en");
        assert!(!config.development);
        assert!(config.terms_of_service.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_validation() {
        let config = RouterConfig {
            api_port: 80,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_language_must_be_listed() {
        let config = RouterConfig {
            languages: vec!["de".to_string()],
            default_language: "en".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extra_app_name_validation() {
        let config = RouterConfig {
            extra_installed_apps: vec![ExtraAppConfig {
                name: "corporate/site".to_string(),
                urls: Vec::new(),
                i18n_urls: Vec::new(),
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_webhook_detection() {
        let mut config = RouterConfig::default();
        let first = config.webhook_integrations[0].clone();
        config.webhook_integrations.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_user_detection() {
        let user = UserConfig {
            email: "iago@example.com".to_string(),
            full_name: "Iago".to_string(),
            api_key: "k".to_string(),
            is_active: true,
            is_bot: false,
            session_keys: Vec::new(),
        };
        let mut upper = user.clone();
        upper.email = "IAGO@example.com".to_string();

        let config = RouterConfig {
            users: vec![user, upper],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(
            &path,
            r#"
api_port = 9100
development = true
terms_of_service = "/etc/chat/terms.md"

[[users]]
email = "othello@example.com"
api_key = "othellokey"
session_keys = ["abc"]

[[extra_installed_apps]]
name = "corporate"

[[extra_installed_apps.urls]]
pattern = "^jobs/$"
template = "corporate/jobs.html"
"#,
        )
        .unwrap();

        let config = RouterConfig::load(Some(path)).unwrap();
        assert_eq!(config.api_port, 9100);
        assert!(config.development);
        assert!(config.terms_of_service.is_some());
        assert_eq!(config.users.len(), 1);
        assert!(config.users[0].is_active);
        assert!(config.extra_installed_apps[0].has_routes());
        // Catalog defaults survive a partial file
        assert!(!config.webhook_integrations.is_empty());
    }
}
