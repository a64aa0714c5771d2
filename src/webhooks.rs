//! Incoming webhook integration catalog

use crate::urls::conf::{UrlEntry, url, view};
use serde::{Deserialize, Serialize};

/// URL prefix shared by every incoming webhook
pub const EXTERNAL_PREFIX: &str = "api/v1/external/";

/// A third-party service that pushes events to the server
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WebhookIntegration {
    pub name: String,

    /// Display name for the integrations page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Path relative to the site root; defaults to `api/v1/external/<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Handler id; defaults to `webhooks.<name>.api_<name>_webhook`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    /// Served by the generic git dispatcher rather than a route of its own
    #[serde(default)]
    pub generic_dispatch: bool,
}

impl WebhookIntegration {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: None,
            url: None,
            view: None,
            generic_dispatch: false,
        }
    }

    fn dispatched(mut self) -> Self {
        self.generic_dispatch = true;
        self
    }

    fn titled(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_string());
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn url_path(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("{}{}", EXTERNAL_PREFIX, self.name))
    }

    pub fn view_id(&self) -> String {
        self.view
            .clone()
            .unwrap_or_else(|| format!("webhooks.{0}.api_{0}_webhook", self.name))
    }

    /// The route this integration contributes, if it has one of its own
    pub fn url_entry(&self) -> Option<UrlEntry> {
        if self.generic_dispatch {
            return None;
        }
        let pattern = format!("^{}$", regex::escape(&self.url_path()));
        Some(url(&pattern, view(&self.view_id())).name(&self.view_id()))
    }
}

/// Integrations shipped with the server
pub fn default_integrations() -> Vec<WebhookIntegration> {
    let mut catalog: Vec<WebhookIntegration> = [
        "airbrake",
        "beanstalk",
        "bitbucket",
        "bitbucket2",
        "circleci",
        "codeship",
        "crashlytics",
        "delighted",
        "deskdotcom",
        "freshdesk",
        "gitlab",
        "gogs",
        "helloworld",
        "heroku",
        "ifttt",
        "jira",
        "librato",
        "mention",
        "newrelic",
        "pagerduty",
        "papertrail",
        "pingdom",
        "pivotal",
        "semaphore",
        "sentry",
        "slack",
        "solano",
        "stash",
        "stripe",
        "taiga",
        "teamcity",
        "transifex",
        "travis",
        "trello",
        "updown",
        "yo",
        "zendesk",
    ]
    .into_iter()
    .map(WebhookIntegration::new)
    .collect();

    catalog.push(WebhookIntegration::new("github").titled("GitHub").dispatched());
    catalog.push(
        WebhookIntegration::new("github_webhook")
            .titled("GitHub (webhook)")
            .dispatched(),
    );

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url_and_view() {
        let hook = WebhookIntegration::new("travis");
        assert_eq!(hook.url_path(), "api/v1/external/travis");
        assert_eq!(hook.view_id(), "webhooks.travis.api_travis_webhook");
        assert_eq!(hook.display_name(), "travis");
    }

    #[test]
    fn test_dispatched_integrations_have_no_route() {
        let catalog = default_integrations();
        let github = catalog.iter().find(|h| h.name == "github").unwrap();
        assert!(github.url_entry().is_none());

        let jira = catalog.iter().find(|h| h.name == "jira").unwrap();
        assert!(jira.url_entry().is_some());
    }

    #[test]
    fn test_custom_url_is_escaped() {
        let hook = WebhookIntegration {
            url: Some("api/v1/external/deskdotcom.v2".to_string()),
            ..WebhookIntegration::new("deskdotcom")
        };
        let entry = hook.url_entry().unwrap();
        assert_eq!(entry.pattern(), r"^api/v1/external/deskdotcom\.v2$");
    }
}
