//! Declarative routing entries
//!
//! Entries are plain data. [`crate::urls::Resolver`] compiles them, so the
//! table in [`crate::urls::table`] reads as a list of bindings without any
//! error plumbing.

use super::pattern::ParamGuard;
use crate::config::RouteConfig;
use crate::error::RouteError;
use axum::http::Method;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-binding options understood by the REST dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewFlag {
    /// Accept basic auth on a path outside `/api` when credentials are sent
    OverrideApiUrlScheme,
}

/// One HTTP method bound to a view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestBinding {
    pub method: Method,
    pub view: String,
    pub flags: Vec<ViewFlag>,
}

impl RestBinding {
    pub fn has_flag(&self, flag: ViewFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Method table for a REST endpoint, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestMethods {
    bindings: Vec<RestBinding>,
}

impl RestMethods {
    pub fn get(self, view: &str) -> Self {
        self.route(Method::GET, view)
    }

    pub fn post(self, view: &str) -> Self {
        self.route(Method::POST, view)
    }

    pub fn put(self, view: &str) -> Self {
        self.route(Method::PUT, view)
    }

    pub fn patch(self, view: &str) -> Self {
        self.route(Method::PATCH, view)
    }

    pub fn delete(self, view: &str) -> Self {
        self.route(Method::DELETE, view)
    }

    pub fn head(self, view: &str) -> Self {
        self.route(Method::HEAD, view)
    }

    pub fn route(self, method: Method, view: &str) -> Self {
        self.route_with_flags(method, view, &[])
    }

    /// Bind `method`, replacing any earlier binding for it
    pub fn route_with_flags(mut self, method: Method, view: &str, flags: &[ViewFlag]) -> Self {
        self.bindings.retain(|b| b.method != method);
        self.bindings.push(RestBinding {
            method,
            view: view.to_string(),
            flags: flags.to_vec(),
        });
        self
    }

    pub fn binding(&self, method: &Method) -> Option<&RestBinding> {
        self.bindings.iter().find(|b| &b.method == method)
    }

    pub fn allowed(&self) -> Vec<Method> {
        self.bindings.iter().map(|b| b.method.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RestBinding> {
        self.bindings.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// How a page route renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Template,
    ApiDocs,
    Integrations,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub kind: PageKind,
    pub template: String,
}

/// What a matched route hands the request to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    View(String),
    Rest(RestMethods),
    Page(Page),
    Redirect { url: String, permanent: bool },
}

impl Endpoint {
    pub fn kind(&self) -> &'static str {
        match self {
            Endpoint::View(_) => "view",
            Endpoint::Rest(_) => "rest",
            Endpoint::Page(_) => "page",
            Endpoint::Redirect { .. } => "redirect",
        }
    }
}

#[derive(Debug, Clone)]
pub enum UrlTarget {
    Endpoint(Endpoint),
    Include {
        entries: Vec<UrlEntry>,
        namespace: Option<String>,
    },
}

impl From<Endpoint> for UrlTarget {
    fn from(endpoint: Endpoint) -> Self {
        UrlTarget::Endpoint(endpoint)
    }
}

impl From<RestMethods> for UrlTarget {
    fn from(methods: RestMethods) -> Self {
        UrlTarget::Endpoint(Endpoint::Rest(methods))
    }
}

/// One row of the routing table
#[derive(Debug, Clone)]
pub struct UrlEntry {
    pattern: String,
    target: UrlTarget,
    name: Option<String>,
    defaults: BTreeMap<String, String>,
    guards: Vec<(String, ParamGuard)>,
}

impl UrlEntry {
    /// Name used for reversing
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Extra keyword argument passed to the view on every match
    pub fn kwarg(mut self, key: &str, value: &str) -> Self {
        self.defaults.insert(key.to_string(), value.to_string());
        self
    }

    pub fn guard(mut self, param: &str, guard: ParamGuard) -> Self {
        self.guards.push((param.to_string(), guard));
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn target(&self) -> &UrlTarget {
        &self.target
    }

    pub fn route_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn defaults(&self) -> &BTreeMap<String, String> {
        &self.defaults
    }

    pub fn guards(&self) -> &[(String, ParamGuard)] {
        &self.guards
    }
}

pub fn url(pattern: &str, target: impl Into<UrlTarget>) -> UrlEntry {
    UrlEntry {
        pattern: pattern.to_string(),
        target: target.into(),
        name: None,
        defaults: BTreeMap::new(),
        guards: Vec::new(),
    }
}

pub fn view(id: &str) -> Endpoint {
    Endpoint::View(id.to_string())
}

pub fn rest() -> RestMethods {
    RestMethods::default()
}

pub fn template(template: &str) -> Endpoint {
    page(PageKind::Template, template)
}

pub fn api_docs(template: &str) -> Endpoint {
    page(PageKind::ApiDocs, template)
}

pub fn integrations_docs(template: &str) -> Endpoint {
    page(PageKind::Integrations, template)
}

pub fn help_docs(template: &str) -> Endpoint {
    page(PageKind::Help, template)
}

fn page(kind: PageKind, template: &str) -> Endpoint {
    Endpoint::Page(Page {
        kind,
        template: template.to_string(),
    })
}

pub fn redirect(url: &str, permanent: bool) -> Endpoint {
    Endpoint::Redirect {
        url: url.to_string(),
        permanent,
    }
}

pub fn include(entries: Vec<UrlEntry>) -> UrlTarget {
    UrlTarget::Include {
        entries,
        namespace: None,
    }
}

pub fn include_namespaced(entries: Vec<UrlEntry>, namespace: &str) -> UrlTarget {
    UrlTarget::Include {
        entries,
        namespace: Some(namespace.to_string()),
    }
}

impl TryFrom<&RouteConfig> for UrlEntry {
    type Error = RouteError;

    fn try_from(config: &RouteConfig) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| RouteError::InvalidRoute {
            pattern: config.pattern.clone(),
            reason: reason.to_string(),
        };

        let endpoint = match (&config.view, config.methods.is_empty(), &config.template) {
            (Some(id), true, None) => view(id),
            (None, false, None) => {
                let mut methods = rest();
                for (method, id) in &config.methods {
                    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                        .map_err(|_| invalid("unknown HTTP method"))?;
                    methods = methods.route(method, id);
                }
                Endpoint::Rest(methods)
            }
            (None, true, Some(name)) => template(name),
            _ => return Err(invalid("exactly one of view, methods or template is required")),
        };

        let entry = url(&config.pattern, endpoint);
        Ok(match &config.name {
            Some(name) => entry.name(name),
            None => entry,
        })
    }
}
