//! Path resolution and reversing over the compiled routing table

use super::conf::{Endpoint, UrlEntry, UrlTarget};
use super::pattern::UrlPattern;
use super::table::{self, UrlConf};
use crate::config::RouterConfig;
use crate::error::{RouteError, RouteResult};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug)]
enum RouteKind {
    Endpoint(Endpoint),
    Include {
        routes: Vec<Route>,
        namespace: Option<String>,
    },
}

#[derive(Debug)]
struct Route {
    pattern: UrlPattern,
    kind: RouteKind,
    name: Option<String>,
    defaults: BTreeMap<String, String>,
}

impl Route {
    fn compile(entry: &UrlEntry) -> RouteResult<Self> {
        let pattern = UrlPattern::new(entry.pattern())?.with_guards(entry.guards().to_vec());
        let kind = match entry.target() {
            UrlTarget::Endpoint(endpoint) => RouteKind::Endpoint(endpoint.clone()),
            UrlTarget::Include { entries, namespace } => RouteKind::Include {
                routes: compile_all(entries)?,
                namespace: namespace.clone(),
            },
        };

        Ok(Self {
            pattern,
            kind,
            name: entry.route_name().map(String::from),
            defaults: entry.defaults().clone(),
        })
    }
}

fn compile_all(entries: &[UrlEntry]) -> RouteResult<Vec<Route>> {
    entries.iter().map(Route::compile).collect()
}

/// A resolved request path
#[derive(Debug, Clone)]
pub struct ResolverMatch<'r> {
    pub endpoint: &'r Endpoint,
    pub kwargs: BTreeMap<String, String>,
    pub args: Vec<String>,
    pub name: Option<String>,
    pub namespaces: Vec<String>,
    /// Language taken from the path prefix, for localized pages
    pub language: Option<String>,
    /// Display form of the full pattern that matched
    pub route: String,
}

impl ResolverMatch<'_> {
    /// Route name qualified with its namespaces, e.g. `social:begin`
    pub fn view_name(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        if self.namespaces.is_empty() {
            return Some(name.to_string());
        }
        Some(format!("{}:{}", self.namespaces.join(":"), name))
    }
}

/// Flattened description of one route, for listings
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteSummary {
    pub pattern: String,
    pub kind: &'static str,
    pub views: Vec<String>,
    pub methods: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub localized: bool,
}

pub struct Resolver {
    i18n: Vec<Route>,
    routes: Vec<Route>,
    languages: Vec<String>,
    default_language: String,
}

impl Resolver {
    /// Compile a routing table
    pub fn new(conf: &UrlConf, languages: &[String], default_language: &str) -> RouteResult<Self> {
        if !languages.iter().any(|l| l == default_language) {
            return Err(RouteError::UnknownLanguage(default_language.to_string()));
        }

        let resolver = Self {
            i18n: compile_all(&conf.i18n)?,
            routes: compile_all(&conf.urls)?,
            languages: languages.to_vec(),
            default_language: default_language.to_string(),
        };

        tracing::info!(
            localized = resolver.i18n.len(),
            routes = resolver.routes.len(),
            languages = resolver.languages.len(),
            "Routing table compiled"
        );

        Ok(resolver)
    }

    /// Build and compile the table described by `config`
    pub fn from_config(config: &RouterConfig) -> RouteResult<Self> {
        let conf = table::build(config)?;
        Self::new(&conf, &config.languages, &config.default_language)
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    fn split_language<'p>(&self, path: &'p str) -> Option<(&str, &'p str)> {
        let (first, rest) = path.split_once('/')?;
        self.languages
            .iter()
            .find(|l| l.as_str() == first)
            .map(|l| (l.as_str(), rest))
    }

    /// Resolve a decoded request path
    pub fn resolve(&self, path: &str) -> Option<ResolverMatch<'_>> {
        let path = path.strip_prefix('/').unwrap_or(path);

        if let Some((language, rest)) = self.split_language(path)
            && let Some(mut matched) = resolve_in(&self.i18n, rest)
        {
            matched.route = format!("^{}/{}", language, matched.route.trim_start_matches('^'));
            matched.language = Some(language.to_string());
            return Some(matched);
        }

        resolve_in(&self.routes, path)
    }

    /// Path for a named route
    ///
    /// The unprefixed table is searched first; routes that only exist
    /// localized get the default-language prefix. When several routes
    /// share a name, the last one declared that accepts the arguments wins.
    pub fn reverse(&self, name: &str, args: &[&str], kwargs: &[(&str, &str)]) -> RouteResult<String> {
        let (namespaces, name) = split_namespaces(name);

        if let Some(path) = reverse_in(&self.routes, &namespaces, name, args, kwargs) {
            return Ok(format!("/{}", path));
        }
        if let Some(path) = reverse_in(&self.i18n, &namespaces, name, args, kwargs) {
            return Ok(format!("/{}/{}", self.default_language, path));
        }

        Err(unreversible_in(&self.routes, &namespaces, name)
            .or_else(|| unreversible_in(&self.i18n, &namespaces, name))
            .unwrap_or_else(|| RouteError::NoReverseMatch {
                name: name.to_string(),
            }))
    }

    /// Path for a named page under a language prefix
    pub fn reverse_localized(
        &self,
        language: &str,
        name: &str,
        args: &[&str],
        kwargs: &[(&str, &str)],
    ) -> RouteResult<String> {
        if !self.languages.iter().any(|l| l == language) {
            return Err(RouteError::UnknownLanguage(language.to_string()));
        }
        let (namespaces, bare) = split_namespaces(name);

        match reverse_in(&self.i18n, &namespaces, bare, args, kwargs) {
            Some(path) => Ok(format!("/{}/{}", language, path)),
            None => self.reverse(name, args, kwargs),
        }
    }

    /// Flatten the table for listing, localized routes first
    pub fn describe(&self) -> Vec<RouteSummary> {
        let mut out = Vec::new();
        describe_in(&self.i18n, "^<language>/", &[], true, &mut out);
        describe_in(&self.routes, "^", &[], false, &mut out);
        out
    }
}

fn split_namespaces(name: &str) -> (Vec<&str>, &str) {
    let mut parts: Vec<&str> = name.split(':').collect();
    let bare = parts.pop().unwrap_or(name);
    (parts, bare)
}

fn join_patterns(prefix: &str, pattern: &str) -> String {
    format!("{}{}", prefix, pattern.trim_start_matches('^'))
}

fn resolve_in<'r>(routes: &'r [Route], path: &str) -> Option<ResolverMatch<'r>> {
    for route in routes {
        let Some(found) = route.pattern.search(path) else {
            continue;
        };

        match &route.kind {
            RouteKind::Endpoint(endpoint) => {
                let mut kwargs: BTreeMap<String, String> = found.kwargs.into_iter().collect();
                kwargs.extend(route.defaults.clone());
                return Some(ResolverMatch {
                    endpoint,
                    kwargs,
                    args: found.args,
                    name: route.name.clone(),
                    namespaces: Vec::new(),
                    language: None,
                    route: route.pattern.as_str().to_string(),
                });
            }
            RouteKind::Include { routes, namespace } => {
                let Some(mut sub) = resolve_in(routes, &path[found.end..]) else {
                    continue;
                };

                // Outer captures first; the inner match wins on conflicts
                let mut kwargs: BTreeMap<String, String> = found.kwargs.into_iter().collect();
                kwargs.extend(route.defaults.clone());
                kwargs.append(&mut sub.kwargs);
                sub.kwargs = kwargs;
                if sub.kwargs.is_empty() {
                    let mut args = found.args;
                    args.append(&mut sub.args);
                    sub.args = args;
                }

                if let Some(namespace) = namespace {
                    sub.namespaces.insert(0, namespace.clone());
                }
                sub.route = join_patterns(route.pattern.as_str(), &sub.route);
                return Some(sub);
            }
        }
    }
    None
}

fn reverse_in(
    routes: &[Route],
    namespaces: &[&str],
    name: &str,
    args: &[&str],
    kwargs: &[(&str, &str)],
) -> Option<String> {
    for route in routes.iter().rev() {
        match &route.kind {
            RouteKind::Endpoint(_) => {
                if namespaces.is_empty()
                    && route.name.as_deref() == Some(name)
                    && let Some(path) = route.pattern.reverse(args, kwargs)
                {
                    return Some(path);
                }
            }
            RouteKind::Include {
                routes: children,
                namespace,
            } => {
                let remaining = match (namespace, namespaces.split_first()) {
                    (None, _) => namespaces,
                    (Some(ns), Some((first, rest))) if ns == first => rest,
                    (Some(_), _) => continue,
                };
                let Some(prefix) = route.pattern.reverse(&[], &[]) else {
                    continue;
                };
                if let Some(path) = reverse_in(children, remaining, name, args, kwargs) {
                    return Some(format!("{}{}", prefix, path));
                }
            }
        }
    }
    None
}

/// Why a same-named route could not be reversed, if its pattern is the cause
fn unreversible_in(routes: &[Route], namespaces: &[&str], name: &str) -> Option<RouteError> {
    routes.iter().rev().find_map(|route| match &route.kind {
        RouteKind::Endpoint(_) if namespaces.is_empty() && route.name.as_deref() == Some(name) => {
            route.pattern.reverse_error()
        }
        RouteKind::Endpoint(_) => None,
        RouteKind::Include {
            routes: children,
            namespace,
        } => {
            let remaining = match (namespace, namespaces.split_first()) {
                (None, _) => namespaces,
                (Some(ns), Some((first, rest))) if ns == first => rest,
                (Some(_), _) => return None,
            };
            unreversible_in(children, remaining, name)
        }
    })
}

fn describe_in(
    routes: &[Route],
    prefix: &str,
    namespaces: &[String],
    localized: bool,
    out: &mut Vec<RouteSummary>,
) {
    for route in routes {
        let pattern = join_patterns(prefix, route.pattern.as_str());
        match &route.kind {
            RouteKind::Endpoint(endpoint) => {
                let (views, methods) = match endpoint {
                    Endpoint::View(id) => (vec![id.clone()], Vec::new()),
                    Endpoint::Rest(methods) => (
                        methods.iter().map(|b| b.view.clone()).collect(),
                        methods.iter().map(|b| b.method.to_string()).collect(),
                    ),
                    Endpoint::Page(page) => (vec![page.template.clone()], Vec::new()),
                    Endpoint::Redirect { url, .. } => (vec![url.clone()], Vec::new()),
                };
                let name = route.name.as_ref().map(|name| {
                    if namespaces.is_empty() {
                        name.clone()
                    } else {
                        format!("{}:{}", namespaces.join(":"), name)
                    }
                });
                out.push(RouteSummary {
                    pattern,
                    kind: endpoint.kind(),
                    views,
                    methods,
                    name,
                    localized,
                });
            }
            RouteKind::Include {
                routes: children,
                namespace,
            } => {
                let mut nested = namespaces.to_vec();
                nested.extend(namespace.iter().cloned());
                describe_in(children, &pattern, &nested, localized, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn resolver() -> Resolver {
        Resolver::from_config(&RouterConfig::default()).unwrap()
    }

    fn rest_methods<'r>(m: &ResolverMatch<'r>) -> Vec<Method> {
        match m.endpoint {
            Endpoint::Rest(methods) => methods.allowed(),
            other => panic!("expected REST endpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_home() {
        let r = resolver();
        let m = r.resolve("/").unwrap();
        assert_eq!(m.endpoint, &Endpoint::View("home".to_string()));
        assert_eq!(m.name.as_deref(), Some("home"));
        assert!(m.language.is_none());
    }

    #[test]
    fn test_resolve_localized_page() {
        let r = resolver();
        let m = r.resolve("/de/accounts/login/sso/").unwrap();
        assert_eq!(m.language.as_deref(), Some("de"));
        assert_eq!(m.name.as_deref(), Some("login-sso"));
        assert_eq!(m.route, "^de/accounts/login/sso/$");
    }

    #[test]
    fn test_unknown_language_prefix_is_not_localized() {
        let r = resolver();
        assert!(r.resolve("/xx/accounts/login/sso/").is_none());
    }

    #[test]
    fn test_v1_route_under_both_prefixes() {
        let r = resolver();
        for path in ["/api/v1/users/me/pointer", "/json/users/me/pointer"] {
            let m = r.resolve(path).unwrap();
            assert_eq!(rest_methods(&m), vec![Method::GET, Method::PUT]);
        }
    }

    #[test]
    fn test_users_me_is_not_captured_as_email() {
        let r = resolver();
        let m = r.resolve("/json/users/me").unwrap();
        assert_eq!(rest_methods(&m), vec![Method::GET, Method::DELETE]);
        assert!(m.kwargs.is_empty());

        let m = r.resolve("/json/users/iago@example.com").unwrap();
        assert_eq!(rest_methods(&m), vec![Method::PATCH, Method::DELETE]);
        assert_eq!(m.kwargs["email"], "iago@example.com");
    }

    #[test]
    fn test_stream_members_before_stream() {
        let r = resolver();
        let m = r.resolve("/api/v1/streams/Denmark/members").unwrap();
        assert_eq!(rest_methods(&m), vec![Method::GET]);
        let m = r.resolve("/api/v1/streams/Denmark").unwrap();
        assert_eq!(
            rest_methods(&m),
            vec![Method::HEAD, Method::GET, Method::PATCH, Method::DELETE]
        );
        assert_eq!(m.kwargs["stream_name"], "Denmark");
    }

    #[test]
    fn test_unanchored_generate_204() {
        let r = resolver();
        let m = r.resolve("/json/some/nested/generate_204").unwrap();
        assert_eq!(m.name.as_deref(), Some("generate_204"));
    }

    #[test]
    fn test_defaults_are_merged_into_kwargs() {
        let r = resolver();
        let m = r.resolve("/login/").unwrap();
        assert_eq!(m.kwargs["template_name"], "login.html");
    }

    #[test]
    fn test_namespaced_social_route() {
        let r = resolver();
        let m = r.resolve("/complete/github/").unwrap();
        assert_eq!(m.view_name().as_deref(), Some("social:complete"));
        assert_eq!(m.kwargs["backend"], "github");
    }

    #[test]
    fn test_reverse_plain_and_localized() {
        let r = resolver();
        assert_eq!(r.reverse("home", &[], &[]).unwrap(), "/");
        assert_eq!(
            r.reverse("login-social", &["github"], &[]).unwrap(),
            "/accounts/login/social/github"
        );
        assert_eq!(
            r.reverse_localized("fr", "landing-page", &[], &[]).unwrap(),
            "/fr/hello/"
        );
        assert!(matches!(
            r.reverse_localized("xx", "landing-page", &[], &[]),
            Err(RouteError::UnknownLanguage(_))
        ));
    }

    #[test]
    fn test_reverse_picks_candidate_that_fits() {
        let r = resolver();
        assert_eq!(r.reverse("create_realm", &[], &[]).unwrap(), "/create_realm/");
        assert_eq!(
            r.reverse("create_realm", &[], &[("creation_key", "abc123")])
                .unwrap(),
            "/create_realm/abc123"
        );
    }

    #[test]
    fn test_reverse_through_namespace() {
        let r = resolver();
        assert_eq!(
            r.reverse("social:begin", &[], &[("backend", "google")])
                .unwrap(),
            "/login/google/"
        );
        assert!(r.reverse("begin", &[], &[("backend", "google")]).is_err());
    }

    #[test]
    fn test_reverse_through_include() {
        let r = resolver();
        // Included under both prefixes; the later include wins
        assert_eq!(
            r.reverse("generate_204", &[], &[]).unwrap(),
            "/json/generate_204"
        );
    }

    #[test]
    fn test_reverse_prefers_last_declared_route() {
        let r = resolver();
        assert_eq!(r.reverse("auth.login_page", &[], &[]).unwrap(), "/login/");

        let dev = Resolver::from_config(&RouterConfig {
            development: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            dev.reverse("auth.login_page", &[], &[]).unwrap(),
            "/devlogin/"
        );
    }

    #[test]
    fn test_reverse_reports_unreversible_pattern() {
        use crate::urls::conf::{url, view};

        let conf = UrlConf {
            i18n: Vec::new(),
            urls: vec![
                url(r"^files/.*$", view("files.serve")).name("files"),
                url(r"^ping$", view("ping")).name("ping"),
            ],
        };
        let r = Resolver::new(&conf, &["en".to_string()], "en").unwrap();

        assert!(matches!(
            r.reverse("files", &[], &[]),
            Err(RouteError::NotReversible { .. })
        ));
        assert!(matches!(
            r.reverse("ping", &["extra"], &[]),
            Err(RouteError::NoReverseMatch { .. })
        ));
    }

    #[test]
    fn test_reverse_unknown_name() {
        let r = resolver();
        assert!(matches!(
            r.reverse("no-such-route", &[], &[]),
            Err(RouteError::NoReverseMatch { .. })
        ));
    }

    #[test]
    fn test_describe_lists_both_prefixes() {
        let r = resolver();
        let summary = r.describe();
        assert!(summary.iter().any(|s| s.pattern == "^api/v1/realm/emoji$"));
        assert!(summary.iter().any(|s| s.pattern == "^json/realm/emoji$"));
        assert!(
            summary
                .iter()
                .any(|s| s.localized && s.pattern == "^<language>/hello/$")
        );
        let begin = summary
            .iter()
            .find(|s| s.name.as_deref() == Some("social:begin"))
            .unwrap();
        assert_eq!(begin.pattern, "^login/(?P<backend>[^/]+)/$");
    }

    #[test]
    fn test_extra_app_i18n_urls_need_language_prefix() {
        use crate::config::{ExtraAppConfig, RouteConfig};

        let config = RouterConfig {
            extra_installed_apps: vec![ExtraAppConfig {
                name: "corporate".to_string(),
                urls: vec![RouteConfig {
                    pattern: r"^jobs/feed$".to_string(),
                    view: Some("corporate.jobs_feed".to_string()),
                    name: Some("jobs-feed".to_string()),
                    ..Default::default()
                }],
                i18n_urls: vec![RouteConfig {
                    pattern: r"^jobs/$".to_string(),
                    template: Some("corporate/jobs.html".to_string()),
                    name: Some("jobs".to_string()),
                    ..Default::default()
                }],
            }],
            ..Default::default()
        };
        let r = Resolver::from_config(&config).unwrap();

        let m = r.resolve("/de/jobs/").unwrap();
        assert_eq!(m.language.as_deref(), Some("de"));
        assert_eq!(m.view_name().as_deref(), Some("jobs"));
        assert!(r.resolve("/jobs/").is_none());

        let m = r.resolve("/jobs/feed").unwrap();
        assert_eq!(m.endpoint, &Endpoint::View("corporate.jobs_feed".to_string()));
        assert_eq!(r.reverse("jobs", &[], &[]).unwrap(), "/en/jobs/");
    }

    #[test]
    fn test_resolver_rejects_unlisted_default_language() {
        let conf = table::build(&RouterConfig::default()).unwrap();
        assert!(matches!(
            Resolver::new(&conf, &["de".to_string()], "en"),
            Err(RouteError::UnknownLanguage(_))
        ));
    }
}
