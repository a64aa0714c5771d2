//! The platform's routing table
//!
//! Several other places route requests by URL too: the reverse proxy
//! decides which paths reach this process at all, and the event server
//! keeps its own list for long-polling endpoints.

use super::conf::{
    UrlEntry, ViewFlag, api_docs, help_docs, include, include_namespaced, integrations_docs,
    redirect, rest, template, url, view,
};
use super::pattern::ParamGuard;
use crate::config::RouterConfig;
use crate::error::RouteResult;
use crate::views::builtin;
use axum::http::Method;

/// Uncompiled routing table
#[derive(Debug, Clone)]
pub struct UrlConf {
    /// Page routes served under a language prefix
    pub i18n: Vec<UrlEntry>,
    /// Everything else, tried after the localized routes
    pub urls: Vec<UrlEntry>,
}

/// Emoji names may contain `.`, `-` and `_` but not end with them
const EMOJI_NAME: &str = r"[0-9a-zA-Z.\-_]*[0-9a-zA-Z]";

fn not_me() -> ParamGuard {
    ParamGuard::NotPrefixed("me".to_string())
}

/// HTML pages; their language follows the URL
///
/// New website pages belong here, as opposed to endpoints used by code.
pub fn i18n_urls(config: &RouterConfig) -> Vec<UrlEntry> {
    let mut urls = vec![
        url(r"^$", view("home")).name("home"),
        // Separate landing page so `/` can change without a desktop app release
        url(r"^desktop_home/$", view("desktop_home")).name("desktop_home"),
        url(r"^accounts/login/sso/$", view("auth.remote_user_sso")).name("login-sso"),
        url(r"^accounts/login/jwt/$", view("auth.remote_user_jwt")).name("login-jwt"),
        url(
            r"^accounts/login/social/(\w+)$",
            view("auth.start_social_login"),
        )
        .name("login-social"),
        url(
            r"^accounts/login/google/$",
            view("auth.start_google_oauth2"),
        )
        .name("auth.start_google_oauth2"),
        url(
            r"^accounts/login/google/send/$",
            view("auth.send_oauth_request_to_google"),
        )
        .name("auth.send_oauth_request_to_google"),
        url(
            r"^accounts/login/google/done/$",
            view("auth.finish_google_oauth2"),
        )
        .name("auth.finish_google_oauth2"),
        url(
            r"^accounts/login/subdomain/$",
            view("auth.log_into_subdomain"),
        )
        .name("auth.log_into_subdomain"),
        url(r"^accounts/login/local/$", view("auth.dev_direct_login"))
            .name("auth.dev_direct_login"),
        // Two entries so reversing the wrapped framework login keeps working
        url(r"^accounts/login/", view("auth.login_page"))
            .kwarg("template_name", "login.html")
            .name("auth.login_page"),
        url(r"^accounts/login/", view("auth.login"))
            .kwarg("template_name", "login.html")
            .name("login"),
        url(r"^accounts/logout/", view("auth.logout_then_login"))
            .name("auth.logout_then_login"),
        url(
            r"^accounts/webathena_kerberos_login/",
            view("zephyr.webathena_kerberos_login"),
        )
        .name("zephyr.webathena_kerberos_login"),
        url(r"^accounts/password/reset/$", view("auth.password_reset"))
            .kwarg("post_reset_redirect", "/accounts/password/reset/done/")
            .kwarg("template_name", "reset.html")
            .kwarg("email_template_name", "registration/password_reset_email.txt")
            .name("password_reset"),
        url(
            r"^accounts/password/reset/done/$",
            view("auth.password_reset_done"),
        )
        .kwarg("template_name", "reset_emailed.html"),
        url(
            r"^accounts/password/reset/(?P<uidb64>[0-9A-Za-z]+)/(?P<token>.+)/$",
            view("auth.password_reset_confirm"),
        )
        .kwarg("post_reset_redirect", "/accounts/password/done/")
        .kwarg("template_name", "reset_confirm.html")
        .name("password_reset_confirm"),
        url(
            r"^accounts/password/done/$",
            view("auth.password_reset_complete"),
        )
        .kwarg("template_name", "reset_done.html"),
        // Avatar
        url(r"^avatar/(?P<email>[\S]+)?", view("users.avatar")).name("users.avatar"),
        // Registration; these require a confirmation id
        url(r"^accounts/home/", view("accounts_home")).name("accounts_home"),
        url(
            r"^accounts/send_confirm/(?P<email>[\S]+)?",
            template("accounts_send_confirm.html"),
        )
        .name("send_confirm"),
        url(r"^accounts/register/", view("accounts_register")).name("accounts_register"),
        url(
            r"^accounts/do_confirm/(?P<confirmation_key>[\w]+)",
            view("confirmation.confirm"),
        )
        .name("confirmation.confirm"),
        // Unsubscribe from welcome emails, missed-message digests and the like
        url(
            r"^accounts/unsubscribe/(?P<type>[\w]+)/(?P<token>[\w]+)",
            view("unsubscribe.email_unsubscribe"),
        )
        .name("unsubscribe.email_unsubscribe"),
        url(r"^accounts/accept_terms/$", view("accounts_accept_terms"))
            .name("accounts_accept_terms"),
        // Realm creation
        url(r"^create_realm/$", view("create_realm")).name("create_realm"),
        url(
            r"^create_realm/(?P<creation_key>[\w]+)$",
            view("create_realm"),
        )
        .name("create_realm"),
        // Login/registration shortcuts
        url(r"^register/$", view("accounts_home")).name("register"),
        url(r"^login/$", view("auth.login_page"))
            .kwarg("template_name", "login.html")
            .name("auth.login_page"),
        // Registration that passes the domain through, for open realms
        url(
            r"^register/(?P<domain>\S+)/$",
            view("accounts_home_with_domain"),
        )
        .name("accounts_home_with_domain"),
        // API and integrations documentation
        url(r"^api/$", api_docs("api.html")),
        url(
            r"^api/endpoints/$",
            view("integrations.api_endpoint_docs"),
        )
        .name("integrations.api_endpoint_docs"),
        url(r"^integrations/$", integrations_docs("integrations.html")),
        url(r"^about/$", template("about.html")),
        url(r"^apps/$", template("apps.html")),
        url(r"^robots\.txt$", redirect("/static/robots.txt", true)),
        // Landing page, features pages, signup form
        url(r"^hello/$", template("hello.html")).name("landing-page"),
        url(r"^new-user/$", redirect("/hello", true)),
        url(r"^features/$", template("features.html")),
    ];

    if config.terms_of_service.is_some() {
        urls.push(url(r"^terms/$", template("terms.html")));
    }

    urls
}

/// Endpoints reachable under both `/api/v1/` and `/json/`
///
/// These use REST verbs and exchange JSON. Under `/api/v1/` callers send
/// basic auth with their email and API key; under `/json/` the session
/// cookie authenticates. New authenticated endpoints belong here.
pub fn v1_api_and_json_patterns() -> Vec<UrlEntry> {
    vec![
        // realm-level calls
        url(r"^realm$", rest().patch("realm.update_realm")),
        // Connectivity check for the desktop app
        url(r"generate_204$", view(builtin::GENERATE_204)).name(builtin::GENERATE_204),
        // realm/emoji
        url(
            r"^realm/emoji$",
            rest()
                .get("realm_emoji.list_emoji")
                .put("realm_emoji.upload_emoji"),
        ),
        url(
            &format!(r"^realm/emoji/(?P<emoji_name>{})$", EMOJI_NAME),
            rest().delete("realm_emoji.delete_emoji"),
        ),
        // realm/filters
        url(
            r"^realm/filters$",
            rest()
                .get("realm_filters.list_filters")
                .post("realm_filters.create_filter"),
        ),
        url(
            r"^realm/filters/(?P<filter_id>\d+)$",
            rest().delete("realm_filters.delete_filter"),
        ),
        // users
        url(
            r"^users$",
            rest().get("users.get_members").put("users.create_user"),
        ),
        url(
            r"^users/(?P<email>[^/]*)/reactivate$",
            rest().post("users.reactivate_user"),
        )
        .guard("email", not_me()),
        url(
            r"^users/(?P<email>[^/]*)$",
            rest()
                .patch("users.update_user")
                .delete("users.deactivate_user"),
        )
        .guard("email", not_me()),
        url(r"^bots$", rest().get("users.get_bots").post("users.add_bot")),
        url(
            r"^bots/(?P<email>[^/]*)/api_key/regenerate$",
            rest().post("users.regenerate_bot_api_key"),
        )
        .guard("email", not_me()),
        url(
            r"^bots/(?P<email>[^/]*)$",
            rest().patch("users.patch_bot").delete("users.deactivate_bot"),
        )
        .guard("email", not_me()),
        // messages: GET fetches, possibly filtered; POST sends
        url(
            r"^messages$",
            rest()
                .get("messages.get_messages")
                .patch("messages.update_message")
                .post("messages.send_message"),
        ),
        url(
            r"^messages/(?P<message_id>[0-9]+)$",
            rest().get("messages.fetch_raw_message"),
        ),
        url(
            r"^messages/render$",
            rest().get("messages.render_message"),
        ),
        url(
            r"^messages/flags$",
            rest().post("messages.update_message_flags"),
        ),
        // reactions
        url(
            &format!(
                r"^messages/(?P<message_id>[0-9]+)/emoji_reactions/(?P<emoji_name>{})$",
                EMOJI_NAME
            ),
            rest()
                .put("reactions.add_reaction")
                .delete("reactions.remove_reaction"),
        ),
        // typing notifications to the recipients
        url(r"^typing$", rest().post("typing.send_notification")),
        url(r"^user_uploads$", rest().post("upload.upload_file")),
        // users/me
        url(
            r"^users/me$",
            rest()
                .get("users.get_profile")
                .delete("users.deactivate_own_user"),
        ),
        url(
            r"^users/me/pointer$",
            rest()
                .get("pointer.get_pointer")
                .put("pointer.update_pointer"),
        ),
        url(
            r"^users/me/presence$",
            rest().post("presence.update_active_status"),
        ),
        // Mobile push notification credentials
        url(
            r"^users/me/apns_device_token$",
            rest()
                .post("push_notifications.add_apns_device_token")
                .delete("push_notifications.remove_apns_device_token"),
        ),
        url(
            r"^users/me/android_gcm_reg_id$",
            rest()
                .post("push_notifications.add_android_reg_id")
                .delete("push_notifications.remove_android_reg_id"),
        ),
        // user settings
        url(
            r"^users/me/api_key/regenerate$",
            rest().post("user_settings.regenerate_api_key"),
        ),
        url(
            r"^users/me/enter-sends$",
            rest().post("user_settings.change_enter_sends"),
        ),
        url(
            r"^users/me/avatar$",
            rest()
                .put("user_settings.set_avatar")
                .delete("user_settings.delete_avatar"),
        ),
        url(
            r"^settings/display$",
            rest().patch("user_settings.update_display_settings"),
        ),
        url(
            r"^users/me/alert_words$",
            rest()
                .get("alert_words.list_alert_words")
                .post("alert_words.set_alert_words")
                .put("alert_words.add_alert_words")
                .delete("alert_words.remove_alert_words"),
        ),
        url(
            r"^users/me/(?P<stream_id>\d+)/topics$",
            rest().get("streams.get_topics"),
        ),
        // streams
        url(r"^streams$", rest().get("streams.get_streams")),
        url(
            r"^streams/(?P<stream_name>.*)/members$",
            rest().get("streams.get_subscribers"),
        ),
        // HEAD answers whether the stream exists
        url(
            r"^streams/(?P<stream_name>.*)$",
            rest()
                .head("streams.stream_exists")
                .get("streams.stream_exists")
                .patch("streams.update_stream")
                .delete("streams.deactivate_stream"),
        ),
        url(
            r"^default_streams$",
            rest()
                .put("streams.add_default_stream")
                .delete("streams.remove_default_stream"),
        ),
        // GET lists your streams, POST bulk adds, PATCH bulk modifies/removes
        url(
            r"^users/me/subscriptions$",
            rest()
                .get("streams.list_subscriptions")
                .post("streams.add_subscriptions")
                .patch("streams.update_subscriptions"),
        ),
        // event queue registration
        url(r"^register$", rest().post("events_register.register_events")),
        url(
            r"^events$",
            rest()
                .get("events.get_events")
                .delete("events.cleanup_event_queue"),
        ),
    ]
}

/// Mobile app authentication endpoints
fn mobile_auth_urls() -> Vec<UrlEntry> {
    vec![
        // Lists the enabled login backends; doubles as a server-existence check
        url(r"^api/v1/get_auth_backends", view(builtin::AUTH_BACKENDS))
            .name(builtin::AUTH_BACKENDS),
        // Exchanges username and password for an API key
        url(r"^api/v1/fetch_api_key$", view("auth.api_fetch_api_key"))
            .name("auth.api_fetch_api_key"),
        url(
            r"^api/v1/dev_fetch_api_key$",
            view("auth.api_dev_fetch_api_key"),
        )
        .name("auth.api_dev_fetch_api_key"),
        url(r"^api/v1/dev_get_emails$", view("auth.api_dev_get_emails"))
            .name("auth.api_dev_get_emails"),
        url(
            r"^api/v1/fetch_google_client_id$",
            view(builtin::GOOGLE_CLIENT_ID),
        )
        .name(builtin::GOOGLE_CLIENT_ID),
    ]
}

/// Third-party login flows, mounted under the `social` namespace
fn social_auth_urls() -> Vec<UrlEntry> {
    vec![
        url(r"^login/(?P<backend>[^/]+)/$", view("social.auth")).name("begin"),
        url(r"^complete/(?P<backend>[^/]+)/$", view("social.complete")).name("complete"),
        url(
            r"^disconnect/(?P<backend>[^/]+)/$",
            view("social.disconnect"),
        )
        .name("disconnect"),
        url(
            r"^disconnect/(?P<backend>[^/]+)/(?P<association_id>[^/]+)/$",
            view("social.disconnect"),
        )
        .name("disconnect_individual"),
    ]
}

/// Routes that only exist on development servers
fn dev_urls(config: &RouterConfig) -> Vec<UrlEntry> {
    let root = |rel: &str| config.deploy_root.join(rel).to_string_lossy().into_owned();

    vec![
        url(r"^coverage/(?P<path>.*)$", view(builtin::STATIC_SERVE))
            .kwarg("document_root", &root("var/coverage")),
        url(r"^node-coverage/(?P<path>.*)$", view(builtin::STATIC_SERVE))
            .kwarg("document_root", &root("var/node-coverage/lcov-report")),
        url(r"^docs/(?P<path>.*)$", view(builtin::STATIC_SERVE))
            .kwarg("document_root", &root("docs/_build/html")),
        // Log of emails the dev server "sent"
        url(r"^emails/$", view("development.email_log.email_page")),
        url(
            r"^emails/generate/$",
            view("development.email_log.generate_all_emails"),
        ),
        url(r"^emails/clear/$", view("development.email_log.clear_emails")),
        url(r"^devlogin/$", view("auth.login_page"))
            .kwarg("template_name", "dev_login.html")
            .name("auth.login_page"),
        url(
            r"^confirmation_key/$",
            view("development.registration.confirmation_key"),
        ),
    ]
}

fn dev_i18n_urls() -> Vec<UrlEntry> {
    vec![url(
        r"^confirmation_key/$",
        view("development.registration.confirmation_key"),
    )]
}

/// Assemble the full routing table
///
/// Order matters: localized pages come first, so that reversing a page
/// name finds the page and not an unrelated later route.
pub fn build(config: &RouterConfig) -> RouteResult<UrlConf> {
    let mut i18n = i18n_urls(config);

    // Unprefixed copy, so default-language pages need no prefix
    let mut urls = i18n.clone();

    let v1 = v1_api_and_json_patterns();
    urls.push(url(r"^api/v1/", include(v1.clone())));
    urls.push(url(r"^json/", include(v1)));

    // One URL for both conventions, so mobile apps can fetch uploads
    // without rewriting links
    urls.push(url(
        r"^user_uploads/(?P<realm_id_str>(\d*|unk))/(?P<filename>.*)",
        rest().route_with_flags(
            Method::GET,
            "upload.serve_file",
            &[ViewFlag::OverrideApiUrlScheme],
        ),
    ));

    // Incoming webhooks; git integrations go through the generic dispatcher
    urls.extend(
        config
            .webhook_integrations
            .iter()
            .filter_map(|integration| integration.url_entry()),
    );
    urls.push(
        url(
            r"^api/v1/external/github",
            view("webhooks.github_dispatcher.api_github_webhook_dispatch"),
        )
        .name("webhooks.github_dispatcher"),
    );

    urls.extend(mobile_auth_urls());

    for app in config
        .extra_installed_apps
        .iter()
        .filter(|app| app.has_routes())
    {
        let entries = app
            .urls
            .iter()
            .map(UrlEntry::try_from)
            .collect::<RouteResult<Vec<_>>>()?;
        urls.push(url(r"^", include(entries)));

        for route in &app.i18n_urls {
            i18n.push(UrlEntry::try_from(route)?);
        }

        tracing::debug!(
            app = %app.name,
            urls = app.urls.len(),
            i18n_urls = app.i18n_urls.len(),
            "Included extra app routes"
        );
    }

    // Internal notifications from the web process to the event server
    urls.push(url(r"^notify_tornado$", view("events.notify")).name("events.notify"));

    urls.push(url(r"^", include_namespaced(social_auth_urls(), "social")));

    // User documentation site
    urls.push(url(r"^help/(?P<article>.*)$", help_docs("help/main.html")));

    if config.development {
        urls.extend(dev_urls(config));
        i18n.extend(dev_i18n_urls());
    }

    Ok(UrlConf { i18n, urls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urls::conf::{Endpoint, UrlTarget};

    fn has_pattern(entries: &[UrlEntry], pattern: &str) -> bool {
        entries.iter().any(|e| e.pattern() == pattern)
    }

    #[test]
    fn test_terms_route_depends_on_config() {
        let without = i18n_urls(&RouterConfig::default());
        assert!(!has_pattern(&without, r"^terms/$"));

        let config = RouterConfig {
            terms_of_service: Some("terms.md".into()),
            ..Default::default()
        };
        assert!(has_pattern(&i18n_urls(&config), r"^terms/$"));
    }

    #[test]
    fn test_v1_patterns_are_included_twice() {
        let conf = build(&RouterConfig::default()).unwrap();
        let prefixes: Vec<&str> = conf
            .urls
            .iter()
            .filter(|e| matches!(e.target(), UrlTarget::Include { namespace: None, .. }))
            .map(|e| e.pattern())
            .collect();
        assert!(prefixes.contains(&"^api/v1/"));
        assert!(prefixes.contains(&"^json/"));
    }

    #[test]
    fn test_only_generate_204_bypasses_dispatcher() {
        for entry in v1_api_and_json_patterns() {
            match entry.target() {
                UrlTarget::Endpoint(Endpoint::Rest(methods)) => assert!(!methods.is_empty()),
                UrlTarget::Endpoint(Endpoint::View(id)) => assert_eq!(id, builtin::GENERATE_204),
                other => panic!("unexpected target {:?}", other),
            }
        }
    }

    #[test]
    fn test_dev_routes_only_in_development() {
        let conf = build(&RouterConfig::default()).unwrap();
        assert!(!has_pattern(&conf.urls, r"^devlogin/$"));

        let conf = build(&RouterConfig {
            development: true,
            ..Default::default()
        })
        .unwrap();
        assert!(has_pattern(&conf.urls, r"^devlogin/$"));
        assert!(has_pattern(&conf.i18n, r"^confirmation_key/$"));
    }

    #[test]
    fn test_dev_i18n_routes_are_not_copied_unprefixed() {
        let conf = build(&RouterConfig {
            development: true,
            ..Default::default()
        })
        .unwrap();
        // The unprefixed copy is taken before dev routes are added, so the
        // only unprefixed confirmation_key route is the plain dev one
        let unprefixed = conf
            .urls
            .iter()
            .filter(|e| e.pattern() == r"^confirmation_key/$")
            .count();
        assert_eq!(unprefixed, 1);
    }

    #[test]
    fn test_generic_dispatch_integrations_get_no_route() {
        let conf = build(&RouterConfig::default()).unwrap();
        assert!(has_pattern(&conf.urls, r"^api/v1/external/jira$"));
        assert!(!has_pattern(&conf.urls, r"^api/v1/external/github$"));
        assert!(has_pattern(&conf.urls, r"^api/v1/external/github"));
    }
}
