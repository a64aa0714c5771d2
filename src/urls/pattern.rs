//! Compiled URL patterns with search and reverse support
//!
//! Patterns are regular expressions applied to the request path with its
//! leading slash removed. Matching uses search semantics: a pattern without
//! a leading `^` may match anywhere in the remaining path. Reversing walks
//! the pattern source and substitutes captured groups with caller-supplied
//! values, so only patterns made of literal text and groups can be reversed.

use crate::error::{RouteError, RouteResult};
use regex::Regex;
use serde::Serialize;

/// Extra constraint on a captured parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParamGuard {
    /// The captured value must not start with the given text
    NotPrefixed(String),
}

impl ParamGuard {
    pub fn allows(&self, value: &str) -> bool {
        match self {
            ParamGuard::NotPrefixed(prefix) => !value.starts_with(prefix.as_str()),
        }
    }
}

/// Result of a successful search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Byte offset just past the match; includes resolve the remainder
    pub end: usize,
    pub kwargs: Vec<(String, String)>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Group {
        name: Option<String>,
        matcher: Regex,
        optional: bool,
    },
}

#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    regex: Regex,
    has_named_groups: bool,
    guards: Vec<(String, ParamGuard)>,
    template: Result<Vec<Segment>, String>,
}

impl UrlPattern {
    pub fn new(source: &str) -> RouteResult<Self> {
        let regex = Regex::new(source).map_err(|e| RouteError::InvalidPattern {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;
        let has_named_groups = regex.capture_names().flatten().next().is_some();

        Ok(Self {
            source: source.to_string(),
            regex,
            has_named_groups,
            guards: Vec::new(),
            template: parse_template(source),
        })
    }

    pub fn with_guards(mut self, guards: Vec<(String, ParamGuard)>) -> Self {
        self.guards = guards;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Search `path` for this pattern
    ///
    /// Named groups become kwargs and suppress positional args. Groups that
    /// did not participate in the match are left out.
    pub fn search(&self, path: &str) -> Option<PatternMatch> {
        let caps = self.regex.captures(path)?;
        let end = caps.get(0)?.end();

        let mut kwargs = Vec::new();
        let mut args = Vec::new();

        if self.has_named_groups {
            for name in self.regex.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    kwargs.push((name.to_string(), m.as_str().to_string()));
                }
            }
        } else {
            args.extend(
                caps.iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str().to_string()),
            );
        }

        for (param, guard) in &self.guards {
            if let Some((_, value)) = kwargs.iter().find(|(k, _)| k == param)
                && !guard.allows(value)
            {
                return None;
            }
        }

        Some(PatternMatch { end, kwargs, args })
    }

    /// Rebuild a path from this pattern
    ///
    /// Returns `None` when the pattern is not reversible or the arguments do
    /// not fit: a missing required group, a value the group would not match,
    /// or leftover arguments.
    pub fn reverse(&self, args: &[&str], kwargs: &[(&str, &str)]) -> Option<String> {
        let segments = self.template.as_ref().ok()?;
        let mut positional = args.iter();
        let mut used_kwargs = 0;
        let mut out = String::new();

        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Group {
                    name,
                    matcher,
                    optional,
                } => {
                    let value = match name {
                        Some(name) => kwargs
                            .iter()
                            .find(|(k, _)| k == name)
                            .map(|(_, v)| *v)
                            .inspect(|_| used_kwargs += 1),
                        None => positional.next().copied(),
                    };

                    match value {
                        Some(value) => {
                            if !matcher.is_match(value) {
                                return None;
                            }
                            if let Some(name) = name
                                && self
                                    .guards
                                    .iter()
                                    .any(|(param, guard)| param == name && !guard.allows(value))
                            {
                                return None;
                            }
                            out.push_str(&quote_path(value));
                        }
                        None if *optional => {}
                        None => return None,
                    }
                }
            }
        }

        if positional.next().is_some() || used_kwargs != kwargs.len() {
            return None;
        }

        Some(out)
    }

    /// Reason this pattern cannot be reversed, if any
    pub fn reverse_error(&self) -> Option<RouteError> {
        self.template
            .as_ref()
            .err()
            .map(|reason| RouteError::NotReversible {
                pattern: self.source.clone(),
                reason: reason.clone(),
            })
    }
}

/// Split a pattern into literal text and capture groups
fn parse_template(source: &str) -> Result<Vec<Segment>, String> {
    let body = source.strip_prefix('^').unwrap_or(source);
    let chars: Vec<char> = body.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '$' if i + 1 == chars.len() => break,
            '\\' => {
                let escaped = *chars.get(i + 1).ok_or("trailing backslash")?;
                if escaped.is_ascii_alphanumeric() {
                    return Err(format!("character class '\\{}' outside a group", escaped));
                }
                literal.push(escaped);
                i += 2;
            }
            '(' => {
                let close = find_group_end(&chars, i)?;
                let inner: String = chars[i + 1..close].iter().collect();
                let (name, sub) = split_group_header(&inner)?;
                let matcher = Regex::new(&format!("^(?:{})$", sub)).map_err(|e| e.to_string())?;

                i = close + 1;
                let optional = chars.get(i) == Some(&'?');
                if optional {
                    i += 1;
                }
                if matches!(chars.get(i), Some('*' | '+' | '{')) {
                    return Err("repeated group".to_string());
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Group {
                    name,
                    matcher,
                    optional,
                });
            }
            c @ ('.' | '*' | '+' | '?' | '[' | ']' | '|' | '{' | '}' | ')' | '$' | '^') => {
                return Err(format!("'{}' outside a group", c));
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Index of the `)` closing the group opened at `open`
fn find_group_end(chars: &[char], open: usize) -> Result<usize, String> {
    let mut depth = 0;
    let mut in_class = false;
    let mut i = open;

    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }

    Err("unbalanced parentheses".to_string())
}

fn split_group_header(inner: &str) -> Result<(Option<String>, &str), String> {
    if let Some(rest) = inner.strip_prefix("?P<") {
        let (name, sub) = rest.split_once('>').ok_or("unterminated group name")?;
        return Ok((Some(name.to_string()), sub));
    }
    if inner.starts_with('?') {
        return Err("non-capturing or flag group".to_string());
    }
    Ok((None, inner))
}

/// Percent-encode a path value, keeping characters that are safe in a path
fn quote_path(value: &str) -> String {
    const SAFE: &str = "-._~!$&'()*+,;=:@/";
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || SAFE.as_bytes().contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(m: &PatternMatch, key: &str) -> Option<String> {
        m.kwargs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    #[test]
    fn test_anchored_match() {
        let p = UrlPattern::new(r"^messages/(?P<message_id>[0-9]+)$").unwrap();
        let m = p.search("messages/42").unwrap();
        assert_eq!(kw(&m, "message_id").as_deref(), Some("42"));
        assert!(m.args.is_empty());
        assert!(p.search("messages/abc").is_none());
        assert!(p.search("xmessages/42").is_none());
    }

    #[test]
    fn test_unanchored_pattern_matches_anywhere() {
        let p = UrlPattern::new(r"generate_204$").unwrap();
        assert!(p.search("generate_204").is_some());
        assert!(p.search("anything/before/generate_204").is_some());
        assert!(p.search("generate_204/after").is_none());
    }

    #[test]
    fn test_prefix_match_reports_end() {
        let p = UrlPattern::new(r"^api/v1/").unwrap();
        let m = p.search("api/v1/users/me").unwrap();
        assert_eq!(&"api/v1/users/me"[m.end..], "users/me");
    }

    #[test]
    fn test_positional_args_without_named_groups() {
        let p = UrlPattern::new(r"^accounts/login/social/(\w+)$").unwrap();
        let m = p.search("accounts/login/social/github").unwrap();
        assert_eq!(m.args, vec!["github".to_string()]);
        assert!(m.kwargs.is_empty());
    }

    #[test]
    fn test_optional_group_is_omitted() {
        let p = UrlPattern::new(r"^avatar/(?P<email>[\S]+)?").unwrap();
        let m = p.search("avatar/").unwrap();
        assert!(kw(&m, "email").is_none());
        let m = p.search("avatar/cordelia@example.com").unwrap();
        assert_eq!(kw(&m, "email").as_deref(), Some("cordelia@example.com"));
    }

    #[test]
    fn test_guard_rejects_prefixed_value() {
        let p = UrlPattern::new(r"^users/(?P<email>[^/]*)$")
            .unwrap()
            .with_guards(vec![(
                "email".to_string(),
                ParamGuard::NotPrefixed("me".to_string()),
            )]);
        assert!(p.search("users/me").is_none());
        assert!(p.search("users/meredith@example.com").is_none());
        assert!(p.search("users/iago@example.com").is_some());
    }

    #[test]
    fn test_emoji_name_rule() {
        let p = UrlPattern::new(r"^realm/emoji/(?P<emoji_name>[0-9a-zA-Z.\-_]*[0-9a-zA-Z])$")
            .unwrap();
        assert!(p.search("realm/emoji/green_tick").is_some());
        assert!(p.search("realm/emoji/a").is_some());
        assert!(p.search("realm/emoji/trailing_").is_none());
        assert!(p.search("realm/emoji/dot.").is_none());
        assert!(p.search("realm/emoji/").is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            UrlPattern::new(r"^broken(["),
            Err(RouteError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_reverse_literal_and_escapes() {
        let p = UrlPattern::new(r"^robots\.txt$").unwrap();
        assert_eq!(p.reverse(&[], &[]).as_deref(), Some("robots.txt"));
    }

    #[test]
    fn test_reverse_named_groups() {
        let p = UrlPattern::new(r"^accounts/password/reset/(?P<uidb64>[0-9A-Za-z]+)/(?P<token>.+)/$")
            .unwrap();
        assert_eq!(
            p.reverse(&[], &[("uidb64", "MQ"), ("token", "4ab-1f2")])
                .as_deref(),
            Some("accounts/password/reset/MQ/4ab-1f2/")
        );
        // Value that the group would not match
        assert!(p.reverse(&[], &[("uidb64", "M-Q"), ("token", "x")]).is_none());
        // Missing argument
        assert!(p.reverse(&[], &[("uidb64", "MQ")]).is_none());
        // Unknown extra argument
        assert!(
            p.reverse(&[], &[("uidb64", "MQ"), ("token", "t"), ("other", "x")])
                .is_none()
        );
    }

    #[test]
    fn test_reverse_positional_and_optional() {
        let social = UrlPattern::new(r"^accounts/login/social/(\w+)$").unwrap();
        assert_eq!(
            social.reverse(&["github"], &[]).as_deref(),
            Some("accounts/login/social/github")
        );
        assert!(social.reverse(&[], &[]).is_none());

        let avatar = UrlPattern::new(r"^avatar/(?P<email>[\S]+)?").unwrap();
        assert_eq!(avatar.reverse(&[], &[]).as_deref(), Some("avatar/"));
        assert_eq!(
            avatar.reverse(&[], &[("email", "a@b.c")]).as_deref(),
            Some("avatar/a@b.c")
        );
    }

    #[test]
    fn test_reverse_quotes_unsafe_characters() {
        let p = UrlPattern::new(r"^help/(?P<article>.*)$").unwrap();
        assert_eq!(
            p.reverse(&[], &[("article", "getting started")]).as_deref(),
            Some("help/getting%20started")
        );
    }

    #[test]
    fn test_unreversible_pattern() {
        let p = UrlPattern::new(r"^files/.*$").unwrap();
        assert!(p.reverse(&[], &[]).is_none());
        assert!(matches!(
            p.reverse_error(),
            Some(RouteError::NotReversible { .. })
        ));
    }
}
