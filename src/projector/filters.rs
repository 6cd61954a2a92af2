//! Annotation-driven HTTPRoute filters
//!
//! Filters are evaluated in a fixed order with mutual exclusion: ssl-redirect
//! wins over app-root, which wins over rewrite-target. A rule that redirects
//! carries no backend refs; the caller uses the return value of
//! [`apply_filters`] to enforce that.

use lazy_static::lazy_static;
use regex::Regex;

use crate::annotations::{AnnotationSet, APP_ROOT, REWRITE_TARGET};
use crate::api::{
    HttpPathModifier, HttpRequestRedirectFilter, HttpRouteFilter, HttpRouteRule,
    HttpUrlRewriteFilter, PathMatchType, PathModifierType,
};

lazy_static! {
    static ref CAPTURE_GROUP_REF: Regex = Regex::new(r"\$\d+").expect("static pattern");
}

/// Apply all annotation-based filters to a rule. Returns true when a redirect
/// filter was emitted, in which case no backend refs may be attached.
pub(crate) fn apply_filters(
    rule: &mut HttpRouteRule,
    annots: &AnnotationSet<'_>,
    original_path: &str,
) -> bool {
    if annots.has_ssl_redirect() {
        add_ssl_redirect(rule);
        return true;
    }

    if annots.has_app_root() && add_app_root_redirect(rule, annots) {
        return true;
    }

    if annots.has_rewrite() {
        add_rewrite_filter(rule, annots, original_path);
    }

    false
}

/// Permanent redirect of plain HTTP to HTTPS.
fn add_ssl_redirect(rule: &mut HttpRouteRule) {
    let filter = HttpRouteFilter::RequestRedirect {
        request_redirect: HttpRequestRedirectFilter {
            scheme: Some("https".to_string()),
            status_code: Some(301),
            ..Default::default()
        },
    };
    rule.filters.get_or_insert_with(Vec::new).push(filter);
}

/// Temporary redirect of the root path to the configured application root.
/// Applies only to rules matching literally `/`; returns whether it fired.
fn add_app_root_redirect(rule: &mut HttpRouteRule, annots: &AnnotationSet<'_>) -> bool {
    let Some(app_root) = annots.get(APP_ROOT) else {
        return false;
    };

    let targets_root = rule
        .matches
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|m| {
            m.path
                .as_ref()
                .and_then(|p| p.value.as_deref())
                .map(|v| v == "/")
                .unwrap_or(false)
        });
    if !targets_root {
        return false;
    }

    let filter = HttpRouteFilter::RequestRedirect {
        request_redirect: HttpRequestRedirectFilter {
            path: Some(HttpPathModifier {
                modifier_type: PathModifierType::ReplaceFullPath,
                replace_full_path: Some(app_root.to_string()),
                replace_prefix_match: None,
            }),
            status_code: Some(302),
            ..Default::default()
        },
    };
    rule.filters.get_or_insert_with(Vec::new).push(filter);
    true
}

/// URL rewrite from the rewrite-target annotation. nginx capture-group
/// references cannot be expressed in Gateway API path modifiers, so targets
/// containing them are scrubbed to a best-effort prefix replacement, and a
/// regex path match is downgraded to its longest literal prefix so the
/// prefix replacement has something to anchor on.
fn add_rewrite_filter(rule: &mut HttpRouteRule, annots: &AnnotationSet<'_>, original_path: &str) {
    let Some(target) = annots.get(REWRITE_TARGET) else {
        return;
    };

    let path = if contains_capture_groups(target) {
        HttpPathModifier {
            modifier_type: PathModifierType::ReplacePrefixMatch,
            replace_full_path: None,
            replace_prefix_match: Some(scrub_capture_groups(target)),
        }
    } else if target == "/" {
        HttpPathModifier {
            modifier_type: PathModifierType::ReplacePrefixMatch,
            replace_full_path: None,
            replace_prefix_match: Some("/".to_string()),
        }
    } else {
        HttpPathModifier {
            modifier_type: PathModifierType::ReplaceFullPath,
            replace_full_path: Some(target.to_string()),
            replace_prefix_match: None,
        }
    };

    let filter = HttpRouteFilter::URLRewrite {
        url_rewrite: HttpUrlRewriteFilter {
            hostname: None,
            path: Some(path),
        },
    };
    rule.filters.get_or_insert_with(Vec::new).push(filter);

    if original_path.contains('(') {
        downgrade_to_static_prefix(rule, original_path);
    }
}

/// Replace a regex path match by a PathPrefix match on the longest literal
/// prefix of the pattern.
fn downgrade_to_static_prefix(rule: &mut HttpRouteRule, original_path: &str) {
    let prefix = extract_static_prefix(original_path);
    for m in rule.matches.get_or_insert_with(Vec::new).iter_mut() {
        if let Some(path) = m.path.as_mut() {
            path.match_type = Some(PathMatchType::PathPrefix);
            path.value = Some(prefix.clone());
        }
    }
}

/// Whether a rewrite target references positional capture groups (`$1`...).
pub(crate) fn contains_capture_groups(target: &str) -> bool {
    CAPTURE_GROUP_REF.is_match(target)
}

/// Best-effort scrub of capture-group references from a rewrite target.
/// `$1` and `/$1` collapse to `/`; otherwise the references are stripped and
/// doubled slashes folded.
pub(crate) fn scrub_capture_groups(target: &str) -> String {
    if target == "/$1" || target == "$1" {
        return "/".to_string();
    }

    let mut scrubbed = CAPTURE_GROUP_REF.replace_all(target, "").into_owned();
    while scrubbed.contains("//") {
        scrubbed = scrubbed.replace("//", "/");
    }
    if scrubbed.is_empty() {
        return "/".to_string();
    }
    scrubbed
}

/// Longest literal prefix of a regex path: everything before the first regex
/// metacharacter. Empty prefixes fall back to `/`.
pub(crate) fn extract_static_prefix(path: &str) -> String {
    let cut = path
        .find(|c| matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '*' | '+' | '?' | '^' | '$' | '|' | '\\'))
        .unwrap_or(path.len());
    let prefix = &path[..cut];
    if prefix.is_empty() {
        return "/".to_string();
    }
    prefix.to_string()
}
