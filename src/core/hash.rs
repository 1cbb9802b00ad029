//! # Hash Grammar
//!
//! Converts between a raw location fragment and a [`StructuredHash`].
//!
//! ```text
//! #<semanticObject>-<action>(~<context>)?(?<key>=<value>(&<key>=<value>)*)?(&/<appSpecificRoute>)?
//!  └──────────────────── shell part ─────────────────────────────────────┘ └──── app route ─────┘
//! ```
//!
//! Everything here is pure. Parameters are percent-decoded on the way in and
//! percent-encoded (the `encodeURIComponent` set) on the way out, and are kept
//! in a sorted map so that `construct` always emits the same canonical text.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use serde::Serialize;

/// Leading marker of a location fragment.
pub const FRAGMENT_MARKER: char = '#';

/// Reserved two-character delimiter that opens the app-specific route.
pub const APP_ROUTE_DELIMITER: &str = "&/";

/// Parameters attached to the shell part, sorted by name.
pub type Params = BTreeMap<String, String>;

/// Characters left untouched by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn shell_part_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(([A-Za-z0-9_/]+)-([A-Za-z0-9_/\-]+)(~([A-Za-z0-9=+/]+))?)?([?](.*))?$")
            .unwrap_or_else(|e| panic!("shell part grammar does not compile: {e}"))
    })
}

// ============================================================================
// Types
// ============================================================================

/// The shell part of a fragment could not be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrammarError {
    pub fragment: String,
    pub reason: String,
}

impl GrammarError {
    fn new(fragment: &str, reason: impl Into<String>) -> Self {
        Self {
            fragment: fragment.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse fragment '{}': {}", self.fragment, self.reason)
    }
}

impl std::error::Error for GrammarError {}

/// Parsed representation of a fragment. Immutable value; a fresh one is
/// produced for every comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuredHash {
    /// Router-owned segment: target plus parameters, still encoded.
    pub shell_part: Option<String>,
    /// Application-owned segment, always starting with [`APP_ROUTE_DELIMITER`].
    pub app_specific_route: Option<String>,
    /// `semanticObject-action(~context)`; `None` unless both halves are present.
    pub intent: Option<String>,
    /// Decoded parameters; `None` when there are none.
    pub params: Option<Params>,
    pub semantic_object: Option<String>,
    pub action: Option<String>,
    pub context_raw: Option<String>,
}

impl StructuredHash {
    /// A hash addressing `semantic_object-action` with no parameters.
    pub fn for_target(semantic_object: &str, action: &str) -> Self {
        Self {
            shell_part: Some(intent_of(semantic_object, action, None)),
            intent: Some(intent_of(semantic_object, action, None)),
            semantic_object: Some(semantic_object.to_string()),
            action: Some(action.to_string()),
            ..Default::default()
        }
    }

    /// Returns a copy carrying `params` (an empty map clears them).
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = (!params.is_empty()).then_some(params);
        self.shell_part = non_empty(construct_shell_part(&self));
        self
    }

    /// Returns a copy with the app-specific route replaced.
    pub fn with_app_route(mut self, route: Option<&str>) -> Self {
        self.app_specific_route = route.map(ensure_app_route_delimiter);
        self
    }

    /// Parameters as a map, empty when absent.
    pub fn params_or_empty(&self) -> Params {
        self.params.clone().unwrap_or_default()
    }

    /// The app-specific route without its leading delimiter.
    pub fn app_route_stripped(&self) -> Option<String> {
        strip_app_route_delimiter(self.app_specific_route.as_deref())
    }

    /// Treats a fragment the grammar rejected as an opaque old value: its raw
    /// text becomes the shell part and nothing else is known about it.
    pub fn unstructured(fragment: &str) -> Self {
        Self {
            shell_part: non_empty(strip_leading_marker(fragment).to_string()),
            ..Default::default()
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a fragment (with or without its leading marker).
///
/// An empty fragment is not an error: it yields a hash with every field `None`.
pub fn parse(fragment: &str) -> Result<StructuredHash, GrammarError> {
    let stripped = strip_leading_marker(fragment);
    if stripped.is_empty() {
        return Ok(StructuredHash::default());
    }

    let (shell, app_route) = split_app_route(stripped);
    let caps = shell_part_re().captures(shell).ok_or_else(|| {
        GrammarError::new(fragment, "expected '<semanticObject>-<action>' optionally followed by '~<context>' and '?<parameters>'")
    })?;

    let semantic_object = caps.get(2).map(|m| m.as_str().to_string());
    let action = caps.get(3).map(|m| m.as_str().to_string());
    let context_raw = caps.get(5).map(|m| m.as_str().to_string());
    let params = caps
        .get(7)
        .map(|m| parse_params(m.as_str()))
        .filter(|p| !p.is_empty());

    let intent = match (&semantic_object, &action) {
        (Some(so), Some(action)) => Some(intent_of(so, action, context_raw.as_deref())),
        _ => None,
    };

    Ok(StructuredHash {
        shell_part: non_empty(shell.to_string()),
        app_specific_route: app_route.map(str::to_string),
        intent,
        params,
        semantic_object,
        action,
        context_raw,
    })
}

/// Splits `shell&/route` at the first delimiter. The route keeps its delimiter.
pub fn split_app_route(fragment: &str) -> (&str, Option<&str>) {
    match fragment.find(APP_ROUTE_DELIMITER) {
        Some(idx) => (&fragment[..idx], Some(&fragment[idx..])),
        None => (fragment, None),
    }
}

fn parse_params(query: &str) -> Params {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode(key), decode(value)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

// ============================================================================
// Construction
// ============================================================================

/// Builds the fragment text (without the leading marker) for `hash`.
pub fn construct(hash: &StructuredHash) -> String {
    let mut out = construct_shell_part(hash);
    if let Some(route) = &hash.app_specific_route {
        out.push_str(&ensure_app_route_delimiter(route));
    }
    out
}

fn construct_shell_part(hash: &StructuredHash) -> String {
    let mut out = String::new();
    if let (Some(so), Some(action)) = (&hash.semantic_object, &hash.action) {
        out.push_str(&intent_of(so, action, hash.context_raw.as_deref()));
    }
    if let Some(params) = hash.params.as_ref().filter(|p| !p.is_empty()) {
        out.push('?');
        out.push_str(&params_to_query(params));
    }
    out
}

/// Encodes parameters as `k=v&k2=v2` in key order.
pub fn params_to_query(params: &Params) -> String {
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, COMPONENT),
                utf8_percent_encode(value, COMPONENT)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// Helpers
// ============================================================================

/// Appends `app_route` (delimiter added when missing) to a shell part.
pub fn join_app_route(shell_part: &str, app_route: Option<&str>) -> String {
    match app_route {
        Some(route) => format!("{shell_part}{}", ensure_app_route_delimiter(route)),
        None => shell_part.to_string(),
    }
}

/// Drops a leading [`FRAGMENT_MARKER`], if any.
pub fn strip_leading_marker(s: &str) -> &str {
    s.strip_prefix(FRAGMENT_MARKER).unwrap_or(s)
}

/// Drops the leading [`APP_ROUTE_DELIMITER`] of an app route.
pub fn strip_app_route_delimiter(route: Option<&str>) -> Option<String> {
    route.map(|r| r.strip_prefix(APP_ROUTE_DELIMITER).unwrap_or(r).to_string())
}

fn ensure_app_route_delimiter(route: &str) -> String {
    if route.starts_with(APP_ROUTE_DELIMITER) {
        route.to_string()
    } else {
        format!("{APP_ROUTE_DELIMITER}{route}")
    }
}

fn intent_of(semantic_object: &str, action: &str, context_raw: Option<&str>) -> String {
    match context_raw {
        Some(ctx) => format!("{semantic_object}-{action}~{ctx}"),
        None => format!("{semantic_object}-{action}"),
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
