//! Route pattern compilation
//!
//! Patterns are split on `/` into literal and parameter segments:
//!
//! - `users` matches the literal text, case-sensitively
//! - `:id` is a required parameter
//! - `:year?` is an optional parameter, allowed only as the last segment
//! - `*` captures the remaining segments (zero or more), only as the last segment
//!
//! Domain patterns work the same way on `.`-separated host labels.

use crate::route_constraint::{RegexConstraint, RouteConstraint};
use crate::route_params::{Params, WILDCARD_PARAM};
use crate::{Error, Result};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Path segments stored inline while splitting a request path.
pub const INLINE_SEGMENT_COUNT: usize = 16;

/// A constraint as registered, before commit compiles it.
#[derive(Clone)]
pub(crate) enum ConstraintSpec {
    Regex(String),
    Custom(Arc<dyn RouteConstraint>),
}

impl ConstraintSpec {
    fn compile(&self, pattern: &str, param: &str) -> Result<Arc<dyn RouteConstraint>> {
        match self {
            ConstraintSpec::Regex(source) => RegexConstraint::new(source)
                .map(|constraint| Arc::new(constraint) as Arc<dyn RouteConstraint>)
                .map_err(|e| {
                    Error::invalid_pattern(pattern, format!("constraint for '{}': {}", param, e))
                }),
            ConstraintSpec::Custom(constraint) => Ok(constraint.clone()),
        }
    }
}

/// One compiled path segment.
#[derive(Clone)]
pub enum Segment {
    Literal(String),
    Param {
        name: String,
        optional: bool,
        constraint: Option<Arc<dyn RouteConstraint>>,
    },
    Wildcard,
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(text) => write!(f, "Literal({:?})", text),
            Segment::Param {
                name,
                optional,
                constraint,
            } => f
                .debug_struct("Param")
                .field("name", name)
                .field("optional", optional)
                .field("constraint", &constraint.as_ref().map(|c| c.description()))
                .finish(),
            Segment::Wildcard => f.write_str("Wildcard"),
        }
    }
}

/// A validated, pre-split URL pattern.
#[derive(Clone, Debug)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile a pattern without constraints.
    pub fn parse(pattern: &str) -> Result<Self> {
        Self::compile(pattern, &[])
    }

    pub(crate) fn compile(pattern: &str, constraints: &[(String, ConstraintSpec)]) -> Result<Self> {
        let raw: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());
        let mut seen: Vec<&str> = Vec::new();

        for (index, text) in raw.iter().enumerate() {
            let last = index + 1 == raw.len();

            if *text == "*" {
                if !last {
                    return Err(Error::invalid_pattern(pattern, "wildcard must be the last segment"));
                }
                segments.push(Segment::Wildcard);
                continue;
            }

            let Some(param) = text.strip_prefix(':') else {
                segments.push(Segment::Literal((*text).to_string()));
                continue;
            };

            let (name, optional) = match param.strip_suffix('?') {
                Some(name) => (name, true),
                None => (param, false),
            };
            if !is_valid_name(name) {
                return Err(Error::invalid_pattern(
                    pattern,
                    format!("invalid parameter name '{}'", name),
                ));
            }
            if optional && !last {
                return Err(Error::invalid_pattern(
                    pattern,
                    format!("optional parameter '{}' must be the last segment", name),
                ));
            }
            if seen.contains(&name) {
                return Err(Error::invalid_pattern(
                    pattern,
                    format!("duplicate parameter '{}'", name),
                ));
            }
            seen.push(name);

            let constraint = constraints
                .iter()
                .rfind(|(param, _)| param == name)
                .map(|(_, spec)| spec.compile(pattern, name))
                .transpose()?;

            segments.push(Segment::Param {
                name: name.to_string(),
                optional,
                constraint,
            });
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the declared parameters; the wildcard reports as `*`.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param { name, .. } => Some(name.as_str()),
            Segment::Wildcard => Some(WILDCARD_PARAM),
            Segment::Literal(_) => None,
        })
    }

    /// Match pre-split request segments, filling `params` on success.
    pub(crate) fn matches(&self, parts: &[&str], params: &mut Params) -> bool {
        let mut index = 0;

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    if parts.get(index) != Some(&text.as_str()) {
                        return false;
                    }
                    index += 1;
                }
                Segment::Param {
                    name,
                    optional,
                    constraint,
                } => match parts.get(index) {
                    Some(raw) => {
                        let Some(value) = decode(raw) else {
                            return false;
                        };
                        if let Some(constraint) = constraint {
                            if constraint.validate(&value).is_err() {
                                return false;
                            }
                        }
                        params.insert(name.as_str(), value);
                        index += 1;
                    }
                    None if *optional => {}
                    None => return false,
                },
                Segment::Wildcard => {
                    let rest: Option<Vec<String>> = parts[index..].iter().map(|p| decode(p)).collect();
                    let Some(rest) = rest else {
                        return false;
                    };
                    params.insert(WILDCARD_PARAM, rest.join("/"));
                    index = parts.len();
                }
            }
        }

        index == parts.len()
    }

    /// Substitute parameters back into the pattern, percent-encoding values.
    pub(crate) fn build(&self, route: &str, params: &Params) -> Result<String> {
        let mut url = String::with_capacity(self.source.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    url.push('/');
                    url.push_str(text);
                }
                Segment::Param { name, optional, .. } => match params.get(name) {
                    Some(value) if !value.is_empty() => {
                        url.push('/');
                        url.push_str(&urlencoding::encode(value));
                    }
                    _ if *optional => {}
                    _ => {
                        return Err(Error::MissingRouteParam {
                            route: route.to_string(),
                            param: name.clone(),
                        });
                    }
                },
                Segment::Wildcard => {
                    let rest = params.wildcard().unwrap_or_default();
                    for part in rest.split('/').filter(|p| !p.is_empty()) {
                        url.push('/');
                        url.push_str(&urlencoding::encode(part));
                    }
                }
            }
        }

        if url.is_empty() {
            url.push('/');
        }
        Ok(url)
    }
}

#[derive(Clone)]
enum DomainLabel {
    Literal(String),
    Param {
        name: String,
        constraint: Option<Arc<dyn RouteConstraint>>,
    },
}

/// A host pattern such as `:tenant.example.com`.
#[derive(Clone)]
pub struct DomainPattern {
    source: String,
    labels: Vec<DomainLabel>,
}

impl DomainPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        Self::compile(pattern, &[])
    }

    pub(crate) fn compile(pattern: &str, constraints: &[(String, ConstraintSpec)]) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::invalid_pattern(pattern, "empty domain"));
        }

        let mut labels = Vec::new();
        for label in pattern.split('.') {
            if label.is_empty() {
                return Err(Error::invalid_pattern(pattern, "empty domain label"));
            }
            match label.strip_prefix(':') {
                Some(name) if is_valid_name(name) => {
                    let constraint = constraints
                        .iter()
                        .rfind(|(param, _)| param == name)
                        .map(|(_, spec)| spec.compile(pattern, name))
                        .transpose()?;
                    labels.push(DomainLabel::Param {
                        name: name.to_string(),
                        constraint,
                    });
                }
                Some(name) => {
                    return Err(Error::invalid_pattern(
                        pattern,
                        format!("invalid parameter name '{}'", name),
                    ));
                }
                None => labels.push(DomainLabel::Literal(label.to_ascii_lowercase())),
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            labels,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().filter_map(|label| match label {
            DomainLabel::Param { name, .. } => Some(name.as_str()),
            DomainLabel::Literal(_) => None,
        })
    }

    /// Match a `Host` value (an optional `:port` suffix is ignored).
    pub(crate) fn matches(&self, host: &str, params: &mut Params) -> bool {
        let host = strip_port(host);
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() != self.labels.len() {
            return false;
        }

        for (label, part) in self.labels.iter().zip(parts) {
            match label {
                DomainLabel::Literal(text) => {
                    if !text.eq_ignore_ascii_case(part) {
                        return false;
                    }
                }
                DomainLabel::Param { name, constraint } => {
                    if part.is_empty() {
                        return false;
                    }
                    if let Some(constraint) = constraint {
                        if constraint.validate(part).is_err() {
                            return false;
                        }
                    }
                    params.insert(name.as_str(), part.to_ascii_lowercase());
                }
            }
        }
        true
    }
}

impl fmt::Debug for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DomainPattern").field(&self.source).finish()
    }
}

/// Split a request path into non-empty segments, ignoring query and fragment.
pub(crate) fn split_path(url: &str) -> SmallVec<[&str; INLINE_SEGMENT_COUNT]> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join path pieces with `/`, collapsing duplicate and trailing slashes.
pub(crate) fn join_paths<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut joined = String::new();
    for piece in parts {
        for segment in piece.split('/').filter(|s| !s.is_empty()) {
            joined.push('/');
            joined.push_str(segment);
        }
    }
    if joined.is_empty() {
        joined.push('/');
    }
    joined
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn decode(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(Cow::into_owned)
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_path(pattern: &str, path: &str) -> Option<Params> {
        let pattern = RoutePattern::parse(pattern).unwrap();
        let mut params = Params::new();
        pattern
            .matches(&split_path(path), &mut params)
            .then_some(params)
    }

    #[test]
    fn test_static_match() {
        assert!(match_path("/users", "/users").unwrap().is_empty());
        assert!(match_path("/users", "/users/").is_some());
        assert!(match_path("/users", "/Users").is_none());
        assert!(match_path("/", "/").is_some());
    }

    #[test]
    fn test_params_are_extracted() {
        let params = match_path("/posts/:id/comments/:commentId", "/posts/42/comments/7").unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("commentId"), Some("7"));
    }

    #[test]
    fn test_params_are_decoded() {
        let params = match_path("/files/:name", "/files/hello%20world").unwrap();
        assert_eq!(params.get("name"), Some("hello world"));
    }

    #[test]
    fn test_query_string_is_ignored() {
        let params = match_path("/search/:term", "/search/rust?page=2").unwrap();
        assert_eq!(params.get("term"), Some("rust"));
    }

    #[test]
    fn test_optional_trailing_param() {
        assert!(match_path("/archive/:year?", "/archive").unwrap().is_empty());
        let params = match_path("/archive/:year?", "/archive/2024").unwrap();
        assert_eq!(params.get("year"), Some("2024"));
        assert!(match_path("/archive/:year?", "/archive/2024/05").is_none());
    }

    #[test]
    fn test_wildcard() {
        let params = match_path("/assets/*", "/assets/css/site.css").unwrap();
        assert_eq!(params.wildcard(), Some("css/site.css"));
        let params = match_path("/assets/*", "/assets").unwrap();
        assert_eq!(params.wildcard(), Some(""));
    }

    #[test]
    fn test_invalid_patterns() {
        for pattern in ["/a/*/b", "/:year?/posts", "/:", "/:id/:id", "/:bad-name"] {
            assert!(
                matches!(RoutePattern::parse(pattern), Err(Error::InvalidPattern { .. })),
                "{} should be rejected",
                pattern
            );
        }
    }

    #[test]
    fn test_bad_constraint_regex() {
        let constraints = vec![("id".to_string(), ConstraintSpec::Regex("(".to_string()))];
        assert!(matches!(
            RoutePattern::compile("/users/:id", &constraints),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_build() {
        let pattern = RoutePattern::parse("/posts/:id/comments/:commentId?").unwrap();
        let params: Params = [("id", "hello world")].into_iter().collect();
        assert_eq!(pattern.build("comments", &params).unwrap(), "/posts/hello%20world/comments");

        let err = pattern.build("comments", &Params::new()).unwrap_err();
        assert!(matches!(err, Error::MissingRouteParam { ref param, .. } if param == "id"));
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths(["/api/", "/v1", "users/"]), "/api/v1/users");
        assert_eq!(join_paths(["", "/"]), "/");
        assert_eq!(join_paths(["api//v1", ":id"]), "/api/v1/:id");
    }

    #[test]
    fn test_domain_pattern() {
        let domain = DomainPattern::parse(":tenant.example.com").unwrap();
        let mut params = Params::new();
        assert!(domain.matches("Acme.Example.com:8080", &mut params));
        assert_eq!(params.get("tenant"), Some("acme"));

        let mut params = Params::new();
        assert!(!domain.matches("example.com", &mut params));
        assert!(DomainPattern::parse("a..com").is_err());
    }
}
