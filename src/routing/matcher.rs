//! Route template compilation and matching.
//!
//! # Responsibilities
//! - Compile path templates (`/users/{id}`, `/api/{proxy+}`) into anchored regexes
//! - Match the request method, honouring the `ANY` wildcard
//! - Extract and percent-decode path parameters
//!
//! # Design Decisions
//! - Literal segments are regex-escaped, so templates never inject pattern syntax
//! - Capture group `i` always belongs to `param_names[i]`
//! - `{name}` needs at least one non-`/` character; `{name+}` may match nothing
//! - Parameters span a whole segment (no `file.{ext}` style partials)

use std::collections::HashMap;
use std::fmt;

use axum::http::Method;
use regex::Regex;
use thiserror::Error;

/// Errors raised while compiling a route template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A segment opens a parameter without closing it.
    #[error("unclosed parameter in segment '{segment}' of template '{template}'")]
    UnclosedParameter { template: String, segment: String },

    /// A segment mixes literal text with a parameter.
    #[error("parameter must span the whole segment '{segment}' in template '{template}'")]
    PartialSegment { template: String, segment: String },

    /// `{}` or `{+}`.
    #[error("empty parameter name in template '{0}'")]
    EmptyParameter(String),

    /// The same name was captured twice.
    #[error("duplicate parameter '{name}' in template '{template}'")]
    DuplicateParameter { template: String, name: String },

    /// A greedy `{name+}` parameter is followed by more segments.
    #[error("greedy parameter '{name}' must be the last segment of template '{template}'")]
    GreedyNotLast { template: String, name: String },

    /// Templates are absolute paths.
    #[error("template '{0}' must start with '/'")]
    NotAbsolute(String),

    /// The HTTP method is not a valid token.
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    /// The generated expression failed to compile.
    #[error("failed to compile template '{template}': {reason}")]
    Regex { template: String, reason: String },
}

/// Method filter of a route: one verb, or every verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    Any,
    Exact(Method),
}

impl RouteMethod {
    /// Parse a configured method. `ANY` and `*` are wildcards, case-insensitive.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let upper = raw.trim().to_ascii_uppercase();
        if upper == "ANY" || upper == "*" {
            return Ok(RouteMethod::Any);
        }
        Method::from_bytes(upper.as_bytes())
            .map(RouteMethod::Exact)
            .map_err(|_| RouteError::InvalidMethod(raw.to_string()))
    }

    /// Returns true if the request method passes this filter.
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            RouteMethod::Any => true,
            RouteMethod::Exact(expected) => expected == method,
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMethod::Any => f.write_str("ANY"),
            RouteMethod::Exact(method) => write!(f, "{}", method),
        }
    }
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    raw: String,
    pattern: Regex,
    param_names: Vec<String>,
}

impl RouteTemplate {
    /// Compile a template into an anchored expression.
    pub fn compile(template: &str) -> Result<Self, RouteError> {
        if !template.starts_with('/') {
            return Err(RouteError::NotAbsolute(template.to_string()));
        }

        let segments: Vec<&str> = template.split('/').collect();
        let mut pieces = Vec::with_capacity(segments.len());
        let mut param_names: Vec<String> = Vec::new();

        for (index, segment) in segments.iter().enumerate() {
            if !segment.contains('{') && !segment.contains('}') {
                pieces.push(regex::escape(segment));
                continue;
            }

            if !segment.starts_with('{') || !segment.contains('}') {
                return Err(if segment.contains('}') {
                    RouteError::PartialSegment {
                        template: template.to_string(),
                        segment: segment.to_string(),
                    }
                } else {
                    RouteError::UnclosedParameter {
                        template: template.to_string(),
                        segment: segment.to_string(),
                    }
                });
            }
            if !segment.ends_with('}') {
                return Err(RouteError::PartialSegment {
                    template: template.to_string(),
                    segment: segment.to_string(),
                });
            }

            let inner = &segment[1..segment.len() - 1];
            let (name, greedy) = match inner.strip_suffix('+') {
                Some(name) => (name, true),
                None => (inner, false),
            };
            if name.is_empty() {
                return Err(RouteError::EmptyParameter(template.to_string()));
            }
            if name.contains('{') || name.contains('}') {
                return Err(RouteError::PartialSegment {
                    template: template.to_string(),
                    segment: segment.to_string(),
                });
            }
            if param_names.iter().any(|existing| existing == name) {
                return Err(RouteError::DuplicateParameter {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
            if greedy && index != segments.len() - 1 {
                return Err(RouteError::GreedyNotLast {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }

            param_names.push(name.to_string());
            pieces.push(if greedy { "(.*)" } else { "([^/]+)" }.to_string());
        }

        let expression = format!("^{}$", pieces.join("/"));
        let pattern = Regex::new(&expression).map_err(|e| RouteError::Regex {
            template: template.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            raw: template.to_string(),
            pattern,
            param_names,
        })
    }

    /// The template as written in configuration.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parameter names in capture-group order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Returns true if the path matches, without extracting parameters.
    pub fn is_match(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    /// Match a path and return its decoded parameters.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(path)?;
        let params = self
            .param_names
            .iter()
            .zip(captures.iter().skip(1))
            .map(|(name, value)| {
                let raw = value.map(|m| m.as_str()).unwrap_or_default();
                (name.clone(), decode_segment(raw))
            })
            .collect();
        Some(params)
    }
}

/// Percent-decode a captured value, keeping the raw text if it is not valid UTF-8.
fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_template_matches_exactly() {
        let template = RouteTemplate::compile("/health/live").unwrap();
        let params = template.captures("/health/live").unwrap();
        assert!(params.is_empty());
        assert!(template.captures("/health/live/extra").is_none());
        assert!(template.captures("/health").is_none());
    }

    #[test]
    fn literal_segments_are_escaped() {
        let template = RouteTemplate::compile("/v1.0/items").unwrap();
        assert!(template.is_match("/v1.0/items"));
        assert!(!template.is_match("/v1x0/items"));
    }

    #[test]
    fn single_segment_parameter() {
        let template = RouteTemplate::compile("/users/{id}").unwrap();
        let params = template.captures("/users/123").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("123"));
        assert!(template.captures("/users/123/posts").is_none());
        assert!(template.captures("/users/").is_none());
    }

    #[test]
    fn greedy_parameter_takes_the_rest() {
        let template = RouteTemplate::compile("/api/{proxy+}").unwrap();
        let params = template.captures("/api/a/b/c").unwrap();
        assert_eq!(params["proxy"], "a/b/c");

        let params = template.captures("/api/").unwrap();
        assert_eq!(params["proxy"], "");
    }

    #[test]
    fn captured_values_are_percent_decoded() {
        let template = RouteTemplate::compile("/files/{name}").unwrap();
        let params = template.captures("/files/my%20file.txt").unwrap();
        assert_eq!(params["name"], "my file.txt");
    }

    #[test]
    fn parameter_order_follows_the_template() {
        let template = RouteTemplate::compile("/orgs/{org}/repos/{repo}").unwrap();
        assert_eq!(template.param_names(), ["org", "repo"]);
        let params = template.captures("/orgs/acme/repos/gateway").unwrap();
        assert_eq!(params["org"], "acme");
        assert_eq!(params["repo"], "gateway");
    }

    #[test]
    fn hyphenated_parameter_names_are_allowed() {
        let template = RouteTemplate::compile("/items/{item-id}").unwrap();
        assert_eq!(template.captures("/items/9").unwrap()["item-id"], "9");
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(matches!(
            RouteTemplate::compile("/users/{id"),
            Err(RouteError::UnclosedParameter { .. })
        ));
        assert!(matches!(
            RouteTemplate::compile("/files/{name}.txt"),
            Err(RouteError::PartialSegment { .. })
        ));
        assert!(matches!(
            RouteTemplate::compile("/a/{}"),
            Err(RouteError::EmptyParameter(_))
        ));
        assert!(matches!(
            RouteTemplate::compile("/{proxy+}/tail"),
            Err(RouteError::GreedyNotLast { .. })
        ));
        assert!(matches!(
            RouteTemplate::compile("/{id}/{id}"),
            Err(RouteError::DuplicateParameter { .. })
        ));
        assert!(matches!(
            RouteTemplate::compile("users"),
            Err(RouteError::NotAbsolute(_))
        ));
    }

    #[test]
    fn method_filter() {
        let any = RouteMethod::parse("any").unwrap();
        assert!(any.matches(&Method::GET));
        assert!(any.matches(&Method::DELETE));

        let get = RouteMethod::parse("get").unwrap();
        assert!(get.matches(&Method::GET));
        assert!(!get.matches(&Method::POST));
        assert_eq!(get.to_string(), "GET");
    }
}
