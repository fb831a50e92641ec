//! URI pattern matching and value extraction.
//!
//! # Responsibilities
//! - Match a router-relative path against a bare operation name
//! - Compile `{name}` templates into an anchored regex
//! - Extract named raw values from the query string or the template captures
//!
//! # Design Decisions
//! - Bare names compare case-insensitively and ignore the query string
//! - Templates are compiled once at registration; literal text is escaped
//! - Placeholders become non-greedy groups, so one regex both matches and extracts
//! - Captured values are percent-decoded; query values use form decoding

use std::borrow::Cow;
use std::collections::HashSet;

use regex::Regex;
use thiserror::Error;

/// Error compiling a URI template.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("unclosed placeholder in template '{0}'")]
    Unclosed(String),
    #[error("empty placeholder in template '{0}'")]
    Empty(String),
    #[error("invalid template regex: {0}")]
    Regex(#[from] regex::Error),
}

/// Ordered raw name/value pairs extracted from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedValues {
    pairs: Vec<(String, String)>,
}

impl ExtractedValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query.
    pub fn from_query(query: &str) -> Self {
        Self {
            pairs: url::form_urlencoded::parse(query.as_bytes())
                .map(|(name, value)| (name.into_owned(), value.into_owned()))
                .collect(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// First value under `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Distinct names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.pairs
            .iter()
            .filter(|(key, _)| seen.insert(key.to_ascii_lowercase()))
            .map(|(key, _)| key.as_str())
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Compiled routing pattern of one descriptor.
#[derive(Debug, Clone)]
pub enum UriPattern {
    /// Matches the operation name; arguments come from the query string.
    BareName(String),
    /// Matches a `{name}` template; arguments come from the captures.
    Template {
        template: String,
        names: Vec<String>,
        regex: Regex,
    },
}

impl UriPattern {
    pub fn bare(name: impl Into<String>) -> Self {
        UriPattern::BareName(name.into())
    }

    pub fn template(template: &str) -> Result<Self, PatternError> {
        let mut expression = String::from("^");
        let mut names = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            expression.push_str(&regex::escape(&rest[..open]));
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| PatternError::Unclosed(template.to_owned()))?;
            let name = &after[..close];
            if name.is_empty() || name.contains('{') {
                return Err(PatternError::Empty(template.to_owned()));
            }
            names.push(name.to_owned());
            expression.push_str("(.*?)");
            rest = &after[close + 1..];
        }
        expression.push_str(&regex::escape(rest));
        expression.push('$');

        Ok(UriPattern::Template {
            template: template.to_owned(),
            names,
            regex: Regex::new(&expression)?,
        })
    }

    /// Whether the router-relative `uri` is claimed by this pattern.
    pub fn is_match(&self, uri: &str) -> bool {
        match self {
            UriPattern::BareName(name) => path_part(uri).eq_ignore_ascii_case(name),
            UriPattern::Template { regex, .. } => regex.is_match(uri),
        }
    }

    /// Extract raw values. Yields one pair per placeholder, in template order.
    pub fn extract(&self, uri: &str) -> ExtractedValues {
        match self {
            UriPattern::BareName(_) => match uri.split_once('?') {
                Some((_, query)) => ExtractedValues::from_query(query),
                None => ExtractedValues::new(),
            },
            UriPattern::Template { names, regex, .. } => {
                let mut values = ExtractedValues::new();
                if let Some(captures) = regex.captures(uri) {
                    for (name, capture) in names.iter().zip(captures.iter().skip(1)) {
                        let raw = capture.map(|m| m.as_str()).unwrap_or_default();
                        values.push(name.as_str(), percent_decode(raw));
                    }
                }
                values
            }
        }
    }

    /// The declared template, if any.
    pub fn template_str(&self) -> Option<&str> {
        match self {
            UriPattern::BareName(_) => None,
            UriPattern::Template { template, .. } => Some(template),
        }
    }
}

fn path_part(uri: &str) -> &str {
    uri.split_once('?').map_or(uri, |(path, _)| path)
}

fn percent_decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .unwrap_or(Cow::Borrowed(raw))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_ignores_case_and_query() {
        let pattern = UriPattern::bare("add");
        assert!(pattern.is_match("add"));
        assert!(pattern.is_match("Add?a=2&b=3"));
        assert!(!pattern.is_match("adder"));
        assert!(!pattern.is_match("x/add"));
    }

    #[test]
    fn test_query_extraction_decodes() {
        let values = UriPattern::bare("echo").extract("echo?s=hello%20world&n=a+b");
        assert_eq!(values.get("s"), Some("hello world"));
        assert_eq!(values.get("N"), Some("a b"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_template_matching_is_anchored() {
        let pattern = UriPattern::template("div:{a}/{b}").unwrap();
        assert!(pattern.is_match("div:10/0"));
        assert!(!pattern.is_match("xdiv:10/0"));
        assert!(!pattern.is_match("dov:10/0"));
    }

    #[test]
    fn test_template_escapes_literals() {
        let pattern = UriPattern::template("a.b/{x}").unwrap();
        assert!(pattern.is_match("a.b/1"));
        assert!(!pattern.is_match("axb/1"));
    }

    #[test]
    fn test_extraction_yields_one_pair_per_placeholder_in_order() {
        let pattern = UriPattern::template("tm2/{b}/{i}/{f}/{d}/{m}/{dt}/{s}").unwrap();
        let values = pattern.extract("tm2/true/-1/0.1/0.2/0.3/2018-08-17T06:30:29.542Z/test");

        let names: Vec<&str> = values.pairs().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["b", "i", "f", "d", "m", "dt", "s"]);
        assert_eq!(values.get("dt"), Some("2018-08-17T06:30:29.542Z"));
        assert_eq!(values.get("s"), Some("test"));
    }

    #[test]
    fn test_captures_are_percent_decoded() {
        let pattern = UriPattern::template("greet/{name}").unwrap();
        assert_eq!(pattern.extract("greet/J%C3%B6rg").get("name"), Some("Jörg"));
    }

    #[test]
    fn test_template_without_placeholders() {
        let pattern = UriPattern::template("release").unwrap();
        assert!(pattern.is_match("release"));
        assert!(pattern.extract("release").is_empty());
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(UriPattern::template("a/{b"), Err(PatternError::Unclosed(_))));
        assert!(matches!(UriPattern::template("a/{}"), Err(PatternError::Empty(_))));
    }
}
