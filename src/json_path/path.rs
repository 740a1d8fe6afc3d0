// Copyright 2024 The DocAssert Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::RuleError;

const SEPARATOR: char = '/';

static RULE_PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();

/// Token and predicate patterns of a rule path, compiled on first use.
fn rule_patterns() -> Result<&'static (Regex, Regex), RuleError> {
    if let Some(patterns) = RULE_PATTERNS.get() {
        return Ok(patterns);
    }

    let tokens = Regex::new(r"\[[^\]]*\]|[^/]+")
        .map_err(|e| RuleError::InvalidRulePath(e.to_string()))?;
    let predicate = Regex::new(r"^\[([^=\]]+)=([^\]]*)\]$")
        .map_err(|e| RuleError::InvalidRulePath(e.to_string()))?;
    Ok(RULE_PATTERNS.get_or_init(|| (tokens, predicate)))
}

/// A concrete location inside a JSON document.
///
/// Segments are kept as strings: whether `"2"` is an array index or an object
/// key depends on the container it is applied to. Empty segments are dropped
/// on construction, so `"/a//b/"` and `"a/b"` are the same path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct IndexPath(Vec<String>);

impl IndexPath {
    pub fn new() -> Self {
        Self(vec![])
    }

    pub(crate) fn push(&mut self, segment: impl Into<String>) {
        let segment = segment.into();
        if !segment.is_empty() {
            self.0.push(segment);
        }
    }

    pub(crate) fn join(&self, other: &[String]) -> IndexPath {
        self.iter().chain(other.iter()).cloned().collect()
    }
}

impl Deref for IndexPath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for IndexPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut path = IndexPath::new();
        for segment in iter {
            path.push(segment);
        }
        path
    }
}

impl From<Vec<String>> for IndexPath {
    fn from(segments: Vec<String>) -> Self {
        segments.into_iter().collect()
    }
}

impl From<&[String]> for IndexPath {
    fn from(segments: &[String]) -> Self {
        segments.iter().cloned().collect()
    }
}

impl<const N: usize> From<[&str; N]> for IndexPath {
    fn from(segments: [&str; N]) -> Self {
        segments.into_iter().collect()
    }
}

impl From<&str> for IndexPath {
    fn from(path: &str) -> Self {
        path.split(SEPARATOR).collect()
    }
}

impl From<IndexPath> for Vec<String> {
    fn from(path: IndexPath) -> Self {
        path.0
    }
}

impl FromStr for IndexPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IndexPath::from(s))
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Interprets a segment as an array index. Only plain decimal digits qualify.
pub(crate) fn index_of(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// One segment of an ignore rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleSegment {
    /// A field name, or an index the rule keeps verbatim.
    Node(String),
    /// The array element whose field at `path` equals `value`.
    Predicate { path: Vec<String>, value: String },
}

impl fmt::Display for RuleSegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuleSegment::Node(name) => write!(f, "{}", name),
            RuleSegment::Predicate { path, value } => write!(f, "[{}={}]", path.join("/"), value),
        }
    }
}

/// A symbolic path persisted as an ignore rule, e.g. `list/[id=b]/v`.
///
/// Predicate segments are opaque here: they are rendered and parsed but never
/// resolved against a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IgnoreRulePath(Vec<RuleSegment>);

impl IgnoreRulePath {
    pub fn segments(&self) -> &[RuleSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the rule is anchored on a reference field.
    pub fn is_precise(&self) -> bool {
        self.0
            .iter()
            .any(|segment| matches!(segment, RuleSegment::Predicate { .. }))
    }

    fn parse_token(token: &str, predicate: &Regex) -> Result<RuleSegment, RuleError> {
        if !token.starts_with('[') {
            return Ok(RuleSegment::Node(token.to_string()));
        }

        let captures = predicate
            .captures(token)
            .ok_or_else(|| RuleError::InvalidRulePath(format!("malformed predicate {}", token)))?;
        let path = captures[1]
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        if path.is_empty() {
            return Err(RuleError::InvalidRulePath(format!(
                "predicate {} has no reference path",
                token
            )));
        }

        Ok(RuleSegment::Predicate {
            path,
            value: captures[2].to_string(),
        })
    }
}

impl From<Vec<RuleSegment>> for IgnoreRulePath {
    fn from(segments: Vec<RuleSegment>) -> Self {
        Self(segments)
    }
}

impl From<&IndexPath> for IgnoreRulePath {
    fn from(path: &IndexPath) -> Self {
        Self(path.iter().cloned().map(RuleSegment::Node).collect())
    }
}

impl FromStr for IgnoreRulePath {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tokens, predicate) = rule_patterns()?;

        let mut segments = Vec::new();
        for token in tokens.find_iter(s) {
            segments.push(Self::parse_token(token.as_str(), predicate)?);
        }

        if segments.is_empty() {
            return Err(RuleError::InvalidRulePath("empty rule path".to_string()));
        }

        Ok(Self(segments))
    }
}

impl fmt::Display for IgnoreRulePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Serialized the way the backend stores exclusions: one string per segment.
impl Serialize for IgnoreRulePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|segment| segment.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_index_path_drops_empty_segments() {
        let path = IndexPath::from("/a//b/");
        assert_eq!(path, IndexPath::from(["a", "b"]));
        assert_eq!(path.to_string(), "a/b");

        let path: IndexPath = vec!["".to_string(), "x".to_string()].into();
        assert_eq!(path.len(), 1);

        assert!(IndexPath::from("///").is_empty());
    }

    #[test]
    fn test_index_of() {
        assert_eq!(index_of("0"), Some(0));
        assert_eq!(index_of("12"), Some(12));
        assert_eq!(index_of(""), None);
        assert_eq!(index_of("-1"), None);
        assert_eq!(index_of("+1"), None);
        assert_eq!(index_of("1a"), None);
        assert_eq!(index_of("name"), None);
    }

    #[test]
    fn test_display_rule_path() {
        let path = IgnoreRulePath::from(vec![
            RuleSegment::Node("list".to_string()),
            RuleSegment::Predicate {
                path: vec!["meta".to_string(), "id".to_string()],
                value: "b".to_string(),
            },
            RuleSegment::Node("v".to_string()),
        ]);
        assert_eq!(path.to_string(), "list/[meta/id=b]/v");
        assert!(path.is_precise());
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            serde_json::json!(["list", "[meta/id=b]", "v"])
        );
    }

    #[test]
    fn test_parse_rule_path() {
        let path = "list/[id=b]/v".parse::<IgnoreRulePath>().unwrap();
        assert_eq!(
            path.segments(),
            &[
                RuleSegment::Node("list".to_string()),
                RuleSegment::Predicate {
                    path: vec!["id".to_string()],
                    value: "b".to_string(),
                },
                RuleSegment::Node("v".to_string()),
            ]
        );

        let path = "a/[meta/id=x=y]".parse::<IgnoreRulePath>().unwrap();
        assert_eq!(
            path.segments()[1],
            RuleSegment::Predicate {
                path: vec!["meta".to_string(), "id".to_string()],
                value: "x=y".to_string(),
            }
        );
        assert_eq!(path.to_string(), "a/[meta/id=x=y]");

        let path = "/body/items/".parse::<IgnoreRulePath>().unwrap();
        assert_eq!(path.len(), 2);
        assert!(!path.is_precise());
    }

    #[test]
    fn test_parse_rule_path_validation() {
        assert!("".parse::<IgnoreRulePath>().is_err());
        assert!("/".parse::<IgnoreRulePath>().is_err());
        assert!("a/[id]".parse::<IgnoreRulePath>().is_err());
        assert!("a/[=b]".parse::<IgnoreRulePath>().is_err());
        assert!("a/[id=b".parse::<IgnoreRulePath>().is_err());
        assert!("a/[/=b]".parse::<IgnoreRulePath>().is_err());
        assert!("a/[id=]/c".parse::<IgnoreRulePath>().is_ok());
    }
}
