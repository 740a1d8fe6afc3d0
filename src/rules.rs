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

use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::domain::IgnoreType;
use crate::json_path::path::{index_of, IgnoreRulePath, IndexPath, RuleSegment};
use crate::json_path::{filter_to_named_segments, resolve, sample_element, value_at};
use crate::RuleError;

/// Default lifetime of a [`IgnoreType::Temporary`] rule.
pub const DEFAULT_TEMPORARY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A field inside the targeted array element, and the value it must equal.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSelection {
    pub path: IndexPath,
    pub value: Value,
}

impl ReferenceSelection {
    pub fn new(path: impl Into<IndexPath>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

fn render_scalar(value: &Value) -> Result<String, RuleError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        Value::Array(_) | Value::Object(_) => Err(RuleError::NonScalarReference(value.to_string())),
    }
}

/// The `[path=value]` segment for a reference. Characters that would end the
/// predicate early when the rule is parsed back are rejected.
fn predicate(reference: &ReferenceSelection) -> Result<RuleSegment, RuleError> {
    let value = render_scalar(&reference.value)?;
    if value.contains(']') {
        return Err(RuleError::InvalidRulePath(format!(
            "reference value {} contains ']'",
            value
        )));
    }
    if let Some(segment) = reference
        .path
        .iter()
        .find(|segment| segment.contains(['=', ']', '/']))
    {
        return Err(RuleError::InvalidRulePath(format!(
            "reference field {} contains a reserved character",
            segment
        )));
    }

    Ok(RuleSegment::Predicate {
        path: reference.path.to_vec(),
        value,
    })
}

/// The array element nearest to the leaf that encloses a clicked path.
#[derive(Debug, Clone, PartialEq)]
struct ArrayAnchor<'a> {
    element: &'a Value,
    index: usize,
    base_path: IndexPath,
    relative_path: IndexPath,
}

impl<'a> ArrayAnchor<'a> {
    /// Scans prefixes from the leaf toward the root; the first one holding an
    /// array wins.
    fn locate(clicked: &IndexPath, document: &'a Value) -> Option<Self> {
        for end in (0..clicked.len()).rev() {
            let Some(Value::Array(items)) = value_at(document, &clicked[..end]) else {
                continue;
            };

            let index = index_of(&clicked[end])?;
            let element = items.get(index)?;

            return Some(Self {
                element,
                index,
                base_path: IndexPath::from(&clicked[..end]),
                relative_path: IndexPath::from(&clicked[end + 1..]),
            });
        }

        None
    }

    fn rule_path(&self, reference: Option<&ReferenceSelection>) -> Result<IgnoreRulePath, RuleError> {
        let reference = reference
            .filter(|reference| !reference.path.is_empty())
            .ok_or(RuleError::NoReferenceSelected)?;
        let segment = predicate(reference)?;

        let mut segments = self
            .base_path
            .iter()
            .cloned()
            .map(RuleSegment::Node)
            .collect::<Vec<_>>();
        segments.push(segment);
        segments.extend(self.relative_path.iter().cloned().map(RuleSegment::Node));

        let path = IgnoreRulePath::from(segments);
        debug!(rule = %path, index = self.index, "built precise ignore path");
        Ok(path)
    }
}

/// Builds an ignore path that targets one array element by a stable field
/// instead of by index, e.g. `list/[id=b]/v`.
///
/// Fails with [`RuleError::NotInsideArray`] when no array encloses `clicked`;
/// callers fall back to [`ignore_path`] then.
pub fn build_precise_ignore_path(
    clicked: &IndexPath,
    document: &Value,
    reference: Option<&ReferenceSelection>,
) -> Result<IgnoreRulePath, RuleError> {
    ArrayAnchor::locate(clicked, document)
        .ok_or_else(|| RuleError::NotInsideArray(clicked.clone()))?
        .rule_path(reference)
}

/// Ordinary ignore path: the clicked path with array indexes removed.
pub fn ignore_path(clicked: &IndexPath, document: &Value) -> Option<IgnoreRulePath> {
    filter_to_named_segments(clicked, document).map(|path| IgnoreRulePath::from(&path))
}

/// How a node should be marked while a precise ignore is being set up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Highlight {
    None,
    /// The node the rule will ignore.
    Target,
    /// The node chosen as reference.
    Reference,
    /// The target was also chosen as reference.
    Both,
}

/// State of an in-progress precise ignore.
///
/// Opened from a click, it holds the enclosing array element until a
/// reference field is selected and [`PreciseIgnore::build`] succeeds.
/// Dropping it discards everything.
#[derive(Debug, Clone)]
pub struct PreciseIgnore<'a> {
    anchor: ArrayAnchor<'a>,
    reference: Option<ReferenceSelection>,
}

impl<'a> PreciseIgnore<'a> {
    pub fn open(clicked: &IndexPath, document: &'a Value) -> Result<Self, RuleError> {
        let anchor = ArrayAnchor::locate(clicked, document)
            .ok_or_else(|| RuleError::NotInsideArray(clicked.clone()))?;

        debug!(
            base = %anchor.base_path,
            relative = %anchor.relative_path,
            "opened precise ignore"
        );

        Ok(Self {
            anchor,
            reference: None,
        })
    }

    /// The array element the rule targets.
    pub fn element(&self) -> &'a Value {
        self.anchor.element
    }

    pub fn index(&self) -> usize {
        self.anchor.index
    }

    pub fn base_path(&self) -> &IndexPath {
        &self.anchor.base_path
    }

    /// Path of the ignored node inside [`PreciseIgnore::element`].
    pub fn relative_path(&self) -> &IndexPath {
        &self.anchor.relative_path
    }

    pub fn reference(&self) -> Option<&ReferenceSelection> {
        self.reference.as_ref()
    }

    /// Selects the field at `path` (relative to the element) as reference.
    /// Its current value becomes the predicate value.
    pub fn select_reference(&mut self, path: impl Into<IndexPath>) -> Result<(), RuleError> {
        let path = path.into();
        let value = value_at(self.anchor.element, &path)
            .ok_or_else(|| RuleError::UnresolvablePath(path.clone()))?;
        let reference = ReferenceSelection::new(path, value.clone());
        predicate(&reference)?;

        self.reference = Some(reference);
        Ok(())
    }

    pub fn clear_reference(&mut self) {
        self.reference = None;
    }

    pub fn highlight(&self, path: &[String]) -> Highlight {
        let target = path == &self.anchor.relative_path[..];
        let reference = self
            .reference
            .as_ref()
            .is_some_and(|reference| path == &reference.path[..]);

        match (target, reference) {
            (true, true) => Highlight::Both,
            (true, false) => Highlight::Target,
            (false, true) => Highlight::Reference,
            (false, false) => Highlight::None,
        }
    }

    /// Builds the rule. The session stays usable on error, so a missing
    /// reference can still be selected.
    pub fn build(&self) -> Result<IgnoreRulePath, RuleError> {
        self.anchor.rule_path(self.reference.as_ref())
    }
}

/// A list-sort rule: the list to sort and the key fields to sort it by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortRule {
    pub list_path: IndexPath,
    pub keys: Vec<IndexPath>,
}

impl SortRule {
    pub fn new(list_path: IndexPath) -> Self {
        Self {
            list_path,
            keys: vec![],
        }
    }

    /// Sort rule for a clicked list, `None` when the path does not resolve.
    pub fn from_clicked(clicked: &IndexPath, document: &Value) -> Option<Self> {
        filter_to_named_segments(clicked, document).map(Self::new)
    }

    pub fn with_key(mut self, key: impl Into<IndexPath>) -> Self {
        let key = key.into();
        if !key.is_empty() && !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }

    /// Adds `key` if absent, removes it otherwise. Returns whether it is now set.
    pub fn toggle_key(&mut self, key: impl Into<IndexPath>) -> bool {
        let key = key.into();
        match self.keys.iter().position(|k| *k == key) {
            Some(pos) => {
                self.keys.remove(pos);
                false
            }
            None => {
                self.keys.push(key);
                true
            }
        }
    }

    pub fn display_path(&self) -> String {
        format!("{}/", self.list_path)
    }

    pub fn key_paths(&self) -> Vec<String> {
        self.keys.iter().map(|key| format!("{}/", key)).collect()
    }
}

/// Paths of every scalar field of the element standing in for the list at
/// `list_path`. These are the fields a [`SortRule`] can sort by.
pub fn sort_key_candidates(list_path: &IndexPath, document: &Value) -> Option<Vec<IndexPath>> {
    let Value::Array(items) = resolve(list_path, document, false)? else {
        return None;
    };

    let mut acc = vec![];
    if let Some(element) = sample_element(items) {
        collect_leaf_paths(element, &IndexPath::new(), &mut acc);
    }
    Some(acc)
}

fn collect_leaf_paths(value: &Value, prefix: &IndexPath, acc: &mut Vec<IndexPath>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                collect_leaf_paths(value, &prefix.join(&[key.clone()]), acc);
            }
        }
        // nested lists are sorted by their own rule
        Value::Array(_) => {}
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            if !prefix.is_empty() {
                acc.push(prefix.clone());
            }
        }
    }
}

/// Owner of a persisted rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleScope {
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl RuleScope {
    pub fn new(app_id: &str, operation_id: Option<&str>) -> Self {
        Self {
            app_id: app_id.to_string(),
            operation_id: operation_id.map(str::to_string),
        }
    }
}

/// An ignore rule ready to be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRule {
    #[serde(flatten)]
    pub scope: RuleScope,
    pub exclusions: IgnoreRulePath,
    pub expiration_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<u64>,
}

impl ExclusionRule {
    /// `Global` rules drop the operation id, `Temporary` ones expire after `ttl`.
    pub fn new(
        scope: RuleScope,
        exclusions: IgnoreRulePath,
        ignore_type: IgnoreType,
        ttl: Duration,
    ) -> Self {
        let (scope, expiration_type, expiration_date) = match ignore_type {
            IgnoreType::Global => (
                RuleScope {
                    operation_id: None,
                    ..scope
                },
                0,
                None,
            ),
            IgnoreType::Interface => (scope, 0, None),
            IgnoreType::Temporary => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                // clamped to u64::MAX millis
                let expires = now.saturating_add(ttl).as_millis();
                (scope, 1, Some(u64::try_from(expires).unwrap_or(u64::MAX)))
            }
        };

        Self {
            scope,
            exclusions,
            expiration_type,
            expiration_date,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn list() -> Value {
        json!({ "list": [{ "id": "a", "v": 1 }, { "id": "b", "v": 2 }] })
    }

    #[test]
    fn test_build_precise_ignore_path() {
        let reference = ReferenceSelection::new(["id"], "b");
        let path =
            build_precise_ignore_path(&IndexPath::from(["list", "1", "v"]), &list(), Some(&reference))
                .unwrap();

        assert_eq!(path.to_string(), "list/[id=b]/v");
        assert!(path.is_precise());
    }

    #[test]
    fn test_precise_ignore_requires_reference() {
        let clicked = IndexPath::from(["list", "1", "v"]);

        assert_eq!(
            build_precise_ignore_path(&clicked, &list(), None),
            Err(RuleError::NoReferenceSelected)
        );
        assert_eq!(
            build_precise_ignore_path(
                &clicked,
                &list(),
                Some(&ReferenceSelection::new(IndexPath::new(), "b"))
            ),
            Err(RuleError::NoReferenceSelected)
        );
        assert_eq!(
            build_precise_ignore_path(&IndexPath::from("list/0"), &list(), None),
            Err(RuleError::NoReferenceSelected)
        );
    }

    #[test]
    fn test_precise_ignore_outside_array() {
        let doc = json!({ "a": { "b": 1 } });
        let clicked = IndexPath::from("a/b");

        assert_eq!(
            build_precise_ignore_path(&clicked, &doc, Some(&ReferenceSelection::new(["x"], 1))),
            Err(RuleError::NotInsideArray(clicked.clone()))
        );
        assert!(PreciseIgnore::open(&clicked, &doc).is_err());
        assert!(PreciseIgnore::open(&IndexPath::new(), &doc).is_err());
    }

    #[test]
    fn test_precise_ignore_uses_innermost_array() {
        let doc = json!({
            "orders": [
                { "no": 7, "lines": [{ "sku": "x", "price": { "amount": 3 } }] }
            ]
        });
        let reference = ReferenceSelection::new(["sku"], "x");
        let path = build_precise_ignore_path(
            &IndexPath::from("orders/0/lines/0/price/amount"),
            &doc,
            Some(&reference),
        )
        .unwrap();

        assert_eq!(path.to_string(), "orders/0/lines/[sku=x]/price/amount");
    }

    #[test]
    fn test_precise_ignore_root_array_and_scalar_values() {
        let doc = json!([{ "id": 5, "ok": true, "v": [1, 2] }]);

        let path = build_precise_ignore_path(
            &IndexPath::from("0/v/1"),
            &doc,
            Some(&ReferenceSelection::new(["id"], 5)),
        );
        // the list `v` is nearer to the leaf than the root array
        assert_eq!(path.unwrap().to_string(), "0/v/[id=5]");

        let path = build_precise_ignore_path(
            &IndexPath::from("0/ok"),
            &doc,
            Some(&ReferenceSelection::new(["ok"], true)),
        );
        assert_eq!(path.unwrap().to_string(), "[ok=true]/ok");

        let path = build_precise_ignore_path(
            &IndexPath::from("0/ok"),
            &doc,
            Some(&ReferenceSelection::new(["v"], json!([1, 2]))),
        );
        assert!(matches!(path, Err(RuleError::NonScalarReference(_))));
    }

    #[test]
    fn test_precise_ignore_path_parses_back() {
        let doc = json!({ "list": [{ "id": "x=y/z", "v": 1 }] });
        let clicked = IndexPath::from("list/0/v");

        let path =
            build_precise_ignore_path(&clicked, &doc, Some(&ReferenceSelection::new(["id"], "x=y/z")))
                .unwrap();
        assert_eq!(path.to_string(), "list/[id=x=y/z]/v");
        assert_eq!(path.to_string().parse::<IgnoreRulePath>().unwrap(), path);

        assert!(matches!(
            build_precise_ignore_path(&clicked, &doc, Some(&ReferenceSelection::new(["id"], "a]b"))),
            Err(RuleError::InvalidRulePath(_))
        ));
        assert!(matches!(
            build_precise_ignore_path(
                &clicked,
                &doc,
                Some(&ReferenceSelection::new(vec!["k=v".to_string()], "a"))
            ),
            Err(RuleError::InvalidRulePath(_))
        ));

        let doc = json!({ "list": [{ "id": "a]b", "v": 1 }] });
        let mut session = PreciseIgnore::open(&clicked, &doc).unwrap();
        assert!(matches!(
            session.select_reference("id"),
            Err(RuleError::InvalidRulePath(_))
        ));
        assert!(session.reference().is_none());
    }

    #[test]
    fn test_precise_ignore_session() {
        let doc = list();
        let mut session = PreciseIgnore::open(&IndexPath::from("list/1/v"), &doc).unwrap();

        assert_eq!(session.element(), &json!({ "id": "b", "v": 2 }));
        assert_eq!(session.index(), 1);
        assert_eq!(session.base_path(), &IndexPath::from("list"));
        assert_eq!(session.relative_path(), &IndexPath::from("v"));
        assert_eq!(session.build(), Err(RuleError::NoReferenceSelected));

        assert_eq!(
            session.select_reference("missing"),
            Err(RuleError::UnresolvablePath(IndexPath::from("missing")))
        );
        assert!(session.reference().is_none());

        session.select_reference("id").unwrap();
        assert_eq!(session.reference(), Some(&ReferenceSelection::new(["id"], "b")));
        assert_eq!(session.build().unwrap().to_string(), "list/[id=b]/v");

        session.clear_reference();
        assert_eq!(session.build(), Err(RuleError::NoReferenceSelected));
    }

    #[test]
    fn test_highlight() {
        let doc = list();
        let mut session = PreciseIgnore::open(&IndexPath::from("list/0/id"), &doc).unwrap();

        assert_eq!(session.highlight(&IndexPath::from("id")), Highlight::Target);
        assert_eq!(session.highlight(&IndexPath::from("v")), Highlight::None);

        session.select_reference("v").unwrap();
        assert_eq!(session.highlight(&IndexPath::from("v")), Highlight::Reference);

        session.select_reference("id").unwrap();
        assert_eq!(session.highlight(&IndexPath::from("id")), Highlight::Both);
    }

    #[test]
    fn test_ignore_path() {
        let path = ignore_path(&IndexPath::from("list/1/v"), &list()).unwrap();
        assert_eq!(path.to_string(), "list/v");
        assert!(!path.is_precise());

        assert_eq!(ignore_path(&IndexPath::from("list/9/v"), &list()), None);
    }

    #[test]
    fn test_sort_rule() {
        let doc = json!({ "body": [{ "users": [{ "id": 1 }] }] });
        let rule = SortRule::from_clicked(&IndexPath::from("body/0/users"), &doc)
            .unwrap()
            .with_key("id")
            .with_key("id")
            .with_key("meta/rank");

        assert_eq!(rule.list_path, IndexPath::from("body/users"));
        assert_eq!(rule.display_path(), "body/users/");
        assert_eq!(rule.key_paths(), vec!["id/", "meta/rank/"]);
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({ "listPath": ["body", "users"], "keys": [["id"], ["meta", "rank"]] })
        );

        let mut rule = rule;
        assert!(!rule.toggle_key("id"));
        assert!(rule.toggle_key("name"));
        assert_eq!(rule.key_paths(), vec!["meta/rank/", "name/"]);

        assert_eq!(SortRule::from_clicked(&IndexPath::from("nope"), &doc), None);
    }

    #[test]
    fn test_sort_key_candidates() {
        let doc = json!({
            "Body": {
                "users": [
                    "skipped",
                    { "id": 1, "profile": { "name": "x", "tags": ["a"] }, "active": null }
                ]
            }
        });

        let mut keys = sort_key_candidates(&IndexPath::from("body/users"), &doc).unwrap();
        keys.sort_by_key(|key| key.to_string());
        assert_eq!(
            keys,
            vec![
                IndexPath::from("active"),
                IndexPath::from("id"),
                IndexPath::from("profile/name"),
            ]
        );

        assert_eq!(
            sort_key_candidates(&IndexPath::from("body/users/id"), &doc),
            None
        );
        assert_eq!(
            sort_key_candidates(&IndexPath::from("list"), &json!({ "list": [] })),
            Some(vec![])
        );
    }

    #[test]
    fn test_exclusion_rule() {
        let scope = RuleScope::new("app", Some("op-1"));
        let path = IgnoreRulePath::from(&IndexPath::from("a/b"));

        let rule = ExclusionRule::new(scope.clone(), path.clone(), IgnoreType::Interface, DEFAULT_TEMPORARY_TTL);
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({ "appId": "app", "operationId": "op-1", "exclusions": ["a", "b"], "expirationType": 0 })
        );

        let rule = ExclusionRule::new(scope.clone(), path.clone(), IgnoreType::Global, DEFAULT_TEMPORARY_TTL);
        assert_eq!(rule.scope.operation_id, None);
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({ "appId": "app", "exclusions": ["a", "b"], "expirationType": 0 })
        );

        let rule = ExclusionRule::new(scope, path, IgnoreType::Temporary, Duration::from_secs(60));
        assert_eq!(rule.expiration_type, 1);
        assert!(rule.expiration_date.unwrap() > 60_000);

        let rule = ExclusionRule::new(
            RuleScope::new("app", None),
            IgnoreRulePath::from(&IndexPath::from("a")),
            IgnoreType::Temporary,
            Duration::MAX,
        );
        assert_eq!(rule.expiration_date, Some(u64::MAX));
    }
}
