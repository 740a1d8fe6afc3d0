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

pub(crate) mod path;

use path::{index_of, IndexPath};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::trace;

/// Resolves `path` against `document`, the way the sort node editor previews
/// a list schema.
///
/// Arrays met after the first segment are addressed by index when the segment
/// is a decimal index, otherwise through the element picked by
/// [`sample_element`]. Any miss yields `None`.
pub fn resolve<'a>(path: &IndexPath, document: &'a Value, case_sensitive: bool) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = document;
    for (i, segment) in path.iter().enumerate() {
        let next = match current {
            Value::Array(items) => match index_of(segment) {
                Some(idx) => items.get(idx),
                None if i == 0 => None,
                None => sample_element(items).and_then(|el| lookup(el, segment, case_sensitive)),
            },
            Value::Object(_) => lookup(current, segment, case_sensitive),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
        };

        trace!(segment = segment.as_str(), value = ?next, "resolved segment");
        current = next?;
    }

    Some(current)
}

/// [`resolve`] with case-insensitive keys.
pub fn resolve_default<'a>(path: &IndexPath, document: &'a Value) -> Option<&'a Value> {
    resolve(path, document, false)
}

fn lookup<'a>(value: &'a Value, key: &str, case_sensitive: bool) -> Option<&'a Value> {
    let Value::Object(map) = value else {
        return None;
    };

    if case_sensitive {
        map.get(key)
    } else {
        fold_keys(map).get(&key.to_lowercase()).copied()
    }
}

/// Builds a lowercased view of an object's keys. The object is left untouched.
///
/// When two keys fold to the same string, the one iterated last wins.
pub fn fold_keys(map: &Map<String, Value>) -> HashMap<String, &Value> {
    map.iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

/// Picks the element standing in for a whole array: the first object or
/// array, else the first element.
pub fn sample_element(items: &[Value]) -> Option<&Value> {
    items
        .iter()
        .find(|item| item.is_object() || item.is_array())
        .or_else(|| items.first())
}

/// Exact lookup: keys are case sensitive and arrays are only indexed.
pub fn value_at<'a>(document: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(document, |current, segment| match current {
        Value::Array(items) => index_of(segment).and_then(|idx| items.get(idx)),
        Value::Object(map) => map.get(segment.as_str()),
        _ => None,
    })
}

/// Drops every array index from a concrete path while still walking through
/// the indexed element.
///
/// Returns `None` when the walk misses. A path made only of indexes (`0` on
/// `[1]`) also yields `None` rather than an empty path: an empty rule would
/// match the whole document, so callers get nothing to persist.
pub fn filter_to_named_segments(path: &[String], document: &Value) -> Option<IndexPath> {
    let mut named = IndexPath::new();
    let mut current = document;

    for segment in path {
        current = match current {
            Value::Array(items) => items.get(index_of(segment)?)?,
            Value::Object(map) => {
                let next = map.get(segment.as_str())?;
                named.push(segment.as_str());
                next
            }
            _ => return None,
        };
    }

    if named.is_empty() {
        return None;
    }

    Some(named)
}
