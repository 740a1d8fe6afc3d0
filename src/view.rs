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

use serde_json::Value;
use std::fmt;

use crate::domain::{DiffLocation, Side};
use crate::json_path::path::{IgnoreRulePath, IndexPath};
use crate::json_path::{resolve, value_at};
use crate::rules::{ignore_path, PreciseIgnore, SortRule};
use crate::RuleError;

/// Base and test messages of one comparison, with the handlers a diff viewer
/// calls when a node is clicked.
///
/// # Examples
///
/// ```
/// use replay_path::{DiffView, IndexPath, Side};
/// use serde_json::json;
///
/// let view = DiffView::new(
///     json!({ "list": [{ "id": "a", "v": 1 }] }),
///     json!({ "list": [{ "id": "a", "v": 2 }] }),
/// );
/// let path = view.ignore_path(Side::Right, &IndexPath::from("list/0/v"));
/// assert_eq!(path.unwrap().to_string(), "list/v");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DiffView {
    base: Value,
    test: Value,
    case_sensitive: bool,
}

impl DiffView {
    pub fn new(base: Value, test: Value) -> Self {
        Self {
            base,
            test,
            case_sensitive: false,
        }
    }

    /// Parses both messages as JSON.
    pub fn from_messages(base: &str, test: &str) -> Result<Self, RuleError> {
        let parse = |side: Side, msg: &str| {
            serde_json::from_str::<Value>(msg)
                .map_err(|e| RuleError::InvalidDocument(format!("{} message: {}", side, e)))
        };

        Ok(Self::new(parse(Side::Left, base)?, parse(Side::Right, test)?))
    }

    /// Whether [`DiffView::resolve`] matches keys case sensitively. Off by default.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn document(&self, side: Side) -> &Value {
        match side {
            Side::Left => &self.base,
            Side::Right => &self.test,
        }
    }

    pub fn resolve(&self, side: Side, path: &IndexPath) -> Option<&Value> {
        resolve(path, self.document(side), self.case_sensitive)
    }

    pub fn ignore_path(&self, side: Side, clicked: &IndexPath) -> Option<IgnoreRulePath> {
        ignore_path(clicked, self.document(side))
    }

    pub fn sort_rule(&self, side: Side, clicked: &IndexPath) -> Option<SortRule> {
        SortRule::from_clicked(clicked, self.document(side))
    }

    pub fn precise_ignore(&self, side: Side, clicked: &IndexPath) -> Result<PreciseIgnore<'_>, RuleError> {
        PreciseIgnore::open(clicked, self.document(side))
    }

    /// Both documents' values at a diff location, each taken from its own side.
    pub fn location_values(&self, location: &DiffLocation) -> (Option<&Value>, Option<&Value>) {
        (
            value_at(&self.base, &location.index_path(Side::Left)),
            value_at(&self.test, &location.index_path(Side::Right)),
        )
    }

    /// Values at `path` in both documents, pretty-printed for a side by side view.
    pub fn diff_match(&self, path: &IndexPath) -> DiffMatch {
        let render = |doc: &Value| {
            value_at(doc, path).and_then(|value| serde_json::to_string_pretty(value).ok())
        };

        DiffMatch {
            path: path.clone(),
            base: render(&self.base),
            test: render(&self.test),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffMatch {
    pub path: IndexPath,
    pub base: Option<String>,
    pub test: Option<String>,
}

impl DiffMatch {
    pub fn is_equal(&self) -> bool {
        self.base == self.test
    }
}

fn write_block(f: &mut fmt::Formatter, label: &str, text: &Option<String>) -> fmt::Result {
    writeln!(f, "    {}:", label)?;
    match text {
        Some(text) => {
            for line in text.lines() {
                writeln!(f, "        {}", line)?;
            }
            Ok(())
        }
        None => writeln!(f, "        (missing)"),
    }
}

impl fmt::Display for DiffMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let path = if self.path.is_empty() {
            "(root)".to_string()
        } else {
            self.path.to_string()
        };

        writeln!(f, "values at path \"{}\":", path)?;
        write_block(f, "base", &self.base)?;
        write_block(f, "test", &self.test)
    }
}
