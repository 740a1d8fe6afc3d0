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

use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::json_path::path::{IgnoreRulePath, IndexPath, RuleSegment};

const ROOT_TITLE: &str = "root";

/// Which document of a comparison a path points into.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The recorded (base) message.
    Left,
    /// The replayed (test) message.
    Right,
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "base"),
            Side::Right => write!(f, "test"),
        }
    }
}

/// Scope an ignore rule is persisted with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IgnoreType {
    /// Applies to every operation of the application.
    Global,
    /// Applies to one interface or dependency.
    Interface,
    /// Like `Interface`, but expires.
    Temporary,
}

/// How the two sides disagree at a [`DiffLocation`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum UnmatchedType {
    Na,
    LeftMissing,
    RightMissing,
    Unmatched,
    Other(i32),
}

impl From<i32> for UnmatchedType {
    fn from(code: i32) -> Self {
        match code {
            0 => UnmatchedType::Na,
            1 => UnmatchedType::LeftMissing,
            2 => UnmatchedType::RightMissing,
            3 => UnmatchedType::Unmatched,
            other => UnmatchedType::Other(other),
        }
    }
}

impl From<UnmatchedType> for i32 {
    fn from(kind: UnmatchedType) -> Self {
        match kind {
            UnmatchedType::Na => 0,
            UnmatchedType::LeftMissing => 1,
            UnmatchedType::RightMissing => 2,
            UnmatchedType::Unmatched => 3,
            UnmatchedType::Other(code) => code,
        }
    }
}

/// One step of an unmatched path as reported by the comparison backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntity {
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub index: usize,
}

impl NodeEntity {
    pub fn field(name: &str) -> Self {
        Self {
            node_name: Some(name.to_string()),
            index: 0,
        }
    }

    pub fn item(index: usize) -> Self {
        Self {
            node_name: None,
            index,
        }
    }

    fn name(&self) -> Option<&str> {
        self.node_name.as_deref().filter(|name| !name.is_empty())
    }
}

/// A point where the base and test documents diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLocation {
    #[serde(default)]
    pub left_unmatched_path: Vec<NodeEntity>,
    #[serde(default)]
    pub right_unmatched_path: Vec<NodeEntity>,
    pub unmatched_type: UnmatchedType,
}

impl DiffLocation {
    pub fn path(&self, side: Side) -> &[NodeEntity] {
        match side {
            Side::Left => &self.left_unmatched_path,
            Side::Right => &self.right_unmatched_path,
        }
    }

    /// Concrete path used to scroll a document to the divergence.
    pub fn index_path(&self, side: Side) -> IndexPath {
        self.path(side)
            .iter()
            .map(|node| match node.name() {
                Some(name) => name.to_string(),
                None => node.index.to_string(),
            })
            .collect()
    }

    /// The side whose path an ignore rule is derived from.
    pub fn ignore_side(&self) -> Side {
        match self.unmatched_type {
            UnmatchedType::RightMissing => Side::Right,
            _ => Side::Left,
        }
    }

    /// Ignore rule built from node names only; indexes are unstable across runs.
    pub fn ignore_path(&self) -> IgnoreRulePath {
        self.path(self.ignore_side())
            .iter()
            .filter_map(|node| node.name())
            .map(|name| RuleSegment::Node(name.to_string()))
            .collect::<Vec<_>>()
            .into()
    }

    /// Human readable label, e.g. `body.items[2].price`.
    pub fn title(&self) -> String {
        let path = if self.left_unmatched_path.len() >= self.right_unmatched_path.len() {
            &self.left_unmatched_path
        } else {
            &self.right_unmatched_path
        };

        let mut title = String::new();
        for (i, node) in path.iter().enumerate() {
            if i > 0 {
                title.push('.');
            }
            match node.name() {
                Some(name) => title.push_str(name),
                None => title.push_str(&format!("[{}]", node.index)),
            }
        }

        if title.is_empty() {
            ROOT_TITLE.to_string()
        } else {
            title
        }
    }
}
