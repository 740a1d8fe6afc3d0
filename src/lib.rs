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

#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod client;
mod domain;
mod json_path;
mod rules;
mod view;

pub use client::{ClientError, ComparisonClient, INSERT_EXCLUSION_ENDPOINT, INSERT_LIST_SORT_ENDPOINT};
pub use domain::{DiffLocation, IgnoreType, NodeEntity, Side, UnmatchedType};
pub use json_path::path::{IgnoreRulePath, IndexPath, RuleSegment};
pub use json_path::{
    filter_to_named_segments, fold_keys, resolve, resolve_default, sample_element, value_at,
};
pub use rules::{
    build_precise_ignore_path, ignore_path, sort_key_candidates, ExclusionRule, Highlight,
    PreciseIgnore, ReferenceSelection, RuleScope, SortRule, DEFAULT_TEMPORARY_TTL,
};
pub use view::{DiffMatch, DiffView};

/// Error building an ignore or sort rule.
///
/// These are user facing: the flow that produced them can be corrected and
/// retried. Paths that simply do not resolve are reported as `None` by the
/// resolution functions instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// A precise ignore was finalized without a reference node.
    #[error("select a reference node first")]
    NoReferenceSelected,
    /// A precise ignore was requested for a node outside any array.
    #[error("path \"{0}\" is not inside an array")]
    NotInsideArray(IndexPath),
    /// The reference node is an object or an array.
    #[error("reference value must be a scalar, got {0}")]
    NonScalarReference(String),
    #[error("path \"{0}\" does not resolve")]
    UnresolvablePath(IndexPath),
    #[error("invalid rule path: {0}")]
    InvalidRulePath(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}
