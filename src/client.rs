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

use std::collections::HashMap;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::json_path::path::IndexPath;
use crate::rules::{ExclusionRule, RuleScope, SortRule};

pub const INSERT_EXCLUSION_ENDPOINT: &str = "/webApi/config/comparison/exclusions/modify/INSERT";
pub const INSERT_LIST_SORT_ENDPOINT: &str = "/webApi/config/comparison/listsort/modify/INSERT";

/// Error submitting a rule to the comparison backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header {0}")]
    InvalidHeader(String),
    #[error("backend answered {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("backend refused the rule")]
    Refused,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SortPayload<'a> {
    #[serde(flatten)]
    scope: &'a RuleScope,
    list_path: &'a IndexPath,
    keys: &'a [IndexPath],
}

/// Submits finished rules to the comparison backend.
///
/// Each call is a single request; failures are returned, never retried.
#[derive(Debug, Clone)]
pub struct ComparisonClient {
    base_url: String,
    exclusion_endpoint: String,
    sort_endpoint: String,
    headers: HeaderMap,
    http: Client,
}

impl ComparisonClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            exclusion_endpoint: INSERT_EXCLUSION_ENDPOINT.to_string(),
            sort_endpoint: INSERT_LIST_SORT_ENDPOINT.to_string(),
            headers: HeaderMap::new(),
            http: Client::new(),
        }
    }

    pub fn with_exclusion_endpoint(mut self, endpoint: &str) -> Self {
        self.exclusion_endpoint = endpoint.to_string();
        self
    }

    pub fn with_sort_endpoint(mut self, endpoint: &str) -> Self {
        self.sort_endpoint = endpoint.to_string();
        self
    }

    /// Headers sent with every request, e.g. an access token.
    pub fn with_headers(mut self, headers: &HashMap<String, String>) -> Result<Self, ClientError> {
        for (key, value) in headers {
            let name = HeaderName::from_str(key)
                .map_err(|e| ClientError::InvalidHeader(format!("{}: {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidHeader(format!("{}: {}", key, e)))?;
            self.headers.insert(name, value);
        }
        Ok(self)
    }

    pub async fn insert_ignore_node(&self, rule: &ExclusionRule) -> Result<(), ClientError> {
        self.post(&self.exclusion_endpoint, rule).await?;
        info!(exclusions = %rule.exclusions, app_id = rule.scope.app_id.as_str(), "ignore rule submitted");
        Ok(())
    }

    pub async fn insert_sort_node(&self, scope: &RuleScope, rule: &SortRule) -> Result<(), ClientError> {
        let payload = SortPayload {
            scope,
            list_path: &rule.list_path,
            keys: &rule.keys,
        };
        self.post(&self.sort_endpoint, &payload).await?;
        info!(list_path = %rule.list_path, app_id = scope.app_id.as_str(), "sort rule submitted");
        Ok(())
    }

    async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, payload: &T) -> Result<(), ClientError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http
            .post(url.as_str())
            .headers(self.headers.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "rule submission rejected");
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // The envelope is opaque except for an explicit `"body": false`.
        let refused = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|envelope| envelope.get("body").and_then(Value::as_bool))
            == Some(false);
        if refused {
            warn!(%url, "rule submission refused");
            return Err(ClientError::Refused);
        }

        Ok(())
    }
}
