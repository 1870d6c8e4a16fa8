//! Routing messages: route updates, route queries and forwarding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    Create,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteUpdateResult {
    Success,
    ServerError,
    NoChange,
    ClientError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdate {
    pub recipient_key: String,
    pub action: RouteAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdated {
    pub recipient_key: String,
    pub action: RouteAction,
    pub result: RouteUpdateResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdateRequest {
    pub updates: Vec<RouteUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdateResponse {
    pub updated: Vec<RouteUpdated>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated {
    pub start: usize,
    pub end: usize,
    pub limit: usize,
    pub total: usize,
}

impl Paginate {
    /// Slice `items` according to this request and describe the page.
    pub fn apply<T: Clone>(&self, items: &[T]) -> (Vec<T>, Paginated) {
        let total = items.len();
        let start = self.offset.unwrap_or(0).min(total);
        let limit = self.limit.unwrap_or(total);
        let end = start.saturating_add(limit).min(total);
        (
            items[start..end].to_vec(),
            Paginated {
                start,
                end,
                limit,
                total,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteQueryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paginate: Option<Paginate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteQueryResult {
    pub recipient_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteQueryResponse {
    pub routes: Vec<RouteQueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paginated: Option<Paginated>,
}

/// A message to relay to the agent registered for `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forward {
    pub to: String,
    pub msg: Value,
}
