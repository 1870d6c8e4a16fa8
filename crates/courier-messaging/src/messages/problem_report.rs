use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Describes why an interaction failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemReport {
    #[serde(rename = "explain-ltxt", default, skip_serializing_if = "Option::is_none")]
    pub explain_ltxt: Option<String>,
    #[serde(rename = "problem_items", default, skip_serializing_if = "Option::is_none")]
    pub problem_items: Option<Vec<BTreeMap<String, String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub who_retries: Option<String>,
    #[serde(rename = "fix-hint-ltxt", default, skip_serializing_if = "Option::is_none")]
    pub fix_hint_ltxt: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_noticed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_uri: Option<String>,
}

impl ProblemReport {
    pub fn explain(text: impl Into<String>) -> Self {
        Self {
            explain_ltxt: Some(text.into()),
            time_noticed: Some(Utc::now()),
            ..Default::default()
        }
    }
}
