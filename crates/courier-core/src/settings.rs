//! Immutable key/value settings overlay.
//!
//! Extending a [`Settings`] value yields a new overlay and leaves the
//! original untouched, so a child scope can never alter what its parent
//! sees.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Well-known setting keys read by the protocol layer.
pub mod keys {
    /// Endpoint advertised in invitations and DID documents.
    pub const DEFAULT_ENDPOINT: &str = "default_endpoint";
    /// Label advertised in invitations and connection requests.
    pub const DEFAULT_LABEL: &str = "default_label";
    /// Automatically accept invitations delivered to the inbound transports.
    pub const ACCEPT_INVITES: &str = "accept_invites";
    /// Automatically answer connection requests with a response.
    pub const ACCEPT_REQUESTS: &str = "accept_requests";
    /// Automatically answer credential offers with a credential request.
    pub const AUTO_RESPOND_CREDENTIAL_OFFER: &str = "auto_respond_credential_offer";
    /// Automatically verify presentations when they arrive.
    pub const AUTO_VERIFY_PRESENTATION: &str = "auto_verify_presentation";
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: Arc<BTreeMap<String, Value>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Read a boolean flag; absent or non-boolean values read as `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Return a new overlay with `other` layered on top of these values.
    pub fn extend<I, K>(&self, other: I) -> Settings
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut values = (*self.values).clone();
        for (key, value) in other {
            values.insert(key.into(), value);
        }
        Settings {
            values: Arc::new(values),
        }
    }

    /// Return a new overlay with every value from `other` layered on top.
    pub fn merge(&self, other: &Settings) -> Settings {
        if other.is_empty() {
            return self.clone();
        }
        self.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Return a new overlay with a single value set.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Settings {
        self.extend([(key.into(), value.into())])
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Settings::new().extend(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_settings() {
        let settings = Settings::new();
        assert!(settings.is_empty());
        assert!(settings.get("missing").is_none());
        assert!(!settings.get_bool("missing"));
    }

    #[test]
    fn test_extend_does_not_mutate_original() {
        let base = Settings::new().with("a", 1);
        let child = base.extend([("b", json!(2)), ("a", json!(10))]);
        assert_eq!(base.get("a"), Some(&json!(1)));
        assert!(base.get("b").is_none());
        assert_eq!(child.get("a"), Some(&json!(10)));
        assert_eq!(child.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_typed_getters() {
        let settings: Settings = [
            (keys::DEFAULT_LABEL, json!("Alice")),
            (keys::ACCEPT_INVITES, json!(true)),
            ("count", json!(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(settings.get_str(keys::DEFAULT_LABEL), Some("Alice"));
        assert!(settings.get_bool(keys::ACCEPT_INVITES));
        assert!(!settings.get_bool("count"));
        assert_eq!(settings.get_str("count"), None);
        assert_eq!(settings.len(), 3);
    }

    #[test]
    fn test_merge() {
        let parent = Settings::new().with("x", "parent").with("y", "kept");
        let overlay = Settings::new().with("x", "child");
        let merged = parent.merge(&overlay);
        assert_eq!(merged.get_str("x"), Some("child"));
        assert_eq!(merged.get_str("y"), Some("kept"));
        assert_eq!(parent.get_str("x"), Some("parent"));
        assert_eq!(parent.merge(&Settings::new()), parent);
    }
}
