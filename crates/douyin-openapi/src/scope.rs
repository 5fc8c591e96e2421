//! Granted-scope parsing.
//!
//! The open platform reports granted scopes either as one delimited string
//! (`"ma.user.data,user_info"`, sometimes space separated) or as a JSON array,
//! under `scope` or `scopes`. Everything is normalized into a [`ScopeSet`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::lookup;

/// Field names checked for a scope value, in order.
const SCOPE_FIELDS: &[&str] = &["scope", "scopes"];

/// Ordered set of trimmed, non-empty scope names.
///
/// Deserialization goes through the same normalization as [`ScopeSet::parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<String>", from = "Vec<String>")]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Create an empty scope set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a delimited scope string. Commas and whitespace both separate entries.
    pub fn parse(raw: &str) -> Self {
        raw.split(|c: char| c == ',' || c.is_whitespace()).collect()
    }

    /// Build a scope set from a JSON string or array.
    ///
    /// Returns `None` for any other JSON type.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => Some(Self::parse(raw)),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .flat_map(|item| item.split(','))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Look up `scope` then `scopes` on a payload object and parse the first hit.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        SCOPE_FIELDS
            .iter()
            .filter_map(|field| lookup(payload, field))
            .find_map(Self::from_value)
    }

    #[inline]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Set union, keeping ordering.
    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        ScopeSet(self.0.union(&other.0).cloned().collect())
    }

    /// Owned list of scope names in order.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ScopeSet(
            iter.into_iter()
                .map(|scope| scope.as_ref().trim().to_string())
                .filter(|scope| !scope.is_empty())
                .collect(),
        )
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        scopes.into_iter().collect()
    }
}

impl From<ScopeSet> for Vec<String> {
    fn from(scopes: ScopeSet) -> Self {
        scopes.0.into_iter().collect()
    }
}

impl From<&str> for ScopeSet {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_comma_string_trims_and_drops_empty() {
        let scopes = ScopeSet::parse(" ma.user.data, ,user_info,");
        assert_eq!(scopes.to_vec(), vec!["ma.user.data", "user_info"]);
    }

    #[test]
    fn test_parse_space_delimited_string() {
        let scopes = ScopeSet::parse("user_info video.list.bind");
        assert!(scopes.contains("user_info"));
        assert!(scopes.contains("video.list.bind"));
        assert_eq!(scopes.len(), 2);
    }

    #[test]
    fn test_string_and_array_representations_match() {
        let from_string = ScopeSet::from_value(&json!("a,b,c")).unwrap();
        let from_array = ScopeSet::from_value(&json!(["c", "a", "b"])).unwrap();
        assert_eq!(from_string, from_array);
    }

    #[test]
    fn test_from_payload_prefers_scope_then_scopes() {
        let payload = json!({ "scopes": ["video.list.bind"] });
        let scopes = ScopeSet::from_payload(&payload).unwrap();
        assert!(scopes.contains("video.list.bind"));

        let payload = json!({ "scope": "user_info", "scopes": ["video.list.bind"] });
        let scopes = ScopeSet::from_payload(&payload).unwrap();
        assert_eq!(scopes.to_vec(), vec!["user_info"]);

        assert!(ScopeSet::from_payload(&json!({ "scope": 42 })).is_none());
    }

    #[test]
    fn test_display_joins_with_commas() {
        let scopes: ScopeSet = ["user_info", "ma.item.data"].into_iter().collect();
        assert_eq!(scopes.to_string(), "ma.item.data,user_info");
    }

    #[test]
    fn test_deserialize_normalizes_entries() {
        let scopes: ScopeSet = serde_json::from_value(json!([" a ", "", "b", "a"])).unwrap();
        assert_eq!(scopes.to_vec(), vec!["a", "b"]);
        assert_eq!(serde_json::to_value(&scopes).unwrap(), json!(["a", "b"]));
    }
}
