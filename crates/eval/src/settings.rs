//! Engine settings.

use serde::{Deserialize, Serialize};

use crate::store::ApproxOptions;

/// Settings shared by every matching operation of a [`crate::Matcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct MatcherSettings {
    /// Lifecycle states a candidate must be in, for record types that have
    /// a lifecycle.
    pub active_states: Vec<String>,
    /// Approximate-match options for the in-memory store.
    pub approx: ApproxOptions,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        MatcherSettings {
            active_states: vec!["active".to_string(), "new".to_string()],
            approx: ApproxOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: MatcherSettings =
            serde_json::from_value(serde_json::json!({ "approx": { "phonetic": true } })).unwrap();
        assert_eq!(settings.active_states, vec!["active", "new"]);
        assert!(settings.approx.phonetic);
        assert_eq!(settings.approx.max_difference, None);
    }
}
