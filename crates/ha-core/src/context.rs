use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies the request that caused a state write or service call
///
/// The wrapper passes the context of a humidifier command on to the climate
/// service calls it makes, so both state changes share one origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// ULID of this context
    pub id: String,
    /// User that caused the change, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Context this one was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: None,
            parent_id: None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids() {
        let a = Context::new();
        let b = Context::default();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 26);
    }

    #[test]
    fn test_optional_ids_omitted() {
        let json = serde_json::to_value(Context::new()).unwrap();
        assert!(json.get("user_id").is_none());
        assert!(json.get("parent_id").is_none());

        let parsed: Context = serde_json::from_value(serde_json::json!({"id": "abc"})).unwrap();
        assert_eq!(parsed.id, "abc");
        assert_eq!(parsed.user_id, None);
    }
}
