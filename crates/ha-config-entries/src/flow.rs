//! Config flows
//!
//! A config flow walks a user through creating a config entry. Each step
//! either shows a form (possibly with per-field errors), creates an entry,
//! or aborts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User input submitted to a flow step, keyed by field name
pub type FlowInput = HashMap<String, serde_json::Value>;

/// Result of a config flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// Show (or re-show) a form
    Form {
        step_id: String,
        data_schema: Vec<FormField>,
        /// Field name -> error key; empty on first display
        errors: HashMap<String, String>,
    },
    /// Create a config entry with the given data
    CreateEntry {
        title: String,
        data: HashMap<String, serde_json::Value>,
    },
    /// Abort the flow
    Abort { reason: String },
}

impl FlowResult {
    /// Whether this result creates an entry
    pub fn is_create_entry(&self) -> bool {
        matches!(self, FlowResult::CreateEntry { .. })
    }

    /// Errors attached to a form result (empty for other results)
    pub fn errors(&self) -> HashMap<String, String> {
        match self {
            FlowResult::Form { errors, .. } => errors.clone(),
            _ => HashMap::new(),
        }
    }
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Key of the value in the submitted input
    pub name: String,
    /// Value type, e.g. `string`
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether the form is rejected without it
    pub required: bool,
    /// Frontend selector, e.g. `{"entity": {"domain": "climate"}}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<serde_json::Value>,
}

impl FormField {
    /// Required field picked with an entity selector limited to `domain`
    pub fn entity(name: impl Into<String>, domain: &str) -> Self {
        Self {
            name: name.into(),
            field_type: "string".to_string(),
            required: true,
            selector: Some(serde_json::json!({"entity": {"domain": domain}})),
        }
    }
}

/// A native config flow for one integration domain
#[async_trait]
pub trait ConfigFlow: Send + Sync {
    /// Integration domain this flow creates entries for
    fn domain(&self) -> &str;

    /// The `user` step: show the form when `user_input` is None, otherwise
    /// validate the input
    async fn async_step_user(&self, user_input: Option<FlowInput>) -> FlowResult;
}
