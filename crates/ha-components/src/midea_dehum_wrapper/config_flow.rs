//! Config flow: pick the climate entity to wrap

use async_trait::async_trait;
use ha_config_entries::{ConfigFlow, FlowInput, FlowResult, FormField};
use ha_core::domains::CLIMATE;
use ha_state_store::StateStore;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CONF_CLIMATE_ENTITY, DOMAIN};

/// One-step flow validating that the chosen entity is an existing climate
/// entity
pub struct MideaDehumConfigFlow {
    states: Arc<StateStore>,
}

impl MideaDehumConfigFlow {
    pub fn new(states: Arc<StateStore>) -> Self {
        Self { states }
    }

    fn show_form(errors: HashMap<String, String>) -> FlowResult {
        FlowResult::Form {
            step_id: "user".to_string(),
            data_schema: vec![FormField::entity(CONF_CLIMATE_ENTITY, CLIMATE)],
            errors,
        }
    }
}

#[async_trait]
impl ConfigFlow for MideaDehumConfigFlow {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn async_step_user(&self, user_input: Option<FlowInput>) -> FlowResult {
        let mut errors = HashMap::new();

        if let Some(input) = user_input {
            let climate_entity = input
                .get(CONF_CLIMATE_ENTITY)
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            match self.states.get(climate_entity) {
                None => {
                    errors.insert(
                        CONF_CLIMATE_ENTITY.to_string(),
                        "entity_not_found".to_string(),
                    );
                }
                Some(state) if state.domain() != CLIMATE => {
                    errors.insert(
                        CONF_CLIMATE_ENTITY.to_string(),
                        "not_climate_entity".to_string(),
                    );
                }
                Some(state) => {
                    let mut data = HashMap::new();
                    data.insert(CONF_CLIMATE_ENTITY.to_string(), json!(climate_entity));
                    return FlowResult::CreateEntry {
                        title: format!("Midea Dehumidifier ({})", state.name()),
                        data,
                    };
                }
            }
        }

        Self::show_form(errors)
    }
}
