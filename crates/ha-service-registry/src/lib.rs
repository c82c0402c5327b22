//! Service dispatch
//!
//! Entities are driven through services: the dehumidifier wrapper never
//! touches the climate entity directly, it calls `climate.*` services and
//! awaits their handlers.

use dashmap::DashMap;
use ha_core::{Context, ServiceCall, SupportsResponse};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Outcome of a service call, with an optional response
pub type ServiceResult = Result<Option<Value>, ServiceError>;

/// Boxed future returned by a service handler
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Type-erased service handler
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors of service registration and dispatch
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("unknown service {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("service can't return a response")]
    ResponseNotSupported,
}

/// Metadata shown alongside a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// Domain the service is registered under
    pub domain: String,
    /// Service name within the domain
    pub service: String,
    /// Human-readable name
    pub name: Option<String>,
    /// What the service does
    pub description: Option<String>,
    /// Entity selector for the service target
    pub target: Option<Value>,
    /// Whether callers may ask for a response
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
            description: None,
            target: None,
            supports_response: SupportsResponse::None,
        }
    }

    pub fn named(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.description = Some(description.into());
        self
    }

    /// Restrict targets to entities of `domain`
    pub fn targeting(mut self, domain: &str) -> Self {
        self.target = Some(serde_json::json!({ "entity": { "domain": domain } }));
        self
    }

    pub fn responding(mut self, supports_response: SupportsResponse) -> Self {
        self.supports_response = supports_response;
        self
    }
}

type ServiceKey = (String, String);

fn key(domain: &str, service: &str) -> ServiceKey {
    (domain.to_string(), service.to_string())
}

struct Registered {
    handler: ServiceHandler,
    description: ServiceDescription,
}

/// Dispatches service calls to their handlers
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<ServiceKey, Registered>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        self.register_with_description(ServiceDescription::new(domain, service), handler);
    }

    /// Register (or replace) the handler of `description.domain.service`
    pub fn register_with_description<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        debug!(
            domain = %description.domain,
            service = %description.service,
            "Service registered"
        );

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(
            key(&description.domain, &description.service),
            Registered {
                handler,
                description,
            },
        );
    }

    /// Run the handler of `domain.service` to completion
    ///
    /// Handler errors reach the caller as they are. The response is only
    /// passed back when `return_response` is set.
    #[instrument(level = "debug", skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: Value,
        context: Context,
        return_response: bool,
    ) -> ServiceResult {
        let handler = {
            let registered =
                self.services
                    .get(&key(domain, service))
                    .ok_or_else(|| ServiceError::NotFound {
                        domain: domain.to_string(),
                        service: service.to_string(),
                    })?;

            if return_response
                && registered.description.supports_response == SupportsResponse::None
            {
                return Err(ServiceError::ResponseNotSupported);
            }
            // the map guard must not be held across the await below
            registered.handler.clone()
        };

        let response = handler(ServiceCall::new(domain, service, service_data, context)).await?;
        Ok(response.filter(|_| return_response))
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&key(domain, service))
    }

    pub fn describe(&self, domain: &str, service: &str) -> Option<ServiceDescription> {
        self.services
            .get(&key(domain, service))
            .map(|r| r.description.clone())
    }

    pub fn services_of(&self, domain: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .iter()
            .filter(|r| r.key().0 == domain)
            .map(|r| r.key().1.clone())
            .collect();
        names.sort();
        names
    }

    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        self.services.remove(&key(domain, service)).is_some()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
