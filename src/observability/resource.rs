//! Resource identity attached to every exported signal.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use thiserror::Error;

use crate::config::TelemetryConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("service name must not be empty")]
    EmptyServiceName,
}

/// Static attribute set built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct ResourceIdentity {
    service_name: String,
    service_version: String,
    job: String,
}

impl ResourceIdentity {
    pub fn new(
        service_name: impl Into<String>,
        service_version: impl Into<String>,
        job: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let service_name = service_name.into();
        if service_name.trim().is_empty() {
            return Err(IdentityError::EmptyServiceName);
        }
        Ok(Self {
            service_name,
            service_version: service_version.into(),
            job: job.into(),
        })
    }

    pub fn from_config(config: &TelemetryConfig) -> Result<Self, IdentityError> {
        Self::new(
            config.service_name.as_str(),
            config.service_version.as_str(),
            config.job.as_str(),
        )
    }

    /// `service.name` resource attribute.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// `job` label shared by logs and metrics.
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Attributes beyond `service.name`. `service_name` and `job` duplicate
    /// the service identity as plain labels for the log and metrics stores.
    pub fn attributes(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("service.version", self.service_version.clone()),
            KeyValue::new("service_name", self.service_name.clone()),
            KeyValue::new("job", self.job.clone()),
        ]
    }

    /// OpenTelemetry resource for the providers.
    pub fn to_resource(&self) -> Resource {
        Resource::builder_empty()
            .with_service_name(self.service_name.clone())
            .with_attributes(self.attributes())
            .build()
    }
}
