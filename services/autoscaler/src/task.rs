//! Request tasks resolved from their configured templates.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use crate::config::{Config, ConfigError, TaskDefinition, STATUS_TASK_PREFIX, UPDATE_TASK_PREFIX};

/// A request template with its method and headers already parsed.
#[derive(Debug, Clone)]
pub struct HttpTask {
    pub name: String,
    pub method: Method,
    pub endpoint: String,
    pub headers: HeaderMap,
}

impl HttpTask {
    pub fn from_definition(definition: &TaskDefinition) -> Result<Self, ConfigError> {
        let request = &definition.request;

        let method = Method::from_bytes(request.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| ConfigError::InvalidMethod {
                task: definition.name.clone(),
                method: request.method.clone(),
            })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let invalid = || ConfigError::InvalidHeader {
                task: definition.name.clone(),
                name: name.clone(),
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(header_name, header_value);
        }

        Ok(Self {
            name: definition.name.clone(),
            method,
            endpoint: request.endpoint.clone(),
            headers,
        })
    }
}

/// The two tasks the scaling loop needs.
#[derive(Debug, Clone)]
pub struct ScalingTasks {
    /// Fetches `{"cpu": {"highPriority": ..}, "replicas": ..}`.
    pub status: HttpTask,

    /// Accepts `{"replicas": ..}`.
    pub update: HttpTask,
}

impl ScalingTasks {
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            status: HttpTask::from_definition(config.find_task(STATUS_TASK_PREFIX)?)?,
            update: HttpTask::from_definition(config.find_task(UPDATE_TASK_PREFIX)?)?,
        })
    }
}
