// Copyright (C) 2025-present The Minutely Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::{inputs::files::FilesConfig, publishers::OutputConfig};
use minutely_analytics::metrics::MetricRegistry;
use serde::{Deserialize, Serialize};

const METRIC_DEFAULT: &str = "moving_average";

pub(crate) fn default_metric() -> String {
    METRIC_DEFAULT.to_string()
}

pub(crate) const fn default_buffer_size() -> usize {
    1_000
}

#[derive(Debug, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum ConfigurationError {
    #[strum(to_string = "Invalid configuration: {0}")]
    Invalid(String),

    #[strum(to_string = "The input file '{path}' does not exist")]
    InputFileNotFound { path: String },

    #[strum(to_string = "The input path '{path}' is not a file")]
    InputNotAFile { path: String },

    #[strum(to_string = "The window size must be a positive integer")]
    InvalidWindowSize,

    #[strum(to_string = "Unsupported metric '{name}', supported metrics: {supported}")]
    UnsupportedMetric { name: String, supported: String },

    #[strum(to_string = "buffer_size must be greater than 0")]
    InvalidBufferSize,

    #[strum(to_string = "poll_interval must be greater than 0")]
    InvalidPollInterval,

    #[strum(to_string = "retry_interval must be greater than 0")]
    InvalidRetryInterval,

    #[strum(to_string = "Invalid logging level '{0}'")]
    InvalidLoggingLevel(String),
}

impl std::error::Error for ConfigurationError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub input: FilesConfig,

    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Capacity of the channels between the actors
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl CollectorConfig {
    /// Reject configurations that can't start a collection, nothing is
    /// processed before this passes.
    pub fn validate(&self, registry: &MetricRegistry) -> Result<(), ConfigurationError> {
        let path = self.input.path();
        if !path.exists() {
            return Err(ConfigurationError::InputFileNotFound {
                path: path.display().to_string(),
            });
        }
        if !path.is_file() {
            return Err(ConfigurationError::InputNotAFile {
                path: path.display().to_string(),
            });
        }
        if self.input.poll_interval().is_zero() {
            return Err(ConfigurationError::InvalidPollInterval);
        }
        if self.input.retry_interval().is_zero() {
            return Err(ConfigurationError::InvalidRetryInterval);
        }
        self.aggregation.validate(registry)?;
        if self.buffer_size == 0 {
            return Err(ConfigurationError::InvalidBufferSize);
        }
        self.logging.level()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    pub fn level(&self) -> Result<tracing::Level, ConfigurationError> {
        self.level
            .parse()
            .map_err(|_| ConfigurationError::InvalidLoggingLevel(self.level.clone()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Size of the trailing window in minutes
    pub window_size_minutes: u32,

    /// Name of a metric known to the [`MetricRegistry`]
    #[serde(default = "default_metric")]
    pub metric: String,
}

impl AggregationConfig {
    pub fn validate(&self, registry: &MetricRegistry) -> Result<(), ConfigurationError> {
        if self.window_size_minutes == 0 {
            return Err(ConfigurationError::InvalidWindowSize);
        }
        if !registry.contains(&self.metric) {
            return Err(ConfigurationError::UnsupportedMetric {
                name: self.metric.clone(),
                supported: registry.names().collect::<Vec<_>>().join(", "),
            });
        }
        Ok(())
    }
}
